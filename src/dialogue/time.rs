//! Human time parsing, behind a trait so the dialogue engine never depends
//! on a concrete parser.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::TimeParseError;

/// Parse a human time expression relative to a reference instant.
pub trait HumanTimeParser: Send + Sync {
    fn parse(&self, text: &str, reference: DateTime<Utc>) -> Result<DateTime<Utc>, TimeParseError>;
}

/// Fixed-format parser: tries a list of chrono formats in order.
pub struct FormatTimeParser {
    formats: Vec<&'static str>,
}

impl FormatTimeParser {
    pub fn new() -> Self {
        Self {
            formats: vec![
                // "Jan 2, 2026 at 3:04pm"
                "%b %d, %Y at %I:%M%P",
                "%Y-%m-%d %H:%M",
                "%d/%m/%Y %H:%M",
            ],
        }
    }
}

impl Default for FormatTimeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanTimeParser for FormatTimeParser {
    fn parse(
        &self,
        text: &str,
        _reference: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, TimeParseError> {
        let trimmed = text.trim();
        for format in &self.formats {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(naive.and_utc());
            }
        }
        Err(TimeParseError::Unrecognized(trimmed.to_string()))
    }
}
