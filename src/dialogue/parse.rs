//! Keyword and regex extraction for slot answers.
//!
//! Deliberately shallow — no NLU, just the substring and pattern rules the
//! dialogue relies on. Kept behind small functions so the state machine can
//! be tested without them and vice versa.

use std::sync::LazyLock;

use regex::Regex;

/// Decimal numbers, e.g. "29.985" or "31".
static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+\.?[0-9]*").expect("decimal regex"));

/// Classify a direction answer.
///
/// Returns `Some(true)` when the user is leaving campus, `Some(false)` when
/// they are heading there, `None` when the message answers neither.
pub fn parse_direction(text: &str) -> Option<bool> {
    let lower = text.to_lowercase();
    if lower.contains("to guc") || lower.contains("going") {
        Some(false)
    } else if lower.contains("from guc") || lower.contains("leaving") {
        Some(true)
    } else {
        None
    }
}

/// Extract a coordinate pair from a location answer.
///
/// The message must name both "latitude" and "longitude"; the first two
/// decimal numbers win, in that order.
pub fn parse_location(text: &str) -> Option<(f64, f64)> {
    let lower = text.to_lowercase();
    if !lower.contains("latitude") || !lower.contains("longitude") {
        return None;
    }
    let mut numbers = DECIMAL
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok());
    let latitude = numbers.next()?;
    let longitude = numbers.next()?;
    Some((latitude, longitude))
}

/// First literal digit in the message, if any.
pub fn parse_seat_count(text: &str) -> Option<u32> {
    text.chars().find_map(|c| c.to_digit(10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_keywords() {
        assert_eq!(parse_direction("I'm going to the GUC"), Some(false));
        assert_eq!(parse_direction("heading to guc please"), Some(false));
        assert_eq!(parse_direction("I'm leaving campus"), Some(true));
        assert_eq!(parse_direction("From GUC to my place"), Some(true));
        assert_eq!(parse_direction("neither really"), None);
    }

    #[test]
    fn location_needs_both_keywords() {
        assert!(parse_location("29.985 and 31.442").is_none());
        assert!(parse_location("latitude 29.985 only").is_none());
        let (lat, lon) = parse_location("latitude 29.985 and longitude 31.442").unwrap();
        assert_eq!(lat, 29.985);
        assert_eq!(lon, 31.442);
    }

    #[test]
    fn location_first_two_numbers_win() {
        let (lat, lon) =
            parse_location("latitude 29.9, longitude 31.4, floor 12, apartment 3").unwrap();
        assert_eq!(lat, 29.9);
        assert_eq!(lon, 31.4);
    }

    #[test]
    fn seat_count_first_digit_wins() {
        assert_eq!(parse_seat_count("I can take 3 people"), Some(3));
        assert_eq!(parse_seat_count("2 or maybe 4"), Some(2));
        assert_eq!(parse_seat_count("a few"), None);
        // Out-of-range digits are still extracted; the engine rejects them.
        assert_eq!(parse_seat_count("7 seats"), Some(7));
    }
}
