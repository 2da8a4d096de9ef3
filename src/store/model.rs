//! Durable entities: ride offers and passenger requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display format for start times, e.g. "Jan 2, 2026 at 3:04pm".
pub const START_TIME_FORMAT: &str = "%b %-d, %Y at %-I:%M%P";

/// A posted ride with capacity, owned by one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideOffer {
    /// Allocated once by the repository, monotonic, never reused.
    pub id: u64,
    /// Owner identity.
    pub guc_id: String,
    pub display_name: String,
    /// `true` when the ride leaves campus, `false` when it heads there.
    pub from_campus: bool,
    pub latitude: f64,
    pub longitude: f64,
    /// When the ride takes place.
    pub start_time: DateTime<Utc>,
    /// When the offer was posted.
    pub created_at: DateTime<Utc>,
    /// Seat count at creation. Never changes after insert.
    pub seats_total: u32,
    /// Seats still open. Invariant: `seats_remaining + current_passengers.len()
    /// == seats_total` at all times.
    pub seats_remaining: u32,
    /// Confirmed riders, in acceptance order.
    pub current_passengers: Vec<String>,
    /// Candidates awaiting the owner's decision, in arrival order.
    pub pending_passengers: Vec<String>,
}

impl RideOffer {
    pub fn new(
        guc_id: impl Into<String>,
        display_name: impl Into<String>,
        from_campus: bool,
        latitude: f64,
        longitude: f64,
        start_time: DateTime<Utc>,
        seats: u32,
    ) -> Self {
        Self {
            id: 0,
            guc_id: guc_id.into(),
            display_name: display_name.into(),
            from_campus,
            latitude,
            longitude,
            start_time,
            created_at: Utc::now(),
            seats_total: seats,
            seats_remaining: seats,
            current_passengers: Vec::new(),
            pending_passengers: Vec::new(),
        }
    }

    /// Check the seat-accounting invariant.
    pub fn seats_consistent(&self) -> bool {
        self.seats_remaining as usize + self.current_passengers.len() == self.seats_total as usize
    }

    /// "Leaving the GUC" / "Going to the GUC".
    pub fn direction_label(&self) -> &'static str {
        if self.from_campus {
            "Leaving the GUC"
        } else {
            "Going to the GUC"
        }
    }

    /// Human-readable rendering used by `view` and match listings.
    ///
    /// `address` is a best-effort reverse-geocoded street address; when
    /// absent the raw coordinates are shown instead.
    pub fn summary(&self, address: Option<&str>) -> String {
        let mut out = format!("-> Offer #{}, driver {}", self.id, self.display_name);
        out.push_str(&format!("\n   {}", self.direction_label()));
        match address {
            Some(addr) if !addr.is_empty() => out.push_str(&format!("\n   Address: {addr}")),
            _ => out.push_str(&format!(
                "\n   Latitude: {}, longitude: {}",
                self.latitude, self.longitude
            )),
        }
        out.push_str(&format!(
            "\n   Start time: {}",
            self.start_time.format(START_TIME_FORMAT)
        ));
        out.push_str(&format!("\n   Available seats: {}", self.seats_remaining));
        if self.current_passengers.is_empty() {
            out.push_str("\n   No current passengers");
        } else {
            out.push_str(&format!(
                "\n   Current passengers: {}",
                self.current_passengers.join(", ")
            ));
        }
        if self.pending_passengers.is_empty() {
            out.push_str("\n   No requesting passengers");
        } else {
            out.push_str(&format!(
                "\n   Requesting passengers: {}",
                self.pending_passengers.join(", ")
            ));
        }
        out
    }
}

/// Status of a passenger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting the offer owner's decision.
    Pending,
    /// Declined by the owner. Terminal.
    Rejected,
    /// Confirmed by the owner; the passenger holds a seat.
    Accepted,
    /// Withdrawn by the passenger. Terminal.
    Cancelled,
}

impl RequestStatus {
    /// Terminal statuses are surfaced once by the notification deriver and
    /// then deleted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }

    /// A passenger may hold at most one request in an active status.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Rejected => "rejected",
            Self::Accepted => "accepted",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One identity's bid to join a specific offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassengerRequest {
    pub guc_id: String,
    pub display_name: String,
    pub offer_id: u64,
    pub status: RequestStatus,
}

impl PassengerRequest {
    pub fn new(guc_id: impl Into<String>, display_name: impl Into<String>, offer_id: u64) -> Self {
        Self {
            guc_id: guc_id.into(),
            display_name: display_name.into(),
            offer_id,
            status: RequestStatus::Pending,
        }
    }
}
