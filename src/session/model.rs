//! Per-conversation session state.
//!
//! The session is a strongly typed record of optional slots, one group per
//! flow. Slot presence *is* the dialogue state: a flow's slots are filled
//! strictly in order, and the next unset slot is the open question.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which slot-filling flow the user is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Creating a ride offer.
    Create,
    /// Requesting to join a ride.
    Request,
}

/// Slots collected by the create-offer flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSlots {
    pub from_campus: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub seats: Option<u32>,
    /// Durable offer id once committed; kept across edits so the repository
    /// record is updated in place.
    pub offer_id: Option<u64>,
    /// Mirror of the offer's confirmed riders, re-derived by the workflow.
    pub current_passengers: Vec<String>,
    /// Mirror of the offer's waiting candidates, re-derived by the workflow.
    pub pending_passengers: Vec<String>,
    pub complete: bool,
}

impl CreateSlots {
    /// Clear everything except the durable `offer_id`, re-entering the flow
    /// at its first question.
    pub fn reset_for_edit(&mut self) {
        let offer_id = self.offer_id;
        *self = Self::default();
        self.offer_id = offer_id;
    }
}

/// Slots collected by the request-ride flow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSlots {
    pub from_campus: Option<bool>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub complete: bool,
    /// Offer the passenger committed to, once they `choose`.
    pub chosen_offer_id: Option<u64>,
}

impl RequestSlots {
    pub fn reset_for_edit(&mut self) {
        *self = Self::default();
    }
}

/// One user's conversation state, keyed by an opaque token.
///
/// Never persisted — the repository is the durable backing store for
/// committed offers and requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub guc_id: Option<String>,
    pub display_name: Option<String>,
    pub mode: Option<Flow>,
    pub create: CreateSlots,
    pub request: RequestSlots,
}

impl Session {
    /// Identity pair, once the user has introduced themselves.
    pub fn identity(&self) -> Option<(&str, &str)> {
        match (self.guc_id.as_deref(), self.display_name.as_deref()) {
            (Some(id), Some(name)) => Some((id, name)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_requires_both_slots() {
        let mut session = Session::default();
        assert!(session.identity().is_none());
        session.guc_id = Some("34-1111".into());
        assert!(session.identity().is_none());
        session.display_name = Some("Amer".into());
        assert_eq!(session.identity(), Some(("34-1111", "Amer")));
    }

    #[test]
    fn edit_reset_keeps_offer_id() {
        let mut slots = CreateSlots {
            from_campus: Some(true),
            latitude: Some(29.9),
            longitude: Some(31.4),
            seats: Some(2),
            offer_id: Some(7),
            complete: true,
            ..Default::default()
        };
        slots.reset_for_edit();
        assert_eq!(slots.offer_id, Some(7));
        assert!(slots.from_campus.is_none());
        assert!(!slots.complete);
    }
}
