//! Dialogue engine — the slot-filling state machine.
//!
//! One turn fills at most one slot. The next unset slot in the flow's fixed
//! order is the open question; a message that does not answer it comes back
//! as a `Validation` error carrying the re-prompt and leaves the session
//! untouched. The turn that fills the final slot commits the result: the
//! create flow inserts or updates the ride offer, the request flow marks
//! itself complete. Both clear `mode` so later messages fall through to
//! command handling.

pub mod intent;
pub mod parse;
pub mod time;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::{ChatError, Result};
use crate::session::{Flow, Session};
use crate::store::model::START_TIME_FORMAT;
use crate::store::{Repository, RideOffer};
use self::time::HumanTimeParser;

/// Two committed ride times closer than this conflict.
const CONFLICT_WINDOW_HOURS: i64 = 4;

/// Seat counts the create flow accepts.
const SEAT_RANGE: std::ops::RangeInclusive<u32> = 1..=4;

/// Turn-by-turn slot filler for both flows.
pub struct DialogueEngine {
    repo: Arc<dyn Repository>,
    time_parser: Arc<dyn HumanTimeParser>,
}

impl DialogueEngine {
    pub fn new(repo: Arc<dyn Repository>, time_parser: Arc<dyn HumanTimeParser>) -> Self {
        Self { repo, time_parser }
    }

    /// Process one turn. `now` is the processing instant; the caller passes
    /// the wall clock, tests pass a fixed one.
    pub async fn process(
        &self,
        session: &mut Session,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        match session.mode {
            None => self.classify(session, text),
            Some(Flow::Create) => self.create_turn(session, text, now).await,
            Some(Flow::Request) => self.request_turn(session, text, now).await,
        }
    }

    /// Initial state: the only transition out is picking a flow.
    fn classify(&self, session: &mut Session, text: &str) -> Result<String> {
        match intent::classify_intent(text) {
            Some(Flow::Create) => {
                session.mode = Some(Flow::Create);
                Ok("You've chosen to create a carpool. Are you going to the GUC, \
                    or are you leaving campus?"
                    .into())
            }
            Some(Flow::Request) => {
                session.mode = Some(Flow::Request);
                Ok("You've chosen to request a carpool. Are you going to the GUC, \
                    or are you leaving campus?"
                    .into())
            }
            None => Err(ChatError::Validation(
                "I'm sorry, but you didn't answer my question! Are you offering \
                 a ride? Or are you requesting one?"
                    .into(),
            )),
        }
    }

    // ── Create flow ─────────────────────────────────────────────────

    async fn create_turn(
        &self,
        session: &mut Session,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if session.create.from_campus.is_none() {
            let from_campus = parse_direction_or_reprompt(text)?;
            session.create.from_campus = Some(from_campus);
            return Ok(format!(
                "{} {}",
                direction_ack(from_campus),
                location_question(from_campus)
            ));
        }

        if session.create.latitude.is_none() || session.create.longitude.is_none() {
            let from_campus = session.create.from_campus.unwrap_or_default();
            let (latitude, longitude) = parse_location_or_reprompt(text, from_campus)?;
            session.create.latitude = Some(latitude);
            session.create.longitude = Some(longitude);
            return Ok(format!(
                "You chose the location with latitude {latitude} and longitude \
                 {longitude}. What time would you like your ride to be?"
            ));
        }

        if session.create.start_time.is_none() {
            let start_time = self.parse_and_check_time(session, text, now).await?;
            session.create.start_time = Some(start_time);
            return Ok(format!(
                "Your ride is set for {}. How many seats can you offer? (1 to 4)",
                start_time.format(START_TIME_FORMAT)
            ));
        }

        if session.create.seats.is_none() {
            let seats = match parse::parse_seat_count(text) {
                Some(n) if SEAT_RANGE.contains(&n) => n,
                Some(n) => {
                    return Err(ChatError::Validation(format!(
                        "I can't set up a carpool with {n} seats. How many seats \
                         can you offer? (1 to 4)"
                    )));
                }
                None => {
                    return Err(ChatError::Validation(
                        "I'm sorry, but you didn't answer my question! How many \
                         seats can you offer? (1 to 4)"
                            .into(),
                    ));
                }
            };
            // Final slot: commit before mutating the session, so a failed
            // insert leaves the whole turn unapplied.
            let reply = self.commit_offer(session, seats).await?;
            session.create.seats = Some(seats);
            session.create.complete = true;
            session.mode = None;
            return Ok(reply);
        }

        // All slots already filled and mode still set — a stale session.
        Err(ChatError::Validation(
            "Whoops! Something went wrong with your session. Can you please \
             log out and log back in again?"
                .into(),
        ))
    }

    /// Insert a new offer, or update the one this identity already owns
    /// (idempotent edit — same durable id, fields replaced in place). A
    /// fresh insert records its id in the session, which is what owner-side
    /// commands and later edits resolve the offer through.
    async fn commit_offer(&self, session: &mut Session, seats: u32) -> Result<String> {
        let (guc_id, display_name) = identity_of(session)?;
        let guc_id = guc_id.to_string();
        let display_name = display_name.to_string();
        let from_campus = session.create.from_campus.unwrap_or_default();
        let latitude = session.create.latitude.unwrap_or_default();
        let longitude = session.create.longitude.unwrap_or_default();
        let start_time = session
            .create
            .start_time
            .ok_or_else(|| ChatError::Validation("I still need a time for your ride.".into()))?;

        match session.create.offer_id {
            None => {
                let id = self.repo.next_offer_id().await?;
                let mut offer = RideOffer::new(
                    &guc_id,
                    &display_name,
                    from_campus,
                    latitude,
                    longitude,
                    start_time,
                    seats,
                );
                offer.id = id;
                self.repo.create_offer(&offer).await?;
                session.create.offer_id = Some(id);
                info!(offer_id = id, owner = %guc_id, "offer created");
                Ok(format!(
                    "Your offer is complete! Here are the details: {} I'll let \
                     you know when someone asks to join — say 'updates' any time.",
                    ride_details(from_campus, latitude, longitude, start_time)
                ))
            }
            Some(id) => {
                let mut offer =
                    self.repo
                        .get_offer(id)
                        .await?
                        .ok_or_else(|| ChatError::NotFound(format!(
                            "I couldn't find your offer #{id} any more. Say \
                             'create' to post a new one."
                        )))?;
                let riders = offer.current_passengers.len() as u32;
                if seats < riders {
                    return Err(ChatError::Conflict(format!(
                        "You already have {riders} confirmed passengers, so I \
                         can't shrink the carpool to {seats} seats."
                    )));
                }
                offer.from_campus = from_campus;
                offer.latitude = latitude;
                offer.longitude = longitude;
                offer.start_time = start_time;
                offer.seats_total = seats;
                offer.seats_remaining = seats - riders;
                self.repo.update_offer(&offer).await?;
                info!(offer_id = id, owner = %guc_id, "offer updated");
                Ok(format!(
                    "Your offer is updated! Here are the details: {}",
                    ride_details(from_campus, latitude, longitude, start_time)
                ))
            }
        }
    }

    // ── Request flow ────────────────────────────────────────────────

    async fn request_turn(
        &self,
        session: &mut Session,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if session.request.from_campus.is_none() {
            let from_campus = parse_direction_or_reprompt(text)?;
            session.request.from_campus = Some(from_campus);
            return Ok(format!(
                "{} {}",
                direction_ack(from_campus),
                location_question(from_campus)
            ));
        }

        if session.request.latitude.is_none() || session.request.longitude.is_none() {
            let from_campus = session.request.from_campus.unwrap_or_default();
            let (latitude, longitude) = parse_location_or_reprompt(text, from_campus)?;
            session.request.latitude = Some(latitude);
            session.request.longitude = Some(longitude);
            return Ok(format!(
                "You chose the location with latitude {latitude} and longitude \
                 {longitude}. What time would you like your ride to be?"
            ));
        }

        if session.request.start_time.is_none() {
            // Final slot of the request flow.
            let start_time = self.parse_and_check_time(session, text, now).await?;
            session.request.start_time = Some(start_time);
            session.request.complete = true;
            session.mode = None;
            let from_campus = session.request.from_campus.unwrap_or_default();
            return Ok(format!(
                "Your request is complete! Here are the details: {} Say 'view' \
                 to browse matching carpools, then 'choose <id>' to pick one.",
                ride_details(
                    from_campus,
                    session.request.latitude.unwrap_or_default(),
                    session.request.longitude.unwrap_or_default(),
                    start_time
                )
            ));
        }

        Err(ChatError::Validation(
            "Whoops! Something went wrong with your session. Can you please \
             log out and log back in again?"
                .into(),
        ))
    }

    // ── Time rules ──────────────────────────────────────────────────

    /// Parse a time answer and apply both business rules: strictly in the
    /// future, and no other committed time within the conflict window.
    async fn parse_and_check_time(
        &self,
        session: &Session,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let parsed = self.time_parser.parse(text, now).map_err(|e| {
            debug!(error = %e, "time parse failed");
            ChatError::Validation(
                "I couldn't understand that time. Can you please tell me again \
                 when you want your ride to be? For example: 'Jan 2, 2026 at 3:04pm'."
                    .into(),
            )
        })?;

        if parsed <= now {
            return Err(ChatError::Validation(
                "That time has already passed! When would you like your ride to be?".into(),
            ));
        }

        if let Some((what, committed)) = self.committed_time(session).await? {
            let delta = (parsed - committed).abs();
            if delta <= Duration::hours(CONFLICT_WINDOW_HOURS) {
                return Err(ChatError::Conflict(format!(
                    "That's too close to {what} at {}. Rides must be at least \
                     {CONFLICT_WINDOW_HOURS} hours apart — pick another time, or \
                     cancel the other ride first.",
                    committed.format(START_TIME_FORMAT)
                )));
            }
        }

        Ok(parsed)
    }

    /// The identity's other committed ride time, if any.
    ///
    /// Symmetric across flows: filling a create-flow time checks the ride
    /// they requested, filling a request-flow time checks the offer they
    /// own. The offer currently being edited never conflicts with itself.
    async fn committed_time(
        &self,
        session: &Session,
    ) -> Result<Option<(&'static str, DateTime<Utc>)>> {
        let Some((guc_id, _)) = session.identity() else {
            return Ok(None);
        };

        // Their own posted offer (excluding the one being edited).
        for offer in self.repo.list_offers().await? {
            if offer.guc_id == guc_id && session.create.offer_id != Some(offer.id) {
                return Ok(Some(("your own offer", offer.start_time)));
            }
        }

        // The ride they committed to as a passenger.
        for request in self.repo.requests_by_identity(guc_id).await? {
            if request.status.is_active() {
                if let Some(offer) = self.repo.get_offer(request.offer_id).await? {
                    return Ok(Some(("the ride you joined", offer.start_time)));
                }
            }
        }

        // A completed request whose time only lives in the session yet.
        if session.request.complete && session.mode == Some(Flow::Create) {
            if let Some(t) = session.request.start_time {
                return Ok(Some(("your ride request", t)));
            }
        }

        Ok(None)
    }
}

// ── Shared prompts ──────────────────────────────────────────────────

fn identity_of(session: &Session) -> Result<(&str, &str)> {
    session.identity().ok_or_else(|| {
        ChatError::Unauthorized("I don't know who you are yet. Please log in first.".into())
    })
}

fn parse_direction_or_reprompt(text: &str) -> Result<bool> {
    parse::parse_direction(text).ok_or_else(|| {
        ChatError::Validation(
            "I'm sorry, but you didn't answer my question! Are you going to \
             the GUC? Or are you leaving campus?"
                .into(),
        )
    })
}

fn parse_location_or_reprompt(text: &str, from_campus: bool) -> Result<(f64, f64)> {
    parse::parse_location(text).ok_or_else(|| {
        ChatError::Validation(format!(
            "I'm sorry, but you didn't answer my question! {} Tell me the \
             latitude and longitude.",
            location_question(from_campus)
        ))
    })
}

fn direction_ack(from_campus: bool) -> &'static str {
    if from_campus {
        "You chose to leave the campus."
    } else {
        "You've chosen to go to the GUC!"
    }
}

fn location_question(from_campus: bool) -> &'static str {
    if from_campus {
        "Where would you like to go?"
    } else {
        "Where would you like to be picked up from?"
    }
}

/// "You're leaving the GUC, going to ..." rendering used on completion.
fn ride_details(
    from_campus: bool,
    latitude: f64,
    longitude: f64,
    start_time: DateTime<Utc>,
) -> String {
    let leg = if from_campus {
        "You're leaving the GUC, going to the location with"
    } else {
        "You're coming to the GUC, from the location with"
    };
    format!(
        "{leg} latitude {latitude} and longitude {longitude}. Your ride takes \
         place around {}.",
        start_time.format(START_TIME_FORMAT)
    )
}
