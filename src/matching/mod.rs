//! Matching workflow — offer/request lifecycle once a flow has completed.
//!
//! Every seat-mutating operation serializes on a per-offer lock before its
//! read-modify-write against the repository, so two users racing for the
//! last seat cannot both get it. Errors are returned before any write; a
//! failed operation changes neither the repository nor the session.

pub mod locks;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::directions::DirectionsProvider;
use crate::error::{ChatError, RepositoryError, Result};
use crate::session::{CreateSlots, Session};
use crate::store::model::{PassengerRequest, RequestStatus};
use crate::store::{Repository, RideOffer};
use self::locks::OfferLocks;

/// Origin/destination used for campus-side route lookups.
const CAMPUS_PLACE: &str = "German University in Cairo, New Cairo, Egypt";

/// Lifecycle operations on offers and passenger requests.
pub struct MatchingWorkflow {
    repo: Arc<dyn Repository>,
    directions: Arc<dyn DirectionsProvider>,
    locks: OfferLocks,
}

impl MatchingWorkflow {
    pub fn new(repo: Arc<dyn Repository>, directions: Arc<dyn DirectionsProvider>) -> Self {
        Self {
            repo,
            directions,
            locks: OfferLocks::new(),
        }
    }

    // ── Passenger side ──────────────────────────────────────────────

    /// Commit to an offer as a passenger.
    pub async fn choose(&self, session: &mut Session, offer_id: u64) -> Result<String> {
        let (guc_id, display_name) = identity_of(session)?;
        let guc_id = guc_id.to_string();
        let display_name = display_name.to_string();

        // One active request per identity.
        for request in self.repo.requests_by_identity(&guc_id).await? {
            if request.status.is_active() {
                return Err(ChatError::Conflict(format!(
                    "You've already asked to join carpool #{}. Say 'cancel' \
                     first if you'd rather take another ride.",
                    request.offer_id
                )));
            }
        }

        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.get_offer_or_not_found(offer_id).await?;
        if offer.guc_id == guc_id {
            return Err(ChatError::Conflict(
                "You can't join your own carpool!".into(),
            ));
        }

        let request = PassengerRequest::new(&guc_id, &display_name, offer_id);
        // The insert is the authority on "one active request": a racing
        // second choose can slip past the check above, and its constraint
        // violation is still this user's double-booking.
        if let Err(err) = self.repo.create_passenger_request(&request).await {
            return Err(match err {
                RepositoryError::Constraint(_) => ChatError::Conflict(
                    "You've already asked to join a carpool. Say 'cancel' first \
                     if you'd rather take another ride."
                        .into(),
                ),
                other => other.into(),
            });
        }
        offer.pending_passengers.push(guc_id.clone());
        self.repo.update_offer(&offer).await?;

        session.request.chosen_offer_id = Some(offer_id);
        info!(offer_id, passenger = %guc_id, "passenger chose offer");
        Ok(format!(
            "You've asked to join carpool #{offer_id}. I'll let {} know — say \
             'updates' to check on their decision.",
            offer.display_name
        ))
    }

    /// Withdraw the passenger's own request, returning the seat if it was
    /// already confirmed.
    pub async fn cancel_request(&self, session: &mut Session) -> Result<String> {
        let (guc_id, _) = identity_of(session)?;
        let guc_id = guc_id.to_string();

        let request = self
            .repo
            .requests_by_identity(&guc_id)
            .await?
            .into_iter()
            .find(|r| r.status.is_active())
            .ok_or_else(|| {
                ChatError::NotFound("You haven't asked to join any carpool.".into())
            })?;

        let _guard = self.locks.acquire(request.offer_id).await;
        match self.repo.get_offer(request.offer_id).await? {
            Some(mut offer) => {
                let was_current = remove_passenger(&mut offer, &guc_id);
                if was_current {
                    offer.seats_remaining += 1;
                }
                self.repo.update_offer(&offer).await?;
                self.repo
                    .update_request_status(&guc_id, RequestStatus::Cancelled)
                    .await?;
            }
            None => {
                // The offer was deleted out from under the request. Nobody is
                // left to read a cancellation, so drop the record outright.
                warn!(offer_id = request.offer_id, "cancelling request against deleted offer");
                self.repo.delete_passenger_request(&guc_id).await?;
            }
        }

        session.request.chosen_offer_id = None;
        info!(offer_id = request.offer_id, passenger = %guc_id, "request cancelled");
        Ok(format!(
            "Your request to join carpool #{} is cancelled.",
            request.offer_id
        ))
    }

    // ── Owner side ──────────────────────────────────────────────────

    /// Confirm a pending candidate, taking one seat.
    pub async fn accept(&self, session: &mut Session, passenger_id: &str) -> Result<String> {
        let offer_id = own_offer_id(session)?;
        let (guc_id, _) = identity_of(session)?;
        let guc_id = guc_id.to_string();

        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.get_offer_or_not_found(offer_id).await?;
        if offer.guc_id != guc_id {
            return Err(ChatError::Unauthorized(
                "Only the carpool's owner can accept passengers.".into(),
            ));
        }

        let Some(idx) = offer
            .pending_passengers
            .iter()
            .position(|p| p.eq_ignore_ascii_case(passenger_id))
        else {
            return Err(ChatError::NotFound(format!(
                "{passenger_id} didn't ask to join your carpool."
            )));
        };
        if offer.seats_remaining == 0 {
            return Err(ChatError::Conflict(
                "There are no seats left in your carpool.".into(),
            ));
        }

        let passenger = offer.pending_passengers.remove(idx);
        offer.current_passengers.push(passenger.clone());
        offer.seats_remaining -= 1;
        self.repo.update_offer(&offer).await?;
        self.repo
            .update_request_status(&passenger, RequestStatus::Accepted)
            .await?;

        mirror_offer(session, &offer);
        info!(offer_id, passenger = %passenger, "passenger accepted");
        Ok(format!(
            "{passenger} is now riding with you. You have {} seats left.",
            offer.seats_remaining
        ))
    }

    /// Decline a candidate, or remove an already-confirmed rider (their
    /// seat comes back).
    pub async fn reject(&self, session: &mut Session, passenger_id: &str) -> Result<String> {
        let offer_id = own_offer_id(session)?;
        let (guc_id, _) = identity_of(session)?;
        let guc_id = guc_id.to_string();

        let _guard = self.locks.acquire(offer_id).await;
        let mut offer = self.get_offer_or_not_found(offer_id).await?;
        if offer.guc_id != guc_id {
            return Err(ChatError::Unauthorized(
                "Only the carpool's owner can reject passengers.".into(),
            ));
        }

        let request = self
            .repo
            .requests_by_identity(passenger_id)
            .await?
            .into_iter()
            .find(|r| r.offer_id == offer_id && r.status.is_active());
        if request.is_none() {
            return Err(ChatError::NotFound(format!(
                "{passenger_id} didn't ask to join your carpool."
            )));
        }

        let was_current = remove_passenger(&mut offer, passenger_id);
        if was_current {
            offer.seats_remaining += 1;
        }
        self.repo.update_offer(&offer).await?;
        self.repo
            .update_request_status(passenger_id, RequestStatus::Rejected)
            .await?;

        mirror_offer(session, &offer);
        info!(offer_id, passenger = %passenger_id, was_current, "passenger rejected");
        Ok(format!("{passenger_id} has been removed from your carpool."))
    }

    /// Remove the owner's offer. Outstanding passenger requests are left
    /// behind; the notification deriver reconciles them lazily.
    pub async fn delete_offer(&self, session: &mut Session) -> Result<String> {
        let offer_id = own_offer_id(session)?;
        let (guc_id, _) = identity_of(session)?;

        let _guard = self.locks.acquire(offer_id).await;
        let offer = self.get_offer_or_not_found(offer_id).await?;
        if offer.guc_id != guc_id {
            return Err(ChatError::Unauthorized(
                "Only the carpool's owner can delete it.".into(),
            ));
        }
        self.repo.delete_offer(offer_id).await?;

        session.create = CreateSlots::default();
        info!(offer_id, owner = %offer.guc_id, "offer deleted");
        Ok("Your carpool offer is deleted. Say 'create' whenever you want to post another.".into())
    }

    // ── Browsing ────────────────────────────────────────────────────

    /// Show one offer in detail, or browse.
    pub async fn view(
        &self,
        session: &Session,
        id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<String> {
        match id.or(session.create.offer_id) {
            Some(id) => {
                let offer = self.get_offer_or_not_found(id).await?;
                Ok(self.render_offer(&offer).await)
            }
            None => self.list_matches(session, now).await,
        }
    }

    /// Candidate offers for the session's request: someone else's ride, in
    /// the same direction, with seats open and a future start time.
    pub async fn list_matches(&self, session: &Session, now: DateTime<Utc>) -> Result<String> {
        let guc_id = session.guc_id.as_deref().unwrap_or_default();
        let wanted_direction = session.request.from_campus;

        let mut listing = String::new();
        let mut count = 0usize;
        for offer in self.repo.list_offers().await? {
            if offer.guc_id == guc_id
                || offer.seats_remaining == 0
                || offer.start_time <= now
                || wanted_direction.is_some_and(|d| d != offer.from_campus)
            {
                continue;
            }
            listing.push_str(&offer.summary(None));
            listing.push('\n');
            count += 1;
        }

        if count == 0 {
            Ok("I couldn't find any carpools matching your request right now. \
                Check again later!"
                .into())
        } else {
            Ok(format!(
                "Here's what I found:\n{listing}Say 'choose <id>' to pick one."
            ))
        }
    }

    /// Best-effort turn-by-turn route for the ride this identity is part
    /// of: the offer they chose, or the one they own.
    pub async fn route(&self, session: &Session) -> Result<String> {
        let offer_id = session
            .request
            .chosen_offer_id
            .or(session.create.offer_id)
            .ok_or_else(|| {
                ChatError::Validation(
                    "You're not part of any carpool yet, so there's no route to show.".into(),
                )
            })?;
        let offer = self.get_offer_or_not_found(offer_id).await?;

        let place = format!("{},{}", offer.latitude, offer.longitude);
        let (from, to) = if offer.from_campus {
            (CAMPUS_PLACE, place.as_str())
        } else {
            (place.as_str(), CAMPUS_PLACE)
        };

        // Failures degrade to an apology, never an error.
        match self.directions.route(from, to).await {
            Ok(instructions) => Ok(format!("Here's the route for your ride:\n{instructions}")),
            Err(e) => {
                warn!(error = %e, offer_id, "route lookup failed");
                Ok("I couldn't fetch the route right now, sorry! Try again in a bit.".into())
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn get_offer_or_not_found(&self, id: u64) -> Result<RideOffer> {
        self.repo.get_offer(id).await?.ok_or_else(|| {
            ChatError::NotFound(format!("There's no carpool with the id #{id}."))
        })
    }

    /// Offer summary with a best-effort street address.
    async fn render_offer(&self, offer: &RideOffer) -> String {
        let address = self
            .directions
            .reverse_geocode(offer.latitude, offer.longitude)
            .await
            .ok();
        offer.summary(address.as_deref())
    }
}

fn identity_of(session: &Session) -> Result<(&str, &str)> {
    session.identity().ok_or_else(|| {
        ChatError::Unauthorized("I don't know who you are yet. Please log in first.".into())
    })
}

fn own_offer_id(session: &Session) -> Result<u64> {
    session.create.offer_id.ok_or_else(|| {
        ChatError::Validation(
            "You don't have a carpool offer. Say 'create' to post one.".into(),
        )
    })
}

/// Remove the identity from whichever passenger list holds it. Returns
/// `true` when it was a confirmed rider (the caller returns the seat).
fn remove_passenger(offer: &mut RideOffer, guc_id: &str) -> bool {
    if let Some(idx) = offer
        .current_passengers
        .iter()
        .position(|p| p.eq_ignore_ascii_case(guc_id))
    {
        offer.current_passengers.remove(idx);
        return true;
    }
    if let Some(idx) = offer
        .pending_passengers
        .iter()
        .position(|p| p.eq_ignore_ascii_case(guc_id))
    {
        offer.pending_passengers.remove(idx);
    }
    false
}

/// Re-derive the owner session's passenger mirrors from the stored offer.
fn mirror_offer(session: &mut Session, offer: &RideOffer) {
    session.create.current_passengers = offer.current_passengers.clone();
    session.create.pending_passengers = offer.pending_passengers.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directions::NoDirections;
    use crate::store::MemoryRepository;
    use chrono::{Duration, Utc};

    fn workflow() -> (MatchingWorkflow, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let wf = MatchingWorkflow::new(repo.clone(), Arc::new(NoDirections));
        (wf, repo)
    }

    fn session_for(guc_id: &str, name: &str) -> Session {
        Session {
            guc_id: Some(guc_id.into()),
            display_name: Some(name.into()),
            ..Default::default()
        }
    }

    async fn seed_offer(repo: &MemoryRepository, owner: &str, seats: u32) -> u64 {
        let id = repo.next_offer_id().await.unwrap();
        let mut offer = RideOffer::new(
            owner,
            owner,
            true,
            29.98,
            31.44,
            Utc::now() + Duration::hours(24),
            seats,
        );
        offer.id = id;
        repo.create_offer(&offer).await.unwrap();
        id
    }

    #[tokio::test]
    async fn choose_then_accept() {
        let (wf, repo) = workflow();
        let offer_id = seed_offer(&repo, "34-1111", 2).await;

        let mut owner = session_for("34-1111", "A");
        owner.create.offer_id = Some(offer_id);
        let mut rider = session_for("55-2222", "B");

        wf.choose(&mut rider, offer_id).await.unwrap();
        assert_eq!(rider.request.chosen_offer_id, Some(offer_id));

        wf.accept(&mut owner, "55-2222").await.unwrap();

        let offer = repo.get_offer(offer_id).await.unwrap().unwrap();
        assert_eq!(offer.current_passengers, vec!["55-2222".to_string()]);
        assert!(offer.pending_passengers.is_empty());
        assert_eq!(offer.seats_remaining, 1);
        assert!(offer.seats_consistent());

        let request = &repo.requests_by_identity("55-2222").await.unwrap()[0];
        assert_eq!(request.status, RequestStatus::Accepted);
        assert_eq!(owner.create.current_passengers, vec!["55-2222".to_string()]);
    }

    #[tokio::test]
    async fn reject_confirmed_rider_returns_seat() {
        let (wf, repo) = workflow();
        let offer_id = seed_offer(&repo, "34-1111", 2).await;
        let mut owner = session_for("34-1111", "A");
        owner.create.offer_id = Some(offer_id);
        let mut rider = session_for("55-2222", "B");

        wf.choose(&mut rider, offer_id).await.unwrap();
        wf.accept(&mut owner, "55-2222").await.unwrap();
        wf.reject(&mut owner, "55-2222").await.unwrap();

        let offer = repo.get_offer(offer_id).await.unwrap().unwrap();
        assert!(offer.current_passengers.is_empty());
        assert!(offer.pending_passengers.is_empty());
        assert_eq!(offer.seats_remaining, 2);
        assert!(offer.seats_consistent());
        assert_eq!(
            repo.requests_by_identity("55-2222").await.unwrap()[0].status,
            RequestStatus::Rejected
        );
    }

    #[tokio::test]
    async fn cannot_choose_own_offer() {
        let (wf, repo) = workflow();
        let offer_id = seed_offer(&repo, "34-1111", 2).await;
        let mut owner = session_for("34-1111", "A");

        let err = wf.choose(&mut owner, offer_id).await.unwrap_err();
        assert!(matches!(err, ChatError::Conflict(_)));
        assert!(repo.requests_by_identity("34-1111").await.unwrap().is_empty());
        assert!(owner.request.chosen_offer_id.is_none());
    }

    #[tokio::test]
    async fn one_active_request_per_identity() {
        let (wf, repo) = workflow();
        let first = seed_offer(&repo, "34-1111", 2).await;
        let second = seed_offer(&repo, "34-3333", 2).await;
        let mut rider = session_for("55-2222", "B");

        wf.choose(&mut rider, first).await.unwrap();
        let err = wf.choose(&mut rider, second).await.unwrap_err();
        assert!(matches!(err, ChatError::Conflict(_)));

        // After cancelling they can commit elsewhere.
        wf.cancel_request(&mut rider).await.unwrap();
        assert!(rider.request.chosen_offer_id.is_none());
        wf.choose(&mut rider, second).await.unwrap();
    }

    #[tokio::test]
    async fn racing_duplicate_chooses_surface_a_conflict() {
        let (wf, repo) = workflow();
        let first = seed_offer(&repo, "11-1", 2).await;
        let second = seed_offer(&repo, "11-2", 2).await;

        let mut a = session_for("55-2222", "B");
        let mut b = session_for("55-2222", "B");
        let (ra, rb) = tokio::join!(wf.choose(&mut a, first), wf.choose(&mut b, second));

        // Exactly one commitment sticks; the loser gets a conflict, never a
        // raw repository error.
        let errs: Vec<_> = [ra, rb].into_iter().filter_map(|r| r.err()).collect();
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0], ChatError::Conflict(_)));
        assert_eq!(repo.requests_by_identity("55-2222").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn accept_fails_when_no_seats_left() {
        let (wf, repo) = workflow();
        let offer_id = seed_offer(&repo, "34-1111", 1).await;
        let mut owner = session_for("34-1111", "A");
        owner.create.offer_id = Some(offer_id);

        let mut first = session_for("55-1", "B");
        let mut second = session_for("55-2", "C");
        wf.choose(&mut first, offer_id).await.unwrap();
        wf.choose(&mut second, offer_id).await.unwrap();

        wf.accept(&mut owner, "55-1").await.unwrap();
        let err = wf.accept(&mut owner, "55-2").await.unwrap_err();
        assert!(matches!(err, ChatError::Conflict(_)));

        let offer = repo.get_offer(offer_id).await.unwrap().unwrap();
        assert_eq!(offer.seats_remaining, 0);
        assert!(offer.seats_consistent());
        // The second candidate is still pending, not silently dropped.
        assert_eq!(offer.pending_passengers, vec!["55-2".to_string()]);
    }

    #[tokio::test]
    async fn accept_requires_ownership() {
        let (wf, repo) = workflow();
        let offer_id = seed_offer(&repo, "34-1111", 2).await;
        let mut rider = session_for("55-2222", "B");
        wf.choose(&mut rider, offer_id).await.unwrap();

        // Someone else pretending the offer is theirs.
        let mut impostor = session_for("99-9999", "Z");
        impostor.create.offer_id = Some(offer_id);
        let err = wf.accept(&mut impostor, "55-2222").await.unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn cancel_after_accept_returns_seat() {
        let (wf, repo) = workflow();
        let offer_id = seed_offer(&repo, "34-1111", 2).await;
        let mut owner = session_for("34-1111", "A");
        owner.create.offer_id = Some(offer_id);
        let mut rider = session_for("55-2222", "B");

        wf.choose(&mut rider, offer_id).await.unwrap();
        wf.accept(&mut owner, "55-2222").await.unwrap();
        wf.cancel_request(&mut rider).await.unwrap();

        let offer = repo.get_offer(offer_id).await.unwrap().unwrap();
        assert_eq!(offer.seats_remaining, 2);
        assert!(offer.current_passengers.is_empty());
        assert!(offer.seats_consistent());
        assert_eq!(
            repo.requests_by_identity("55-2222").await.unwrap()[0].status,
            RequestStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn delete_offer_leaves_requests_for_lazy_cleanup() {
        let (wf, repo) = workflow();
        let offer_id = seed_offer(&repo, "34-1111", 2).await;
        let mut owner = session_for("34-1111", "A");
        owner.create.offer_id = Some(offer_id);
        let mut rider = session_for("55-2222", "B");
        wf.choose(&mut rider, offer_id).await.unwrap();

        wf.delete_offer(&mut owner).await.unwrap();
        assert!(owner.create.offer_id.is_none());
        assert!(repo.get_offer(offer_id).await.unwrap().is_none());

        // The pending request dangles until the deriver reconciles it.
        assert_eq!(repo.requests_by_identity("55-2222").await.unwrap().len(), 1);

        // Cancelling against the deleted offer just drops the record.
        wf.cancel_request(&mut rider).await.unwrap();
        assert!(repo.requests_by_identity("55-2222").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn matches_filter_direction_seats_and_ownership() {
        let (wf, repo) = workflow();
        let now = Utc::now();
        seed_offer(&repo, "11-1", 2).await; // from campus, has seats
        let full = seed_offer(&repo, "11-2", 1).await;
        let mine = seed_offer(&repo, "55-9", 3).await;

        // Fill the second offer.
        let mut offer = repo.get_offer(full).await.unwrap().unwrap();
        offer.current_passengers.push("x".into());
        offer.seats_remaining = 0;
        repo.update_offer(&offer).await.unwrap();

        let mut session = session_for("55-9", "Me");
        session.create.offer_id = Some(mine);
        session.request.from_campus = Some(true);

        let listing = wf.list_matches(&session, now).await.unwrap();
        assert!(listing.contains("Offer #1"));
        assert!(!listing.contains(&format!("Offer #{full}")), "full offer listed");
        assert!(!listing.contains(&format!("Offer #{mine}")), "own offer listed");

        // Opposite direction filters everything out.
        session.request.from_campus = Some(false);
        let listing = wf.list_matches(&session, now).await.unwrap();
        assert!(listing.contains("couldn't find any carpools"));
    }
}
