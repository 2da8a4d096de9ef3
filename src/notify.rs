//! Notification deriver — digest of everything that happened to a user
//! since they last asked.
//!
//! Terminal-state records are deleted as they are reported: the deletion is
//! the acknowledgment, so each rejection or withdrawal is surfaced exactly
//! once per reader (at-most-once if the response is lost in flight — an
//! accepted trade-off). Pending candidates on the user's own offer are
//! listed non-destructively and re-derived on every call.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::store::model::RequestStatus;
use crate::store::Repository;

/// Canonical reply when nothing happened.
const NOTHING_TO_REPORT: &str = "Nothing to report right now. I'll keep you posted!";

/// Builds human-readable digests from durable state.
pub struct NotificationDeriver {
    repo: Arc<dyn Repository>,
}

impl NotificationDeriver {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Digest for one identity.
    pub async fn derive(&self, guc_id: &str) -> Result<String> {
        let mut lines: Vec<String> = Vec::new();

        // Outcomes of the user's own requests.
        for request in self.repo.requests_by_identity(guc_id).await? {
            match request.status {
                RequestStatus::Rejected => {
                    lines.push(format!(
                        "Your request to join carpool #{} was declined.",
                        request.offer_id
                    ));
                    self.repo.delete_passenger_request(guc_id).await?;
                }
                RequestStatus::Pending | RequestStatus::Accepted => {
                    // Lazy reconciliation: the offer may have been deleted
                    // without cascading to this request.
                    if self.repo.get_offer(request.offer_id).await?.is_none() {
                        warn!(
                            offer_id = request.offer_id,
                            passenger = %guc_id,
                            "request points at deleted offer, reconciling"
                        );
                        lines.push(format!(
                            "Carpool #{} no longer exists — your request was dropped.",
                            request.offer_id
                        ));
                        self.repo.delete_passenger_request(guc_id).await?;
                    }
                }
                RequestStatus::Cancelled => {
                    // Their own withdrawal; surfaced to the offer's owner below.
                }
            }
        }

        // Activity on the user's own offer.
        let own_offer = self
            .repo
            .list_offers()
            .await?
            .into_iter()
            .find(|o| o.guc_id == guc_id);
        if let Some(offer) = own_offer {
            let requests = self.repo.requests_by_offer(offer.id).await?;
            for request in &requests {
                if request.status == RequestStatus::Cancelled {
                    lines.push(format!(
                        "{} ({}) withdrew from your carpool.",
                        request.display_name, request.guc_id
                    ));
                    self.repo.delete_passenger_request(&request.guc_id).await?;
                }
            }
            for candidate in &offer.pending_passengers {
                let who = requests
                    .iter()
                    .find(|r| r.guc_id == *candidate)
                    .map(|r| format!("{} ({})", r.display_name, r.guc_id))
                    .unwrap_or_else(|| candidate.clone());
                lines.push(format!(
                    "{who} is awaiting your decision — say 'accept {candidate}' \
                     or 'reject {candidate}'."
                ));
            }
        }

        if lines.is_empty() {
            Ok(NOTHING_TO_REPORT.into())
        } else {
            info!(guc_id = %guc_id, count = lines.len(), "derived notifications");
            Ok(lines.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::{PassengerRequest, RideOffer};
    use crate::store::MemoryRepository;
    use chrono::Utc;

    async fn seeded() -> (NotificationDeriver, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        (NotificationDeriver::new(repo.clone()), repo)
    }

    async fn seed_offer(repo: &MemoryRepository, owner: &str) -> u64 {
        let id = repo.next_offer_id().await.unwrap();
        let mut offer = RideOffer::new(owner, owner, true, 29.9, 31.4, Utc::now(), 2);
        offer.id = id;
        repo.create_offer(&offer).await.unwrap();
        id
    }

    #[tokio::test]
    async fn empty_digest_is_canonical() {
        let (deriver, _) = seeded().await;
        assert_eq!(deriver.derive("34-1111").await.unwrap(), NOTHING_TO_REPORT);
    }

    #[tokio::test]
    async fn rejection_is_surfaced_exactly_once() {
        let (deriver, repo) = seeded().await;
        let offer_id = seed_offer(&repo, "11-1").await;
        let mut request = PassengerRequest::new("55-2222", "Sara", offer_id);
        request.status = RequestStatus::Rejected;
        repo.create_passenger_request(&request).await.unwrap();

        let digest = deriver.derive("55-2222").await.unwrap();
        assert_eq!(digest.matches("declined").count(), 1);

        // Acknowledged by deletion: the second call has nothing left.
        assert_eq!(deriver.derive("55-2222").await.unwrap(), NOTHING_TO_REPORT);
    }

    #[tokio::test]
    async fn owner_sees_withdrawals_and_pending_candidates() {
        let (deriver, repo) = seeded().await;
        let offer_id = seed_offer(&repo, "11-1").await;

        let mut offer = repo.get_offer(offer_id).await.unwrap().unwrap();
        offer.pending_passengers.push("55-3333".into());
        repo.update_offer(&offer).await.unwrap();

        let mut withdrawn = PassengerRequest::new("55-2222", "Sara", offer_id);
        withdrawn.status = RequestStatus::Cancelled;
        repo.create_passenger_request(&withdrawn).await.unwrap();
        repo.create_passenger_request(&PassengerRequest::new("55-3333", "Omar", offer_id))
            .await
            .unwrap();

        let digest = deriver.derive("11-1").await.unwrap();
        assert!(digest.contains("Sara (55-2222) withdrew"));
        assert!(digest.contains("Omar (55-3333) is awaiting your decision"));
        assert!(digest.contains("say 'accept 55-3333'"));

        // The withdrawal is consumed, the pending listing is re-derived.
        let second = deriver.derive("11-1").await.unwrap();
        assert!(!second.contains("withdrew"));
        assert!(second.contains("Omar (55-3333) is awaiting your decision"));
    }

    #[tokio::test]
    async fn dangling_request_is_reconciled() {
        let (deriver, repo) = seeded().await;
        repo.create_passenger_request(&PassengerRequest::new("55-2222", "Sara", 42))
            .await
            .unwrap();

        let digest = deriver.derive("55-2222").await.unwrap();
        assert!(digest.contains("no longer exists"));
        assert!(repo.requests_by_identity("55-2222").await.unwrap().is_empty());
    }
}
