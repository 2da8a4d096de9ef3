//! In-memory repository backend.
//!
//! Keeps offers in a `BTreeMap` (so listings come back in id order) and at
//! most one passenger request per identity, mirroring the one-active-request
//! rule. All access goes through a single `RwLock`; the matching workflow
//! layers per-offer locking on top for its read-modify-write cycles.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::RepositoryError;
use crate::store::model::{PassengerRequest, RequestStatus, RideOffer};
use crate::store::traits::Repository;

#[derive(Default)]
struct Inner {
    offers: BTreeMap<u64, RideOffer>,
    /// Keyed by passenger identity — one record per identity.
    requests: HashMap<String, PassengerRequest>,
    next_offer_id: u64,
}

/// Process-local `Repository` backend.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn next_offer_id(&self) -> Result<u64, RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.next_offer_id += 1;
        Ok(inner.next_offer_id)
    }

    async fn create_offer(&self, offer: &RideOffer) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        if inner.offers.contains_key(&offer.id) {
            return Err(RepositoryError::Constraint(format!(
                "offer {} already exists",
                offer.id
            )));
        }
        inner.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn update_offer(&self, offer: &RideOffer) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.offers.get_mut(&offer.id) {
            Some(stored) => {
                *stored = offer.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                entity: "offer".into(),
                id: offer.id.to_string(),
            }),
        }
    }

    async fn get_offer(&self, id: u64) -> Result<Option<RideOffer>, RepositoryError> {
        Ok(self.inner.read().await.offers.get(&id).cloned())
    }

    async fn delete_offer(&self, id: u64) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.offers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound {
                entity: "offer".into(),
                id: id.to_string(),
            }),
        }
    }

    async fn list_offers(&self) -> Result<Vec<RideOffer>, RepositoryError> {
        Ok(self.inner.read().await.offers.values().cloned().collect())
    }

    async fn create_passenger_request(
        &self,
        request: &PassengerRequest,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.requests.get(&request.guc_id) {
            // A terminal leftover (unread rejection/cancellation) is
            // replaced; an active one is a constraint breach.
            if existing.status.is_active() {
                return Err(RepositoryError::Constraint(format!(
                    "identity {} already has an active request",
                    request.guc_id
                )));
            }
        }
        inner
            .requests
            .insert(request.guc_id.clone(), request.clone());
        Ok(())
    }

    async fn update_request_status(
        &self,
        guc_id: &str,
        status: RequestStatus,
    ) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.requests.get_mut(guc_id) {
            Some(request) => {
                request.status = status;
                Ok(())
            }
            None => Err(RepositoryError::NotFound {
                entity: "passenger request".into(),
                id: guc_id.to_string(),
            }),
        }
    }

    async fn delete_passenger_request(&self, guc_id: &str) -> Result<(), RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.requests.remove(guc_id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound {
                entity: "passenger request".into(),
                id: guc_id.to_string(),
            }),
        }
    }

    async fn requests_by_identity(
        &self,
        guc_id: &str,
    ) -> Result<Vec<PassengerRequest>, RepositoryError> {
        Ok(self
            .inner
            .read()
            .await
            .requests
            .get(guc_id)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn requests_by_offer(
        &self,
        offer_id: u64,
    ) -> Result<Vec<PassengerRequest>, RepositoryError> {
        Ok(self
            .inner
            .read()
            .await
            .requests
            .values()
            .filter(|r| r.offer_id == offer_id)
            .cloned()
            .collect())
    }
}
