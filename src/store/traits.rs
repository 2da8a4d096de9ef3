//! `Repository` trait — single async interface for durable carpool state.
//!
//! The dialogue engine and matching workflow only touch offers and passenger
//! requests through this trait and never cache durable state beyond the
//! current turn. The backing technology is deliberately abstract; the crate
//! ships an in-memory backend.

use async_trait::async_trait;

use crate::error::RepositoryError;
use crate::store::model::{PassengerRequest, RequestStatus, RideOffer};

/// Backend-agnostic storage for ride offers and passenger requests.
#[async_trait]
pub trait Repository: Send + Sync {
    // ── Ride offers ─────────────────────────────────────────────────

    /// Allocate the next offer id. Monotonic, never reused.
    async fn next_offer_id(&self) -> Result<u64, RepositoryError>;

    /// Insert a new offer under its pre-allocated id.
    async fn create_offer(&self, offer: &RideOffer) -> Result<(), RepositoryError>;

    /// Replace the stored offer with the same id.
    async fn update_offer(&self, offer: &RideOffer) -> Result<(), RepositoryError>;

    /// Get an offer by id.
    async fn get_offer(&self, id: u64) -> Result<Option<RideOffer>, RepositoryError>;

    /// Delete an offer by id.
    async fn delete_offer(&self, id: u64) -> Result<(), RepositoryError>;

    /// All offers, in id order.
    async fn list_offers(&self) -> Result<Vec<RideOffer>, RepositoryError>;

    // ── Passenger requests ──────────────────────────────────────────

    /// Insert a new passenger request.
    async fn create_passenger_request(
        &self,
        request: &PassengerRequest,
    ) -> Result<(), RepositoryError>;

    /// Set the status of the identity's request.
    async fn update_request_status(
        &self,
        guc_id: &str,
        status: RequestStatus,
    ) -> Result<(), RepositoryError>;

    /// Delete the identity's request.
    async fn delete_passenger_request(&self, guc_id: &str) -> Result<(), RepositoryError>;

    /// All requests made by an identity.
    async fn requests_by_identity(
        &self,
        guc_id: &str,
    ) -> Result<Vec<PassengerRequest>, RepositoryError>;

    /// All requests targeting an offer.
    async fn requests_by_offer(
        &self,
        offer_id: u64,
    ) -> Result<Vec<PassengerRequest>, RepositoryError>;
}
