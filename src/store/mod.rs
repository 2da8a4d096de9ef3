//! Persistence layer — durable carpool state behind the `Repository` trait.

pub mod memory;
pub mod model;
pub mod traits;

pub use memory::MemoryRepository;
pub use model::{PassengerRequest, RequestStatus, RideOffer, START_TIME_FORMAT};
pub use traits::Repository;
