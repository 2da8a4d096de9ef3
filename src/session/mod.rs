//! Ephemeral conversation state — typed slot records and the token store.

pub mod model;
pub mod store;

pub use model::{CreateSlots, Flow, RequestSlots, Session};
pub use store::SessionStore;
