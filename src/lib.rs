//! Campus Carpool — conversational ride sharing.

pub mod chat;
pub mod config;
pub mod dialogue;
pub mod directions;
pub mod error;
pub mod http;
pub mod matching;
pub mod notify;
pub mod session;
pub mod store;
