//! Process-wide session store.
//!
//! Maps opaque tokens to sessions. Every read-modify-write runs under one
//! store-wide lock: `merge` walks the whole collection and moves slots
//! between two entries, so per-entry locking would not be enough.
//!
//! Turn handling works on a snapshot: the caller fetches a clone, runs the
//! turn against it, and commits the clone back only if the turn succeeded.
//! A failed turn therefore never leaves a session half-mutated.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::session::model::Session;

/// Shared store of live sessions.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh token with an empty session.
    pub async fn begin(&self) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .await
            .insert(token.clone(), Session::default());
        debug!(token = %token, "session started");
        token
    }

    /// Snapshot of the session for `token`, if any.
    pub async fn get(&self, token: &str) -> Option<Session> {
        self.sessions.lock().await.get(token).cloned()
    }

    /// Commit a turn's session snapshot back under `token`.
    pub async fn put(&self, token: &str, session: Session) {
        self.sessions.lock().await.insert(token.to_string(), session);
    }

    /// Bind `token` to an identity, migrating any older session already
    /// bound to the same identity.
    ///
    /// If another token holds this identity's slots (a re-login), those
    /// slots are copied wholesale into this token's session and the old
    /// entry is discarded. Idempotent: a second merge finds nothing to move.
    pub async fn merge(&self, token: &str, guc_id: &str, display_name: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;

        let old_token = sessions
            .iter()
            .find(|(t, s)| t.as_str() != token && s.guc_id.as_deref() == Some(guc_id))
            .map(|(t, _)| t.clone());

        let mut session = match old_token {
            Some(old) => {
                info!(guc_id = %guc_id, "re-login, migrating previous session");
                sessions.remove(&old)?
            }
            None => sessions.get(token).cloned()?,
        };

        session.guc_id = Some(guc_id.to_string());
        session.display_name = Some(display_name.to_string());
        sessions.insert(token.to_string(), session.clone());
        Some(session)
    }

    /// Drop a session on logout.
    pub async fn end(&self, token: &str) -> bool {
        self.sessions.lock().await.remove(token).is_some()
    }
}
