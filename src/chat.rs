//! Chat service — the two operations the transport layer sees.
//!
//! `start_session` allocates a token; `handle_turn` resolves the session,
//! bootstraps identity on the first message, then routes the turn to a
//! command, the matching workflow, or the dialogue engine. The turn runs
//! against a snapshot of the session that is committed back only on
//! success, so no error ever leaves a session half-mutated.

use std::sync::Arc;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::dialogue::intent::{self, Command};
use crate::dialogue::DialogueEngine;
use crate::error::{ChatError, Result};
use crate::matching::MatchingWorkflow;
use crate::notify::NotificationDeriver;
use crate::session::{Flow, Session, SessionStore};

/// GUC IDs look like "34-1111".
static GUC_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}-\d{1,6}$").expect("guc id regex"));

const GREETING: &str = "Welcome to GUC Carpool! Please tell me who you are \
                        first — send your GUC ID and name, like '34-1111:Your Name'.";

const HELP: &str = "Here's what I understand:\n\
                    - 'create' or 'offer' to post a carpool\n\
                    - 'request', 'find' or 'join' to look for one\n\
                    - 'view [id]' to browse carpools\n\
                    - 'choose <id>' to ask to join one\n\
                    - 'accept <guc-id>' / 'reject <guc-id>' on your own carpool\n\
                    - 'cancel' to withdraw your request, 'delete' to remove your offer\n\
                    - 'edit' to change your answers\n\
                    - 'updates' for news, 'route' for directions, 'logout' to leave";

/// Identity payload accepted as the first message.
#[derive(Deserialize)]
struct IdentityPayload {
    #[serde(rename = "gucID")]
    guc_id: String,
    name: String,
}

/// Everything a turn needs, shared across handlers.
pub struct ChatService {
    sessions: Arc<SessionStore>,
    engine: DialogueEngine,
    matching: MatchingWorkflow,
    notifier: NotificationDeriver,
}

impl ChatService {
    pub fn new(
        sessions: Arc<SessionStore>,
        engine: DialogueEngine,
        matching: MatchingWorkflow,
        notifier: NotificationDeriver,
    ) -> Self {
        Self {
            sessions,
            engine,
            matching,
            notifier,
        }
    }

    /// Allocate a token and greet.
    pub async fn start_session(&self) -> (String, String) {
        let token = self.sessions.begin().await;
        (token, GREETING.to_string())
    }

    /// Process one chat turn for the session behind `token`.
    pub async fn handle_turn(&self, token: &str, text: &str) -> Result<String> {
        let mut session = self.sessions.get(token).await.ok_or_else(|| {
            ChatError::Unauthorized(
                "I'm sorry, but your session has expired. Please log in and try again.".into(),
            )
        })?;

        // Identity first: nothing else runs until we know who this is.
        if session.identity().is_none() {
            return self.bind_identity(token, text).await;
        }

        if let Some(command) = intent::parse_command(text) {
            return self.run_command(token, session, command).await;
        }

        let now = Utc::now();
        // A fresh flow intent re-enters the engine even after another flow
        // finished; otherwise a completed session falls through to matching.
        let fresh_intent = session.mode.is_none()
            && intent::classify_intent(text).is_some_and(|flow| match flow {
                Flow::Create => !session.create.complete,
                Flow::Request => !session.request.complete,
            });

        let reply = if session.mode.is_some() || fresh_intent {
            self.engine.process(&mut session, text, now).await?
        } else if session.request.complete {
            self.matching.list_matches(&session, now).await?
        } else if session.create.complete {
            let guc_id = session.guc_id.clone().unwrap_or_default();
            format!(
                "{}\n(Say 'view' to see your carpool, 'edit' to change it, or 'help' \
                 for everything else.)",
                self.notifier.derive(&guc_id).await?
            )
        } else {
            self.engine.process(&mut session, text, now).await?
        };

        self.sessions.put(token, session).await;
        Ok(reply)
    }

    /// Parse and bind the identity pair from the first message.
    async fn bind_identity(&self, token: &str, text: &str) -> Result<String> {
        let (guc_id, name) = parse_identity(text)?;
        let session = self
            .sessions
            .merge(token, &guc_id, &name)
            .await
            .ok_or_else(|| {
                ChatError::Unauthorized(
                    "I'm sorry, but your session has expired. Please log in and try again.".into(),
                )
            })?;
        info!(guc_id = %guc_id, "identity bound to session");

        let resumed = session.mode.is_some();
        Ok(if resumed {
            format!("Welcome back, {name}! Let's pick up where we left off.")
        } else {
            format!("Hello {name}! Would you like to get a ride? Or are you offering one?")
        })
    }

    async fn run_command(
        &self,
        token: &str,
        mut session: Session,
        command: Command,
    ) -> Result<String> {
        let now = Utc::now();
        let reply = match command {
            Command::Help => HELP.to_string(),
            Command::Logout => {
                self.sessions.end(token).await;
                return Ok("Goodbye! Log back in whenever you need a ride.".into());
            }
            Command::Updates => {
                let guc_id = session.guc_id.clone().unwrap_or_default();
                self.notifier.derive(&guc_id).await?
            }
            Command::View(id) => self.matching.view(&session, id, now).await?,
            Command::Route => self.matching.route(&session).await?,
            Command::Choose(id) => self.matching.choose(&mut session, id).await?,
            Command::Accept(passenger) => self.matching.accept(&mut session, &passenger).await?,
            Command::Reject(passenger) => self.matching.reject(&mut session, &passenger).await?,
            Command::Cancel => self.matching.cancel_request(&mut session).await?,
            Command::Delete => self.matching.delete_offer(&mut session).await?,
            Command::Edit => edit(&mut session)?,
        };

        self.sessions.put(token, session).await;
        Ok(reply)
    }
}

/// Re-enter the flow the user completed, keeping the durable record.
fn edit(session: &mut Session) -> Result<String> {
    if session.create.offer_id.is_some() || session.create.complete {
        session.create.reset_for_edit();
        session.mode = Some(Flow::Create);
        Ok("Let's update your carpool. Are you going to the GUC, or are you \
            leaving campus?"
            .into())
    } else if session.request.complete {
        session.request.reset_for_edit();
        session.mode = Some(Flow::Request);
        Ok("Let's update your request. Are you going to the GUC, or are you \
            leaving campus?"
            .into())
    } else {
        Err(ChatError::Validation(
            "There's nothing to edit yet! Say 'create' or 'request' to get started.".into(),
        ))
    }
}

/// Accepts "34-1111:Name" or a JSON `{"gucID": ..., "name": ...}` payload.
fn parse_identity(text: &str) -> Result<(String, String)> {
    let (guc_id, name) = if let Ok(payload) = serde_json::from_str::<IdentityPayload>(text) {
        (payload.guc_id, payload.name)
    } else {
        match text.split_once(':') {
            Some((id, name)) => (id.trim().to_string(), name.trim().to_string()),
            None => {
                return Err(ChatError::Validation(
                    "I still don't know who you are! Send your GUC ID and name, \
                     like '34-1111:Your Name'."
                        .into(),
                ));
            }
        }
    };

    if !GUC_ID.is_match(&guc_id) || name.is_empty() {
        return Err(ChatError::Validation(
            "That doesn't look like a GUC ID. Send it like '34-1111:Your Name'.".into(),
        ));
    }
    Ok((guc_id, name))
}
