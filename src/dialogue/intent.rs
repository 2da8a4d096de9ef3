//! Intent classification and command parsing.
//!
//! Flow intents are substring matches ("create"/"offer" vs
//! "request"/"find"/"join"). Commands are matched on the first word of the
//! message so ordinary sentences never trigger them by accident.

use crate::session::Flow;

/// Classify the first message of a conversation into a flow.
///
/// "offered" does not count as "offer" — people describe rides they were
/// offered when they want to find one.
pub fn classify_intent(text: &str) -> Option<Flow> {
    let lower = text.to_lowercase();
    if lower.contains("create") || (lower.contains("offer") && !lower.contains("offered")) {
        Some(Flow::Create)
    } else if lower.contains("request") || lower.contains("find") || lower.contains("join") {
        Some(Flow::Request)
    } else {
        None
    }
}

/// A recognized command word, with its argument where one applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Browse offers, or show one offer in detail.
    View(Option<u64>),
    /// Commit to an offer as a passenger.
    Choose(u64),
    /// Owner confirms a pending candidate.
    Accept(String),
    /// Owner declines a candidate or removes a confirmed rider.
    Reject(String),
    /// Passenger withdraws their own request.
    Cancel,
    /// Owner removes their offer.
    Delete,
    /// Re-enter the flow's questions, keeping the durable record.
    Edit,
    /// Notification digest.
    Updates,
    /// Turn-by-turn route for the committed ride.
    Route,
    Help,
    Logout,
}

/// Parse a command from the start of a message.
pub fn parse_command(text: &str) -> Option<Command> {
    let lower = text.trim().to_lowercase();
    let mut words = lower.split_whitespace();
    let head = words.next()?;
    let arg = words.next();

    match head {
        "view" => Some(Command::View(arg.and_then(|a| a.parse().ok()))),
        "choose" => arg.and_then(|a| a.parse().ok()).map(Command::Choose),
        "accept" => arg.map(|a| Command::Accept(a.to_string())),
        "reject" => arg.map(|a| Command::Reject(a.to_string())),
        "cancel" => Some(Command::Cancel),
        "delete" => Some(Command::Delete),
        "edit" => Some(Command::Edit),
        "updates" | "notifications" => Some(Command::Updates),
        "route" => Some(Command::Route),
        "help" => Some(Command::Help),
        "logout" => Some(Command::Logout),
        _ => None,
    }
}
