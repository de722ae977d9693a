use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    ClientClosed,
    UpstreamClosed,
    AuthFailed,
    InternalError,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedMessage {
    pub sender: Sender,
    pub text: String,
    pub interrupted: bool,
}

/// Per-connection record. Mutated only by the owning bridge's two tasks;
/// no cross-session sharing. See `SPEC_FULL.md` §9 for the ownership
/// adaptation from "single-threaded executor" to "disjoint-field
/// ownership behind a mutex."
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub subject_id: Option<String>,
    pub active_agent_id: String,
    pub composed_session: Map<String, Value>,
    pub messages: Vec<CapturedMessage>,
    pub tools_called: BTreeSet<String>,
    pub agents_used: Vec<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub disconnect_reason: Option<DisconnectReason>,
    pub graceful: bool,
}

impl Session {
    pub fn new(id: impl Into<String>, subject_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            subject_id,
            active_agent_id: "root".to_string(),
            composed_session: Map::new(),
            messages: Vec::new(),
            tools_called: BTreeSet::new(),
            agents_used: vec!["root".to_string()],
            start_at: Utc::now(),
            end_at: None,
            disconnect_reason: None,
            graceful: false,
        }
    }

    pub fn record_agent_used(&mut self, agent_id: impl Into<String>) {
        let agent_id = agent_id.into();
        if !self.agents_used.contains(&agent_id) {
            self.agents_used.push(agent_id);
        }
    }

    pub fn mark_last_assistant_message_interrupted(&mut self) {
        if let Some(msg) = self.messages.iter_mut().rev().find(|m| m.sender == Sender::Assistant) {
            msg.interrupted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_on_root_with_root_in_agents_used() {
        let session = Session::new("sess-1", Some("c42".to_string()));
        assert_eq!(session.active_agent_id, "root");
        assert_eq!(session.agents_used, vec!["root".to_string()]);
    }

    #[test]
    fn record_agent_used_does_not_duplicate() {
        let mut session = Session::new("sess-1", None);
        session.record_agent_used("Assistant_Database_Agent");
        session.record_agent_used("Assistant_Database_Agent");
        assert_eq!(
            session.agents_used,
            vec!["root".to_string(), "Assistant_Database_Agent".to_string()]
        );
    }

    #[test]
    fn interruption_marks_the_most_recent_assistant_message_only() {
        let mut session = Session::new("sess-1", None);
        session.messages.push(CapturedMessage {
            sender: Sender::Assistant,
            text: "first".into(),
            interrupted: false,
        });
        session.messages.push(CapturedMessage {
            sender: Sender::User,
            text: "question".into(),
            interrupted: false,
        });
        session.messages.push(CapturedMessage {
            sender: Sender::Assistant,
            text: "second".into(),
            interrupted: false,
        });
        session.mark_last_assistant_message_interrupted();
        assert!(!session.messages[0].interrupted);
        assert!(session.messages[2].interrupted);
    }
}
