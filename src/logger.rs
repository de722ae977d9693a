use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::GatewayConfig;
use crate::credential::CredentialProvider;
use crate::docstore::DocumentStore;
use crate::error::GatewayError;
use crate::session::{CapturedMessage, Sender, Session};

/// Fixed scope used for the title-generation model's bearer token,
/// independent of the realtime provider's own credential scope.
const TITLE_CREDENTIAL_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

/// Persists completed conversations to the document store, generating a
/// short title along the way. Runs after a session tears down; never on
/// the hot path.
pub struct ConversationLogger {
    store: Arc<dyn DocumentStore>,
    credentials: Arc<dyn CredentialProvider>,
    http: reqwest::Client,
    title_endpoint: Option<String>,
    title_deployment: Option<String>,
    title_api_version: String,
}

impl ConversationLogger {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        credentials: Arc<dyn CredentialProvider>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            http: reqwest::Client::new(),
            title_endpoint: config.title_model_endpoint.clone(),
            title_deployment: config.title_model_deployment.clone(),
            title_api_version: config.title_model_api_version.clone(),
        }
    }

    /// Logs a completed session. Swallows and logs every failure: a
    /// logging outage must never surface back to a client.
    pub async fn log(&self, session: &Session) {
        if session.messages.is_empty() {
            tracing::info!(target: "logger", session_id = %session.id, "skipping log, no messages");
            return;
        }

        let document = self.build_document(session).await;
        let partition_key = session.subject_id.as_deref().unwrap_or("anonymous");
        match self.store.create_one(partition_key, document).await {
            Ok(()) => {
                tracing::info!(target: "logger", session_id = %session.id, messages = session.messages.len(), "logged conversation");
            },
            Err(e) => {
                tracing::error!(target: "logger", session_id = %session.id, error = %e, "failed to log conversation");
            },
        }
    }

    async fn build_document(&self, session: &Session) -> Value {
        let duration_seconds = session
            .end_at
            .map(|end| (end - session.start_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        let metadata = self.build_metadata(session);
        let title = self.generate_title(&session.messages).await;
        let timestamp = session.end_at.unwrap_or(session.start_at).timestamp_millis();
        let doc_id = format!("ai_conv_{}_{timestamp}", session.id);

        json!({
            "id": doc_id,
            "conversation_id": session.id,
            "subject_id": session.subject_id.clone().unwrap_or_else(|| "anonymous".to_string()),
            "title": title,
            "session_start": session.start_at.to_rfc3339(),
            "session_end": session.end_at.map(|e| e.to_rfc3339()),
            "duration_seconds": duration_seconds,
            "disconnect_reason": serde_json::to_value(session.disconnect_reason).unwrap_or(Value::Null),
            "graceful": session.graceful,
            "messages": serde_json::to_value(&session.messages).unwrap_or(Value::Array(vec![])),
            "metadata": metadata,
        })
    }

    fn build_metadata(&self, session: &Session) -> Value {
        let user_messages = session.messages.iter().filter(|m| m.sender == Sender::User).count();
        let assistant_messages = session
            .messages
            .iter()
            .filter(|m| m.sender == Sender::Assistant)
            .count();
        let interruptions = session.messages.iter().filter(|m| m.interrupted).count();

        json!({
            "total_messages": session.messages.len(),
            "user_messages": user_messages,
            "assistant_messages": assistant_messages,
            "interruptions": interruptions,
            "agents_used": session.agents_used,
            "tools_called": session.tools_called.iter().collect::<Vec<_>>(),
            "initial_agent": "root",
        })
    }

    async fn generate_title(&self, messages: &[CapturedMessage]) -> String {
        let (Some(endpoint), Some(deployment)) = (&self.title_endpoint, &self.title_deployment) else {
            return Self::fallback_title(messages);
        };

        match self.call_title_model(endpoint, deployment, messages).await {
            Ok(title) => title,
            Err(e) => {
                tracing::error!(target: "logger", error = %e, "failed to generate title, falling back");
                Self::fallback_title(messages)
            },
        }
    }

    fn fallback_title(messages: &[CapturedMessage]) -> String {
        for message in messages {
            if message.sender == Sender::User && !message.text.is_empty() {
                let truncated: String = message.text.chars().take(40).collect();
                return if message.text.chars().count() > 40 {
                    format!("{truncated}...")
                } else {
                    truncated
                };
            }
        }
        "Conversation".to_string()
    }

    async fn call_title_model(
        &self,
        endpoint: &str,
        deployment: &str,
        messages: &[CapturedMessage],
    ) -> Result<String, GatewayError> {
        let token = self
            .credentials
            .token(TITLE_CREDENTIAL_SCOPE)
            .await
            .map_err(|e| GatewayError::auth_failed(TITLE_CREDENTIAL_SCOPE, e.to_string()))?;

        let mut conversation_text = String::new();
        for message in messages.iter().take(10) {
            let sender = if message.sender == Sender::User { "User" } else { "Assistant" };
            conversation_text.push_str(&format!("{sender}: {}\n", message.text));
        }

        let url = format!(
            "{}/openai/deployments/{deployment}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            self.title_api_version,
        );
        let body = json!({
            "messages": [
                {"role": "system", "content": "You are a helpful assistant that creates concise conversation titles."},
                {"role": "user", "content": format!(
                    "Summarize the conversation so far into a 6-word or less title. \
                     Do not use any quotation marks or punctuation. \
                     Do not include any other commentary or description.\n\nConversation:\n{conversation_text}"
                )},
            ],
            "max_tokens": 20,
            "temperature": 0.3,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token.value)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::LoggerFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| GatewayError::LoggerFailed(e.to_string()))?;

        let payload: Value = response.json().await.map_err(|e| GatewayError::LoggerFailed(e.to_string()))?;
        let raw = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| GatewayError::LoggerFailed("title response missing content".into()))?;

        let cleaned = raw.trim().replace(['"', '\''], "");
        let cleaned = cleaned.trim_matches(|c: char| ".,!?;:".contains(c)).to_string();
        let title = if cleaned.chars().count() > 50 {
            let truncated: String = cleaned.chars().take(47).collect();
            format!("{truncated}...")
        } else {
            cleaned
        };
        Ok(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::credential::EnvCredentialProvider;
    use crate::docstore::InMemoryDocumentStore;
    use std::time::Duration;

    fn bare_config() -> GatewayConfig {
        GatewayConfig {
            upstream_endpoint: "wss://example.test".into(),
            upstream_api_version: "2024-10-01".into(),
            upstream_deployment: "gpt-realtime".into(),
            credential_scope: "https://example.test/.default".into(),
            tool_call_timeout: Duration::from_secs(15),
            upstream_handshake_timeout: Duration::from_secs(30),
            frontend_origins: vec![],
            docstore: None,
            title_model_endpoint: None,
            title_model_deployment: None,
            title_model_api_version: "2024-10-21".into(),
            bind_addr: "0.0.0.0:8080".into(),
        }
    }

    #[tokio::test]
    async fn sessions_with_no_messages_are_skipped() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let credentials = Arc::new(EnvCredentialProvider::new("UNUSED_TOKEN_VAR"));
        let logger = ConversationLogger::new(store.clone(), credentials, &bare_config());

        let session = Session::new("sess-1", Some("c42".to_string()));
        logger.log(&session).await;

        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn completed_session_is_persisted_keyed_by_customer() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let credentials = Arc::new(EnvCredentialProvider::new("UNUSED_TOKEN_VAR"));
        let logger = ConversationLogger::new(store.clone(), credentials, &bare_config());

        let mut session = Session::new("sess-1", Some("c42".to_string()));
        session.messages.push(CapturedMessage {
            sender: Sender::User,
            text: "what is my balance".to_string(),
            interrupted: false,
        });
        logger.log(&session).await;

        let all = store.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "c42");
        assert_eq!(all[0].1["title"], "what is my balance");
    }

    #[test]
    fn fallback_title_truncates_at_exactly_forty_chars_with_ellipsis_only_past_that() {
        let exactly_forty = "a".repeat(40);
        let msgs_exact = vec![CapturedMessage {
            sender: Sender::User,
            text: exactly_forty.clone(),
            interrupted: false,
        }];
        assert_eq!(ConversationLogger::fallback_title(&msgs_exact), exactly_forty);

        let forty_one = "a".repeat(41);
        let msgs_over = vec![CapturedMessage {
            sender: Sender::User,
            text: forty_one,
            interrupted: false,
        }];
        let title = ConversationLogger::fallback_title(&msgs_over);
        assert_eq!(title.len(), 43);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn fallback_title_defaults_to_conversation_when_no_user_message() {
        let msgs = vec![CapturedMessage {
            sender: Sender::Assistant,
            text: "hello".into(),
            interrupted: false,
        }];
        assert_eq!(ConversationLogger::fallback_title(&msgs), "Conversation");
    }

    #[test]
    fn metadata_counts_messages_and_interruptions() {
        let credentials_unused = ();
        let _ = credentials_unused;
        let store = Arc::new(InMemoryDocumentStore::new());
        let credentials = Arc::new(EnvCredentialProvider::new("UNUSED_TOKEN_VAR"));
        let logger = ConversationLogger::new(store, credentials, &bare_config());

        let mut session = Session::new("sess-1", None);
        session.messages.push(CapturedMessage {
            sender: Sender::User,
            text: "hi".into(),
            interrupted: false,
        });
        session.messages.push(CapturedMessage {
            sender: Sender::Assistant,
            text: "hello".into(),
            interrupted: true,
        });
        session.record_agent_used("Assistant_Database_Agent");

        let metadata = logger.build_metadata(&session);
        assert_eq!(metadata["total_messages"], 2);
        assert_eq!(metadata["user_messages"], 1);
        assert_eq!(metadata["assistant_messages"], 1);
        assert_eq!(metadata["interruptions"], 1);
        assert_eq!(metadata["initial_agent"], "root");
        assert_eq!(metadata["agents_used"], json!(["root", "Assistant_Database_Agent"]));
    }
}
