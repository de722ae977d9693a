use thiserror::Error;

/// The gateway's error taxonomy. Every fallible operation in the crate
/// eventually resolves to one of these variants.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("credential fetch failed for scope '{scope}': {message}")]
    AuthFailed { scope: String, message: String },

    #[error("upstream handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Tool {0} is not available")]
    ToolNotFound(String),

    #[error("Tool {name} timed out.")]
    ToolTimeout { name: String, timeout_secs: u64 },

    #[error("tool '{name}' handler failed: {message}")]
    ToolHandlerError { name: String, message: String },

    #[error("conversation logger failed: {0}")]
    LoggerFailed(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}

impl GatewayError {
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    pub fn tool_timeout(name: impl Into<String>, timeout_secs: u64) -> Self {
        Self::ToolTimeout {
            name: name.into(),
            timeout_secs,
        }
    }

    pub fn tool_handler_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolHandlerError {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn auth_failed(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AuthFailed {
            scope: scope.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_not_found_message_matches_not_available_wording() {
        let err = GatewayError::tool_not_found("does_not_exist");
        assert_eq!(err.to_string(), "Tool does_not_exist is not available");
    }

    #[test]
    fn tool_timeout_message_omits_the_duration() {
        let err = GatewayError::tool_timeout("slow_tool", 15);
        assert_eq!(err.to_string(), "Tool slow_tool timed out.");
    }
}
