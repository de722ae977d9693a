use std::env;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 15;
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable(s): {0:?}")]
    Missing(Vec<String>),

    #[error("invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

/// Gateway configuration, loaded once at startup from the environment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub upstream_endpoint: String,
    pub upstream_api_version: String,
    pub upstream_deployment: String,
    pub credential_scope: String,
    pub tool_call_timeout: Duration,
    pub upstream_handshake_timeout: Duration,
    pub frontend_origins: Vec<String>,
    pub docstore: Option<DocStoreConfig>,
    pub title_model_endpoint: Option<String>,
    pub title_model_deployment: Option<String>,
    pub title_model_api_version: String,
    pub bind_addr: String,
}

#[derive(Debug, Clone)]
pub struct DocStoreConfig {
    pub endpoint: String,
    pub database: String,
    pub container: String,
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut missing = Vec::new();

        let upstream_endpoint = env_var("UPSTREAM_ENDPOINT");
        let upstream_api_version = env_var("UPSTREAM_API_VERSION");
        let upstream_deployment = env_var("UPSTREAM_DEPLOYMENT");
        let credential_scope = env_var("CREDENTIAL_SCOPE");

        for (key, value) in [
            ("UPSTREAM_ENDPOINT", &upstream_endpoint),
            ("UPSTREAM_API_VERSION", &upstream_api_version),
            ("UPSTREAM_DEPLOYMENT", &upstream_deployment),
            ("CREDENTIAL_SCOPE", &credential_scope),
        ] {
            if value.is_none() {
                missing.push(key.to_string());
            }
        }

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let tool_call_timeout = env_var("TOOL_CALL_TIMEOUT_SECONDS")
            .map(|v| parse_secs("TOOL_CALL_TIMEOUT_SECONDS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS);

        let upstream_handshake_timeout = env_var("UPSTREAM_HANDSHAKE_TIMEOUT_SECONDS")
            .map(|v| parse_secs("UPSTREAM_HANDSHAKE_TIMEOUT_SECONDS", &v))
            .transpose()?
            .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_SECS);

        let frontend_origins = env_var("FRONTEND_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let docstore = match (
            env_var("DOCSTORE_ENDPOINT"),
            env_var("DOCSTORE_DATABASE"),
            env_var("DOCSTORE_AI_CONVERSATIONS_CONTAINER"),
        ) {
            (Some(endpoint), Some(database), Some(container)) => Some(DocStoreConfig {
                endpoint,
                database,
                container,
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::Invalid {
                    key: "DOCSTORE_*".into(),
                    message: "DOCSTORE_ENDPOINT, DOCSTORE_DATABASE and DOCSTORE_AI_CONVERSATIONS_CONTAINER must all be set together or all be absent".into(),
                });
            },
        };

        Ok(Self {
            upstream_endpoint: upstream_endpoint.unwrap(),
            upstream_api_version: upstream_api_version.unwrap(),
            upstream_deployment: upstream_deployment.unwrap(),
            credential_scope: credential_scope.unwrap(),
            tool_call_timeout: Duration::from_secs(tool_call_timeout),
            upstream_handshake_timeout: Duration::from_secs(upstream_handshake_timeout),
            frontend_origins,
            docstore,
            title_model_endpoint: env_var("TITLE_MODEL_ENDPOINT"),
            title_model_deployment: env_var("TITLE_MODEL_DEPLOYMENT"),
            title_model_api_version: env_var("TITLE_MODEL_API_VERSION")
                .unwrap_or_else(|| "2024-10-21".to_string()),
            bind_addr: env_var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        })
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests that mutate process-wide env vars.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for key in [
            "UPSTREAM_ENDPOINT",
            "UPSTREAM_API_VERSION",
            "UPSTREAM_DEPLOYMENT",
            "CREDENTIAL_SCOPE",
            "TOOL_CALL_TIMEOUT_SECONDS",
            "UPSTREAM_HANDSHAKE_TIMEOUT_SECONDS",
            "FRONTEND_ORIGINS",
            "DOCSTORE_ENDPOINT",
            "DOCSTORE_DATABASE",
            "DOCSTORE_AI_CONVERSATIONS_CONTAINER",
            "TITLE_MODEL_ENDPOINT",
            "TITLE_MODEL_DEPLOYMENT",
            "TITLE_MODEL_API_VERSION",
            "BIND_ADDR",
        ] {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    fn missing_required_keys_collects_all_of_them() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let err = GatewayConfig::from_env().unwrap_err();
        match err {
            ConfigError::Missing(keys) => {
                assert_eq!(keys.len(), 4);
                assert!(keys.contains(&"UPSTREAM_ENDPOINT".to_string()));
                assert!(keys.contains(&"CREDENTIAL_SCOPE".to_string()));
            },
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn defaults_applied_when_optional_keys_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            env::set_var("UPSTREAM_ENDPOINT", "wss://example.test");
            env::set_var("UPSTREAM_API_VERSION", "2024-10-01");
            env::set_var("UPSTREAM_DEPLOYMENT", "gpt-realtime");
            env::set_var("CREDENTIAL_SCOPE", "https://example.test/.default");
        }
        let cfg = GatewayConfig::from_env().unwrap();
        assert_eq!(cfg.tool_call_timeout, Duration::from_secs(15));
        assert_eq!(cfg.upstream_handshake_timeout, Duration::from_secs(30));
        assert!(cfg.docstore.is_none());
        clear_all();
    }

    #[test]
    fn partial_docstore_config_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            env::set_var("UPSTREAM_ENDPOINT", "wss://example.test");
            env::set_var("UPSTREAM_API_VERSION", "2024-10-01");
            env::set_var("UPSTREAM_DEPLOYMENT", "gpt-realtime");
            env::set_var("CREDENTIAL_SCOPE", "https://example.test/.default");
            env::set_var("DOCSTORE_ENDPOINT", "https://cosmos.example.test");
        }
        let err = GatewayConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        clear_all();
    }
}
