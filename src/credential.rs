use std::time::SystemTime;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("no token available for scope '{0}'")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct BearerToken {
    pub value: String,
    pub expires_at: SystemTime,
}

/// Fetches a bearer token for a scope. Implementations may cache and
/// refresh internally; callers never cache the result themselves.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self, scope: &str) -> Result<BearerToken, CredentialError>;
}

/// Reads a pre-minted token from an environment variable named
/// `<prefix>_BEARER_TOKEN`. This is the seam a real deployment replaces
/// with a cloud credential client; it exists so the gateway's own logic
/// can be exercised without depending on one.
pub struct EnvCredentialProvider {
    env_var: String,
}

impl EnvCredentialProvider {
    pub fn new(env_var: impl Into<String>) -> Self {
        Self {
            env_var: env_var.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn token(&self, scope: &str) -> Result<BearerToken, CredentialError> {
        let value = std::env::var(&self.env_var).map_err(|_| CredentialError::Unavailable(scope.to_string()))?;
        Ok(BearerToken {
            value,
            expires_at: SystemTime::now() + std::time::Duration::from_secs(3600),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_provider_reads_the_configured_variable() {
        unsafe { std::env::set_var("TEST_GATEWAY_BEARER_TOKEN", "secret-token") };
        let provider = EnvCredentialProvider::new("TEST_GATEWAY_BEARER_TOKEN");
        let token = provider.token("https://example.test/.default").await.unwrap();
        assert_eq!(token.value, "secret-token");
        unsafe { std::env::remove_var("TEST_GATEWAY_BEARER_TOKEN") };
    }

    #[tokio::test]
    async fn env_provider_fails_when_variable_absent() {
        unsafe { std::env::remove_var("TEST_GATEWAY_BEARER_TOKEN_MISSING") };
        let provider = EnvCredentialProvider::new("TEST_GATEWAY_BEARER_TOKEN_MISSING");
        let err = provider.token("scope").await.unwrap_err();
        assert!(matches!(err, CredentialError::Unavailable(_)));
    }
}
