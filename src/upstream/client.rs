use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::GatewayConfig;
use crate::credential::CredentialProvider;
use crate::error::GatewayError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds the upstream URL from endpoint/api-version/deployment.
pub fn build_url(config: &GatewayConfig) -> String {
    format!(
        "{}/openai/realtime?api-version={}&deployment={}",
        config.upstream_endpoint.trim_end_matches('/'),
        config.upstream_api_version,
        config.upstream_deployment,
    )
}

/// A live connection to the upstream realtime provider. Transport-only: it
/// knows nothing about sessions, agents, or tools.
pub struct UpstreamClient {
    writer: SplitSink<WsStream, Message>,
    reader: SplitStream<WsStream>,
}

impl UpstreamClient {
    pub async fn connect(
        config: &GatewayConfig,
        credentials: &dyn CredentialProvider,
    ) -> Result<Self, GatewayError> {
        let token = credentials
            .token(&config.credential_scope)
            .await
            .map_err(|e| GatewayError::auth_failed(&config.credential_scope, e.to_string()))?;

        let url = build_url(config);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| GatewayError::HandshakeFailed(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            format!("Bearer {}", token.value)
                .parse()
                .map_err(|_| GatewayError::HandshakeFailed("invalid bearer token".into()))?,
        );
        headers.insert("x-client-request-id", "realtime-voice-gateway".parse().unwrap());
        headers.insert("x-useragent", "realtime-voice-gateway/1.0.0".parse().unwrap());

        let (ws, response) = tokio::time::timeout(config.upstream_handshake_timeout, connect_async(request))
            .await
            .map_err(|_| GatewayError::HandshakeFailed("timed out waiting for upstream handshake".into()))?
            .map_err(|e| {
                if let tokio_tungstenite::tungstenite::Error::Http(resp) = &e {
                    if resp.status() == StatusCode::UNAUTHORIZED || resp.status() == StatusCode::FORBIDDEN {
                        return GatewayError::auth_failed(&config.credential_scope, "upstream rejected credentials");
                    }
                }
                GatewayError::HandshakeFailed(e.to_string())
            })?;
        tracing::debug!(target: "upstream", status = ?response.status(), "upstream handshake complete");

        let (writer, reader) = ws.split();
        Ok(Self { writer, reader })
    }

    pub async fn send(&mut self, frame: &Value) -> Result<(), GatewayError> {
        let json = serde_json::to_string(frame)?;
        self.writer.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Returns `Ok(None)` on clean stream end. Binary/ping/pong frames are
    /// not produced by this provider and are skipped if seen.
    pub async fn recv(&mut self) -> Result<Option<Value>, GatewayError> {
        loop {
            match self.reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text)?;
                    return Ok(Some(value));
                },
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {
                    continue;
                },
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), GatewayError> {
        self.writer.send(Message::Close(None)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_matches_the_documented_template() {
        let config = GatewayConfig {
            upstream_endpoint: "wss://example.cognitiveservices.azure.com".into(),
            upstream_api_version: "2024-10-01-preview".into(),
            upstream_deployment: "gpt-realtime".into(),
            credential_scope: "https://cognitiveservices.azure.com/.default".into(),
            tool_call_timeout: std::time::Duration::from_secs(15),
            upstream_handshake_timeout: std::time::Duration::from_secs(30),
            frontend_origins: vec![],
            docstore: None,
            title_model_endpoint: None,
            title_model_deployment: None,
            title_model_api_version: "2024-10-21".into(),
            bind_addr: "0.0.0.0:8080".into(),
        };
        let url = build_url(&config);
        assert_eq!(
            url,
            "wss://example.cognitiveservices.azure.com/openai/realtime?api-version=2024-10-01-preview&deployment=gpt-realtime"
        );
    }
}
