use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use zeroize::Zeroizing;

use crate::errors::KeyUnavailable;

/// Header the parameter endpoint expects the session token under.
const AUTH_TOKEN_HEADER: &str = "X-Aws-Parameters-Secrets-Token";

/// The shared signing secret.
///
/// Zeroed on drop and never printed.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<Vec<u8>>);

impl SecretKey {
    pub fn new(value: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(value.as_ref().to_vec()))
    }

    #[inline]
    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A source of the signing secret.
///
/// Implementations are asked once per invocation, nothing is cached between
/// calls so a rotated secret is picked up on the next request.
#[async_trait]
pub trait KeyProvider: Sync + Send + 'static {
    async fn fetch_secret(&self) -> Result<SecretKey, KeyUnavailable>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretConfig {
    /// Fetch the secret with a GET against a parameter endpoint.
    ParameterStore {
        endpoint: String,

        /// Name of the environment variable holding the token sent in the
        /// `X-Aws-Parameters-Secrets-Token` header, if any.
        #[serde(default)]
        auth_token_env: Option<String>,

        #[serde(default)]
        timeout_secs: Option<u64>,
    },

    /// A fixed secret, for development and tests.
    Static {
        value: String,
    },
}

impl SecretConfig {
    pub fn build(&self) -> anyhow::Result<Arc<dyn KeyProvider>> {
        match self {
            Self::ParameterStore { endpoint, auth_token_env, timeout_secs } => {
                let provider = ParameterStoreProvider::new(
                    endpoint.clone(),
                    auth_token_env.clone(),
                    timeout_secs.map(Duration::from_secs),
                )?;
                Ok(Arc::new(provider))
            },
            Self::Static { value } => Ok(Arc::new(StaticKeyProvider::new(value))),
        }
    }
}

pub struct ParameterStoreProvider {
    client: reqwest::Client,
    endpoint: String,
    auth_token_env: Option<String>,
}

impl ParameterStoreProvider {
    pub fn new(
        endpoint: String,
        auth_token_env: Option<String>,
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(5)))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            auth_token_env,
        })
    }
}

#[async_trait]
impl KeyProvider for ParameterStoreProvider {
    async fn fetch_secret(&self) -> Result<SecretKey, KeyUnavailable> {
        let mut request = self.client.get(&self.endpoint);
        if let Some(token) = self.auth_token_env.as_ref().and_then(|v| std::env::var(v).ok()) {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| KeyUnavailable(format!("parameter request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyUnavailable(format!(
                "parameter endpoint responded with status {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| KeyUnavailable(format!("failed to read parameter body: {}", e)))?;

        extract_secret(&body)
            .map(SecretKey::new)
            .ok_or_else(|| KeyUnavailable("parameter value is missing".to_string()))
    }
}

/// Pulls the secret out of a parameter response.
///
/// The endpoint normally answers with the raw value. A JSON document shaped
/// `{"Parameter": {"Value": ...}}` is also understood.
fn extract_secret(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(trimmed) {
        return doc
            .get("Parameter")
            .and_then(|p| p.get("Value"))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
    }

    Some(trimmed.to_string())
}

pub struct StaticKeyProvider {
    secret: SecretKey,
}

impl StaticKeyProvider {
    pub fn new(value: &str) -> Self {
        Self {
            secret: SecretKey::new(value),
        }
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn fetch_secret(&self) -> Result<SecretKey, KeyUnavailable> {
        if self.secret.expose().is_empty() {
            return Err(KeyUnavailable("static secret is empty".to_string()));
        }
        Ok(self.secret.clone())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves exactly one canned HTTP response on an ephemeral port.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body,
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });

        format!("http://{}/systemsmanager/parameters/get?name=secret", addr)
    }

    #[test]
    fn extracts_raw_and_wrapped_values() {
        assert_eq!(extract_secret("  s3cr3t\n").as_deref(), Some("s3cr3t"));
        assert_eq!(
            extract_secret(r#"{"Parameter": {"Name": "k", "Value": "wrapped"}}"#).as_deref(),
            Some("wrapped"),
        );
        assert_eq!(extract_secret(""), None);
        assert_eq!(extract_secret(r#"{"Parameter": {}}"#), None);
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = SecretKey::new("hunter2");
        assert!(!format!("{:?}", key).contains("hunter2"));
    }

    #[tokio::test]
    async fn fetches_secret_from_endpoint() {
        let endpoint = serve_once("200 OK", "from-endpoint").await;
        let provider = ParameterStoreProvider::new(endpoint, None, None).unwrap();

        let secret = provider.fetch_secret().await.unwrap();
        assert_eq!(secret.expose(), b"from-endpoint");
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let endpoint = serve_once("403 Forbidden", "denied").await;
        let provider = ParameterStoreProvider::new(endpoint, None, None).unwrap();

        assert!(provider.fetch_secret().await.is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = ParameterStoreProvider::new(
            format!("http://{}/", addr),
            None,
            Some(Duration::from_secs(1)),
        )
        .unwrap();

        let err = provider.fetch_secret().await.unwrap_err();
        assert!(err.to_string().contains("parameter request failed"));
    }

    #[tokio::test]
    async fn empty_static_secret_fails_closed() {
        assert!(StaticKeyProvider::new("").fetch_secret().await.is_err());
        assert!(StaticKeyProvider::new("k").fetch_secret().await.is_ok());
    }
}
