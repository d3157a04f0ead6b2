use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::envelope::{GatewayResponse, WorkerEnvelope};
use crate::workers::WorkerName;

/// Delivers an envelope to a named worker and returns its raw response
/// document.
#[async_trait]
pub trait WorkerTransport: Sync + Send + 'static {
    async fn invoke(&self, worker: WorkerName, envelope: WorkerEnvelope) -> anyhow::Result<Value>;
}

/// What a worker reported, classified from its response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The body was not a JSON object, it is reported as is.
    PlainText(String),

    /// The body was a JSON object carrying an `error` field.
    StructuredError(String),

    /// The body was a JSON object carrying a `message` field.
    StructuredMessage(String),

    /// The worker could not be invoked or answered with something unreadable.
    InvocationFailed(String),
}

impl WorkerOutcome {
    /// Decode-then-classify a worker response body.
    pub fn classify(body: &str) -> Self {
        let object = match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(object)) => object,
            _ => return Self::PlainText(body.to_string()),
        };

        if let Some(message) = object.get("message") {
            return Self::StructuredMessage(text_of(message));
        }

        if let Some(error) = object.get("error") {
            return Self::StructuredError(text_of(error));
        }

        Self::PlainText(body.to_string())
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::StructuredError(_) | Self::InvocationFailed(_))
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for WorkerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlainText(text) | Self::StructuredMessage(text) => f.write_str(text),
            Self::StructuredError(error) => write!(f, "Error: {}", error),
            Self::InvocationFailed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}

impl Serialize for WorkerOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Calls workers by name.
#[derive(Clone)]
pub struct WorkerInvoker {
    transport: Arc<dyn WorkerTransport>,
}

impl WorkerInvoker {
    pub fn new(transport: Arc<dyn WorkerTransport>) -> Self {
        Self { transport }
    }

    /// Invokes `worker` and returns its response envelope.
    ///
    /// Unlike [`WorkerInvoker::invoke`] transport failures are returned to
    /// the caller, the verification phase needs to tell them apart.
    pub async fn call(&self, worker: WorkerName, body: &str) -> anyhow::Result<GatewayResponse> {
        let response = self
            .transport
            .invoke(worker, WorkerEnvelope::new(body))
            .await?;

        unwrap_envelope(response)
    }

    /// Invokes `worker` and reduces its answer to an outcome.
    ///
    /// This never fails, a worker which cannot be reached is reported as
    /// [`WorkerOutcome::InvocationFailed`].
    pub async fn invoke(&self, worker: WorkerName, body: &str) -> WorkerOutcome {
        match self.call(worker, body).await {
            Ok(response) => {
                if !response.is_success() {
                    debug!(worker = %worker, status = response.status_code, "Worker answered with a non-success status");
                }
                WorkerOutcome::classify(&response.body)
            },
            Err(e) => {
                warn!(worker = %worker, error = %e, "Error invoking worker");
                WorkerOutcome::InvocationFailed(e.to_string())
            },
        }
    }
}

/// Extracts the worker's envelope from a response document.
///
/// A document without a `body` is treated as a bare body.
fn unwrap_envelope(response: Value) -> anyhow::Result<GatewayResponse> {
    let mut object = match response {
        Value::Object(object) => object,
        Value::String(text) => return Ok(GatewayResponse::new(200, text)),
        other => return Err(anyhow!("malformed worker response: {}", other)),
    };

    let status = match object.get("statusCode") {
        None => 200,
        Some(code) => code
            .as_u64()
            .and_then(|c| u16::try_from(c).ok())
            .ok_or_else(|| anyhow!("malformed worker status code: {}", code))?,
    };

    match object.remove("body") {
        Some(Value::String(body)) => Ok(GatewayResponse::new(status, body)),
        Some(Value::Null) => Ok(GatewayResponse::new(status, "")),
        Some(other) => Ok(GatewayResponse::new(status, other.to_string())),
        None => Ok(GatewayResponse::new(status, Value::Object(object).to_string())),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportConfig {
    /// Workers run inside this process.
    Local,

    /// Workers are reached over HTTP at `{base_url}/v1/workers/{name}`.
    Http {
        base_url: String,

        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Local
    }
}

/// Invokes workers hosted by another process over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(Duration::from_secs(30)))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl WorkerTransport for HttpTransport {
    async fn invoke(&self, worker: WorkerName, envelope: WorkerEnvelope) -> anyhow::Result<Value> {
        let url = format!("{}/v1/workers/{}", self.base_url, worker);
        debug!(url = %url, "invoking remote worker");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(envelope.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(json!({ "statusCode": status, "body": body }))
    }
}
