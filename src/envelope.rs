use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The acknowledgement returned to keep-alive warmers.
pub const WARMED: &str = "Warmed";

/// Keep-alive warmers are recognised by substring, before any parsing.
#[inline]
pub fn is_warmer(body: &str) -> bool {
    body.contains("warmer")
}

/// A gateway style response: a status code and a string body.
///
/// This is the shape every worker and every workflow answers with, the
/// HTTP layer maps it directly onto the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayResponse {
    #[serde(rename = "statusCode", default = "default_status")]
    pub status_code: u16,

    #[serde(default)]
    pub body: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl GatewayResponse {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(status_code: u16, payload: &impl Serialize) -> Self {
        match serde_json::to_string(payload) {
            Ok(body) => Self::new(status_code, body),
            Err(e) => Self::new(
                500,
                json!({ "error": format!("failed to serialize response: {}", e) }).to_string(),
            ),
        }
    }

    pub fn warmed() -> Self {
        Self::new(200, WARMED)
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

const fn default_status() -> u16 {
    200
}

/// The envelope a worker is invoked with.
///
/// `body` carries the caller's request exactly as it was received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEnvelope {
    pub body: String,
}

impl WorkerEnvelope {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

/// The request envelope shared by the workflows and the workers.
///
/// Every field is optional at this level, each consumer decides which ones
/// it requires.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhotoRequest {
    pub email: Option<String>,
    pub token: Option<String>,
    pub key: Option<String>,
    pub description: Option<String>,

    /// Raw image bytes, base64 encoded.
    pub content: Option<String>,
}

impl PhotoRequest {
    /// Parses a raw request body.
    ///
    /// A body may arrive either as the JSON object itself or wrapped in a
    /// `{"body": ...}` envelope, the latter is unwrapped first.
    pub fn parse(body: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| format!("body is not valid JSON: {}", e))?;

        let value = match value {
            Value::Object(mut map) if !map.contains_key("key") && !map.contains_key("email") => {
                match map.remove("body") {
                    Some(Value::String(inner)) => serde_json::from_str(&inner)
                        .map_err(|e| format!("envelope body is not valid JSON: {}", e))?,
                    Some(inner @ Value::Object(_)) => inner,
                    Some(_) => return Err("envelope body must be a JSON object".to_string()),
                    None => Value::Object(map),
                }
            },
            obj @ Value::Object(_) => obj,
            _ => return Err("request must be a JSON object".to_string()),
        };

        serde_json::from_value(value).map_err(|e| format!("invalid request fields: {}", e))
    }

    /// Both credentials, or `None` if either is absent.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.email.as_deref()?, self.token.as_deref()?))
    }
}
