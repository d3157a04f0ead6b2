use thiserror::Error;

use crate::envelope::GatewayResponse;

/// Failures that stop a workflow before any worker runs.
///
/// Only these change the status code of an orchestration response, anything
/// that goes wrong once the pipeline is running is reported inside the body.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Missing email or token")]
    MissingCredentials,

    #[error("Unauthorized: Invalid Token")]
    Unauthorized,

    #[error("Verifier Error: {0}")]
    AuthoritySubsystemUnavailable(String),
}

impl WorkflowError {
    pub fn status(&self) -> u16 {
        match self {
            Self::MalformedRequest(_) | Self::MissingCredentials => 400,
            Self::Unauthorized => 401,
            Self::AuthoritySubsystemUnavailable(_) => 500,
        }
    }

    pub fn into_response(self) -> GatewayResponse {
        GatewayResponse::json(self.status(), &json!({ "error": self.to_string() }))
    }
}

/// Errors raised by the resize transform.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Unsupported image type: {0}")]
    UnsupportedImageType(String),

    #[error("Could not read image data: {0}")]
    DecodeError(String),

    #[error("Failed to encode image: {0}")]
    EncodeError(String),
}

impl TransformError {
    /// Bad input is a 400, a failure to write the result is on us.
    pub fn status(&self) -> u16 {
        match self {
            Self::UnsupportedImageType(_) | Self::DecodeError(_) => 400,
            Self::EncodeError(_) => 500,
        }
    }
}

/// The shared secret could not be retrieved.
///
/// Callers must refuse the operation, there is no fallback secret.
#[derive(Debug, Error)]
#[error("signing key unavailable: {0}")]
pub struct KeyUnavailable(pub String);
