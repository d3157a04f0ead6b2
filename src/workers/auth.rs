use crate::envelope::{GatewayResponse, PhotoRequest};
use crate::token;
use crate::workers::WorkerContext;

/// The result of checking a caller's credentials in-process.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Authorization {
    Granted,
    Denied,
    Unavailable(String),
}

impl Authorization {
    /// The response to refuse the caller with, or `None` when granted.
    ///
    /// `unavailable_prefix` is prepended to the reason the secret could not
    /// be fetched.
    pub(super) fn rejection(self, unavailable_prefix: &str) -> Option<GatewayResponse> {
        match self {
            Self::Granted => None,
            Self::Denied => Some(GatewayResponse::json(
                401,
                &json!({ "error": "Unauthorized: Invalid Token" }),
            )),
            Self::Unavailable(reason) => Some(GatewayResponse::json(
                500,
                &json!({ "error": format!("{}: {}", unavailable_prefix, reason) }),
            )),
        }
    }
}

/// Checks the request's credentials against a freshly fetched secret.
pub(super) async fn authorize(ctx: &WorkerContext, request: &PhotoRequest) -> Authorization {
    let (email, presented) = match request.credentials() {
        Some(creds) => creds,
        None => return Authorization::Denied,
    };

    let secret = match ctx.keys.fetch_secret().await {
        Ok(secret) => secret,
        Err(e) => {
            error!(error = %e, "Unable to fetch signing key");
            return Authorization::Unavailable(e.to_string());
        },
    };

    if token::verify(email, presented, &secret) {
        Authorization::Granted
    } else {
        Authorization::Denied
    }
}

pub(super) async fn verify(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let request = PhotoRequest::parse(body).unwrap_or_default();
    let (email, presented) = match request.credentials() {
        Some(creds) => creds,
        None => {
            return GatewayResponse::json(
                400,
                &json!({ "valid": false, "message": "Missing email or token" }),
            )
        },
    };

    let secret = match ctx.keys.fetch_secret().await {
        Ok(secret) => secret,
        Err(e) => {
            error!(error = %e, "Unable to fetch signing key");
            return GatewayResponse::json(500, &json!({ "valid": false, "error": e.to_string() }));
        },
    };

    if token::verify(email, presented, &secret) {
        info!(email = %email, "Token verified");
        GatewayResponse::json(200, &json!({ "valid": true }))
    } else {
        info!(email = %email, "Invalid token");
        GatewayResponse::json(401, &json!({ "valid": false, "message": "Signature Mismatch" }))
    }
}

pub(super) async fn generate_token(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let request = PhotoRequest::parse(body).unwrap_or_default();
    let email = match request.email.as_deref() {
        Some(email) => email,
        None => return GatewayResponse::json(400, &json!({ "error": "Missing email field" })),
    };

    let secret = match ctx.keys.fetch_secret().await {
        Ok(secret) => secret,
        Err(e) => {
            error!(error = %e, "Unable to fetch signing key");
            return GatewayResponse::json(500, &json!({ "error": e.to_string() }));
        },
    };

    match token::generate(email, &secret) {
        Some(token) => GatewayResponse::json(200, &json!({ "token": token, "email": email })),
        None => GatewayResponse::json(500, &json!({ "error": "Unable to key token generator" })),
    }
}
