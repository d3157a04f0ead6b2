use bytes::Bytes;

use crate::envelope::{GatewayResponse, PhotoRequest};
use crate::processor::resizer::ImageKind;
use crate::workers::auth::authorize;
use crate::workers::{request_with_key, WorkerContext};

/// The content type an object is stored and served with.
fn content_type_for(key: &str) -> String {
    ImageKind::from_key(key)
        .map(|kind| kind.content_type())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
        .to_string()
}

/// Decodes the base64 `content` field of a request.
pub(super) fn decode_content(request: &PhotoRequest) -> Result<Bytes, String> {
    let content = request
        .content
        .as_deref()
        .ok_or_else(|| "Missing content".to_string())?;

    base64::decode(content.trim())
        .map(Bytes::from)
        .map_err(|e| format!("Content is not valid base64: {}", e))
}

pub(super) async fn put(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let (request, key) = match request_with_key(body) {
        Ok(parsed) => parsed,
        Err(resp) => return resp,
    };

    let data = match decode_content(&request) {
        Ok(data) => data,
        Err(e) => return GatewayResponse::json(400, &json!({ "error": e })),
    };

    let bucket = &ctx.settings.originals_bucket;
    let size = data.len();
    match ctx.storage.store(bucket, &key, &content_type_for(&key), data).await {
        Ok(()) => {
            info!(bucket = %bucket, key = %key, size = size, "Object uploaded");
            GatewayResponse::json(
                200,
                &json!({ "message": format!("Object uploaded successfully: {}", key) }),
            )
        },
        Err(e) => {
            error!(bucket = %bucket, key = %key, error = %e, "Object upload failed");
            GatewayResponse::json(500, &json!({ "error": e.to_string() }))
        },
    }
}

pub(super) async fn delete(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let key = match request_with_key(body) {
        Ok((_, key)) => key,
        Err(resp) => return resp,
    };

    let bucket = &ctx.settings.originals_bucket;
    match ctx.storage.delete(bucket, &key).await {
        Ok(()) => {
            info!(bucket = %bucket, key = %key, "Object deleted");
            GatewayResponse::json(
                200,
                &json!({ "message": format!("Object deleted successfully: {}", key) }),
            )
        },
        Err(e) => {
            error!(bucket = %bucket, key = %key, error = %e, "Object delete failed");
            GatewayResponse::json(500, &json!({ "error": e.to_string() }))
        },
    }
}

pub(super) async fn get(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let request = match PhotoRequest::parse(body) {
        Ok(request) => request,
        Err(e) => {
            return GatewayResponse::json(400, &json!({ "error": format!("Invalid Request: {}", e) }))
        },
    };

    let key = match (request.key.as_deref(), request.token.as_deref()) {
        (Some(key), Some(_)) => key.to_string(),
        _ => return GatewayResponse::json(401, &json!({ "error": "Missing key or token" })),
    };

    if let Some(rejection) = authorize(ctx, &request).await.rejection("Verifier Error") {
        return rejection;
    }

    let not_found = || GatewayResponse::json(404, &json!({ "error": "File not found or too large" }));
    if crate::storage::validate_key(&key).is_err() {
        return not_found();
    }

    let data = match ctx.storage.fetch(&ctx.settings.originals_bucket, &key).await {
        Ok(Some(data)) if (data.len() as u64) < ctx.settings.max_fetch_size => data,
        Ok(_) => return not_found(),
        Err(e) => {
            error!(key = %key, error = %e, "Failed to read object");
            return GatewayResponse::json(500, &json!({ "error": "Failed to read file" }));
        },
    };

    GatewayResponse::new(200, base64::encode(&data)).with_header("Content-Type", content_type_for(&key))
}

pub(super) async fn list(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let request = match PhotoRequest::parse(body) {
        Ok(request) => request,
        Err(e) => {
            return GatewayResponse::json(400, &json!({ "error": format!("Invalid Request: {}", e) }))
        },
    };

    if request.credentials().is_none() {
        return GatewayResponse::json(
            401,
            &json!({ "error": "Unauthorized: Missing email or token" }),
        );
    }

    if let Some(rejection) = authorize(ctx, &request).await.rejection("Verifier Error") {
        return rejection;
    }

    let objects = match ctx.storage.list(&ctx.settings.originals_bucket).await {
        Ok(objects) => objects,
        Err(e) => {
            error!(error = %e, "Unable to list objects");
            return GatewayResponse::json(500, &json!({ "error": format!("Server Error: {}", e) }));
        },
    };

    let items: Vec<_> = objects
        .into_iter()
        .map(|object| json!({ "key": object.key, "size": object.size / 1024 }))
        .collect();

    GatewayResponse::json(200, &items)
}
