use bytes::Bytes;
use tokio::sync::oneshot;

use crate::envelope::{GatewayResponse, PhotoRequest};
use crate::errors::TransformError;
use crate::processor::resizer::{self, ResizeConfig, ResizedImage};
use crate::storage::validate_key;
use crate::workers::objects::decode_content;
use crate::workers::{request_with_key, WorkerContext};

/// Runs the transform on the rayon pool so the runtime is never blocked on
/// image decoding.
async fn resize_off_runtime(
    key: String,
    data: Bytes,
    cfg: ResizeConfig,
) -> Result<ResizedImage, TransformError> {
    let (tx, rx) = oneshot::channel();

    rayon::spawn(move || {
        let _ = tx.send(resizer::resize(&key, &data, &cfg));
    });

    rx.await
        .map_err(|_| TransformError::EncodeError("resize task was dropped".to_string()))?
}

pub(super) async fn resize_and_put(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    info!("Resize worker started");
    let (request, key) = match request_with_key(body) {
        Ok(parsed) => parsed,
        Err(resp) => return resp,
    };

    let data = match decode_content(&request) {
        Ok(data) => data,
        Err(e) => {
            let e = TransformError::DecodeError(e);
            return GatewayResponse::new(e.status(), format!("Error: {}", e));
        },
    };

    let resized = match resize_off_runtime(key, data, ctx.settings.resize).await {
        Ok(resized) => resized,
        Err(e) => {
            warn!(error = %e, "Resize rejected");
            return GatewayResponse::new(e.status(), format!("Error: {}", e));
        },
    };

    let bucket = &ctx.settings.resized_bucket;
    debug!(
        bucket = %bucket,
        key = %resized.key,
        width = resized.width,
        height = resized.height,
        "Writing resized image"
    );

    let content_type = resized.kind.content_type().to_string();
    match ctx
        .storage
        .store(bucket, &resized.key, &content_type, resized.data)
        .await
    {
        Ok(()) => GatewayResponse::new(200, format!("Success: Resized and uploaded {}", resized.key)),
        Err(e) => {
            error!(key = %resized.key, error = %e, "Failed to store resized image");
            GatewayResponse::new(500, format!("Error resizing: {}", e))
        },
    }
}

pub(super) async fn delete_resized(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let key = match request_with_key(body) {
        Ok((_, key)) => resizer::resized_key(&key),
        Err(resp) => return resp,
    };

    match ctx.storage.delete(&ctx.settings.resized_bucket, &key).await {
        Ok(()) => {
            info!(key = %key, "Resized object deleted");
            GatewayResponse::new(200, format!("Success: Deleted {}", key))
        },
        Err(e) => {
            error!(key = %key, error = %e, "Failed to delete resized object");
            GatewayResponse::new(500, format!("Error deleting {}: {}", key, e))
        },
    }
}

pub(super) async fn get_resized(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let request = match PhotoRequest::parse(body) {
        Ok(request) => request,
        Err(e) => return GatewayResponse::new(400, format!("Invalid Request: {}", e)),
    };

    let key = match request.key {
        Some(key) if !key.is_empty() => resizer::resized_key(&key),
        _ => return GatewayResponse::new(400, "Missing 'key' parameter"),
    };

    if validate_key(&key).is_err() {
        return GatewayResponse::new(404, "Image not found");
    }

    match ctx.storage.fetch(&ctx.settings.resized_bucket, &key).await {
        Ok(Some(data)) => {
            let content_type = resizer::ImageKind::from_key(&key)
                .map(|kind| kind.content_type())
                .unwrap_or(mime::APPLICATION_OCTET_STREAM);

            GatewayResponse::new(200, base64::encode(&data))
                .with_header("Content-Type", content_type.to_string())
        },
        Ok(None) => GatewayResponse::new(404, "Image not found"),
        Err(e) => {
            error!(key = %key, error = %e, "Error fetching resized image");
            GatewayResponse::new(404, "Image not found")
        },
    }
}
