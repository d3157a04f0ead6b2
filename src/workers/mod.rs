use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::database::PhotoIndex;
use crate::envelope::{is_warmer, GatewayResponse, PhotoRequest, WorkerEnvelope};
use crate::invoker::WorkerTransport;
use crate::keys::KeyProvider;
use crate::processor::resizer::ResizeConfig;
use crate::storage::{validate_key, StorageBackend};

mod auth;
mod objects;
mod records;
mod resize;

/// Every worker which can be invoked by name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumString, AsRefStr, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum WorkerName {
    Verify,
    GenerateToken,
    InsertPhotoRecord,
    DeletePhotoRecord,
    PutObject,
    DeleteObject,
    ResizeAndPut,
    DeleteResizedObject,
    GetObject,
    GetResizedObject,
    ListObjects,
    ListPhotoRecords,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_originals_bucket")]
    /// The bucket uploaded originals are written to.
    ///
    /// Defaults to `photos`.
    pub originals_bucket: String,

    #[serde(default = "default_resized_bucket")]
    /// The bucket thumbnails are written to.
    ///
    /// Defaults to `resized`.
    pub resized_bucket: String,

    #[serde(default = "default_max_fetch_size")]
    /// Originals at or above this many bytes are never returned by
    /// `get-object`.
    ///
    /// Defaults to 10 MiB.
    pub max_fetch_size: u64,

    #[serde(default)]
    pub resize: ResizeConfig,

    #[serde(default = "default_description")]
    /// Stored when a record is inserted without a description.
    pub description_default: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            originals_bucket: default_originals_bucket(),
            resized_bucket: default_resized_bucket(),
            max_fetch_size: default_max_fetch_size(),
            resize: ResizeConfig::default(),
            description_default: default_description(),
        }
    }
}

fn default_originals_bucket() -> String {
    "photos".to_string()
}

fn default_resized_bucket() -> String {
    "resized".to_string()
}

const fn default_max_fetch_size() -> u64 {
    10 * 1024 * 1024
}

fn default_description() -> String {
    "No description".to_string()
}

/// Everything a worker may touch.
pub struct WorkerContext {
    pub storage: Arc<dyn StorageBackend>,
    pub index: Arc<dyn PhotoIndex>,
    pub keys: Arc<dyn KeyProvider>,
    pub settings: WorkerSettings,
}

/// Runs a single worker against a raw request body.
///
/// Workers never fail, every problem is expressed as a response.
pub async fn dispatch(ctx: &WorkerContext, worker: WorkerName, body: &str) -> GatewayResponse {
    if is_warmer(body) {
        debug!(worker = %worker, "Warming event received");
        return GatewayResponse::warmed();
    }

    match worker {
        WorkerName::Verify => auth::verify(ctx, body).await,
        WorkerName::GenerateToken => auth::generate_token(ctx, body).await,
        WorkerName::InsertPhotoRecord => records::insert(ctx, body).await,
        WorkerName::DeletePhotoRecord => records::delete(ctx, body).await,
        WorkerName::ListPhotoRecords => records::list(ctx, body).await,
        WorkerName::PutObject => objects::put(ctx, body).await,
        WorkerName::DeleteObject => objects::delete(ctx, body).await,
        WorkerName::GetObject => objects::get(ctx, body).await,
        WorkerName::ListObjects => objects::list(ctx, body).await,
        WorkerName::ResizeAndPut => resize::resize_and_put(ctx, body).await,
        WorkerName::DeleteResizedObject => resize::delete_resized(ctx, body).await,
        WorkerName::GetResizedObject => resize::get_resized(ctx, body).await,
    }
}

/// Parses the request and pulls out a usable object key.
///
/// The error side is the response to hand straight back.
fn request_with_key(body: &str) -> Result<(PhotoRequest, String), GatewayResponse> {
    let mut request = PhotoRequest::parse(body)
        .map_err(|e| GatewayResponse::json(400, &json!({ "error": format!("Invalid Request: {}", e) })))?;

    let key = request
        .key
        .take()
        .ok_or_else(|| GatewayResponse::json(400, &json!({ "error": "Missing key" })))?;

    validate_key(&key)
        .map_err(|e| GatewayResponse::json(400, &json!({ "error": format!("Invalid key: {}", e) })))?;

    Ok((request, key))
}

/// Dispatches worker calls within this process.
pub struct LocalTransport {
    ctx: Arc<WorkerContext>,
}

impl LocalTransport {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl WorkerTransport for LocalTransport {
    async fn invoke(&self, worker: WorkerName, envelope: WorkerEnvelope) -> anyhow::Result<Value> {
        let response = dispatch(&self.ctx, worker, &envelope.body).await;
        Ok(serde_json::to_value(response)?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::database::SqliteIndex;
    use crate::keys::{SecretKey, StaticKeyProvider};
    use crate::storage::backends::FileSystemBackend;

    pub const SECRET: &str = "test-secret";

    /// A context over a temp directory and an in-memory index.
    ///
    /// The directory is removed when the returned guard drops.
    pub async fn context() -> (Arc<WorkerContext>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let index = SqliteIndex::connect("sqlite::memory:", 1).await.unwrap();
        index.ensure_tables().await.unwrap();

        let ctx = WorkerContext {
            storage: Arc::new(FileSystemBackend::new(dir.path().to_path_buf())),
            index: Arc::new(index),
            keys: Arc::new(StaticKeyProvider::new(SECRET)),
            settings: WorkerSettings::default(),
        };

        (Arc::new(ctx), dir)
    }

    pub fn token_for(email: &str) -> String {
        crate::token::generate(email, &SecretKey::new(SECRET)).unwrap()
    }

    pub fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut buff = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buff, image::ImageFormat::Png).unwrap();
        buff.into_inner()
    }
}
