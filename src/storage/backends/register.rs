use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{BlobStorageBackend, FileSystemBackend};
use crate::storage::StorageBackend;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfigs {
    FileSystem {
        /// Each bucket becomes a sub directory of this one.
        directory: PathBuf,
    },
    BlobStorage {
        region: String,
        endpoint: String,
        access_key: Option<String>,
        secret_key: Option<String>,
        session_token: Option<String>,
        request_timeout: Option<u64>,
    },
}

impl BackendConfigs {
    pub async fn connect(&self) -> anyhow::Result<Arc<dyn StorageBackend>> {
        match self {
            Self::FileSystem { directory } => {
                Ok(Arc::new(FileSystemBackend::new(directory.clone())))
            },
            Self::BlobStorage {
                region,
                endpoint,
                access_key,
                secret_key,
                session_token,
                request_timeout,
            } => {
                let backend = BlobStorageBackend::new(
                    region.clone(),
                    endpoint.clone(),
                    access_key.clone(),
                    secret_key.clone(),
                    session_token.clone(),
                    request_timeout.map(Duration::from_secs),
                )?;
                Ok(Arc::new(backend))
            },
        }
    }
}
