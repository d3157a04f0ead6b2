use async_trait::async_trait;
use bytes::Bytes;

/// A single entry when listing a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,

    /// Object size in bytes.
    pub size: u64,
}

#[async_trait]
pub trait StorageBackend: Sync + Send + 'static {
    async fn store(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> anyhow::Result<()>;

    async fn fetch(&self, bucket: &str, key: &str) -> anyhow::Result<Option<Bytes>>;

    /// Deleting an object which does not exist is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> anyhow::Result<()>;

    async fn list(&self, bucket: &str) -> anyhow::Result<Vec<ObjectSummary>>;
}
