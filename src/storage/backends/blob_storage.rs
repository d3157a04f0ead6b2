use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use rusoto_core::credential::{DefaultCredentialsProvider, StaticProvider};
use rusoto_core::{HttpClient, Region, RusotoError};
use rusoto_s3::{
    DeleteObjectRequest,
    GetObjectError,
    GetObjectRequest,
    ListObjectsV2Request,
    PutObjectRequest,
    S3Client,
    S3,
};

use crate::storage::{ObjectSummary, StorageBackend};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// S3 compatible object storage.
///
/// The bucket is chosen per call so one client serves both the originals
/// and the resized bucket.
pub struct BlobStorageBackend {
    client: S3Client,
    request_timeout: Duration,
}

impl BlobStorageBackend {
    pub fn new(
        region: String,
        endpoint: String,
        access_key: Option<String>,
        secret_key: Option<String>,
        session_token: Option<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self> {
        let region = Region::Custom { name: region, endpoint };
        let dispatcher = HttpClient::new()?;

        let client = match (access_key, secret_key) {
            (Some(access), Some(secret)) => {
                let creds = StaticProvider::new(access, secret, session_token, None);
                S3Client::new_with(dispatcher, creds, region)
            },
            _ => S3Client::new_with(dispatcher, DefaultCredentialsProvider::new()?, region),
        };

        Ok(Self {
            client,
            request_timeout: request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
        })
    }

    async fn timed<T>(&self, fut: impl Future<Output = T>) -> Result<T> {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| anyhow!("Remote storage bucket did not respond within {:?}", self.request_timeout))
    }
}

#[async_trait]
impl StorageBackend for BlobStorageBackend {
    async fn store(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: Bytes,
    ) -> anyhow::Result<()> {
        debug!("Storing object in bucket @ {}/{}", bucket, key);
        let request = PutObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: Some(content_type.to_string()),
            content_length: Some(data.len() as i64),
            body: Some(data.to_vec().into()),
            ..Default::default()
        };

        self.timed(self.client.put_object(request)).await??;
        Ok(())
    }

    async fn fetch(&self, bucket: &str, key: &str) -> anyhow::Result<Option<Bytes>> {
        debug!("Retrieving object in bucket @ {}/{}", bucket, key);
        let request = GetObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            ..Default::default()
        };

        let output = match self.timed(self.client.get_object(request)).await? {
            Ok(output) => output,
            Err(RusotoError::Service(GetObjectError::NoSuchKey(_))) => return Ok(None),
            Err(RusotoError::Unknown(ref resp)) if resp.status.as_u16() == 404 => return Ok(None),
            Err(other) => return Err(other.into()),
        };

        let body = match output.body {
            None => return Ok(Some(Bytes::new())),
            Some(body) => body,
        };

        let chunks: Vec<Bytes> = self.timed(body.try_collect()).await??;
        Ok(Some(Bytes::from(chunks.concat())))
    }

    async fn delete(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
        debug!("Purging object in bucket @ {}/{}", bucket, key);
        let request = DeleteObjectRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            ..Default::default()
        };

        match self.timed(self.client.delete_object(request)).await? {
            Ok(_) => Ok(()),
            Err(RusotoError::Unknown(ref resp)) if resp.status.as_u16() == 404 => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    async fn list(&self, bucket: &str) -> anyhow::Result<Vec<ObjectSummary>> {
        let mut objects = vec![];
        let mut continuation_token = None;

        loop {
            let request = ListObjectsV2Request {
                bucket: bucket.to_string(),
                continuation_token: continuation_token.take(),
                ..Default::default()
            };

            let page = self.timed(self.client.list_objects_v2(request)).await??;
            for object in page.contents.unwrap_or_default() {
                if let Some(key) = object.key {
                    let size = object.size.unwrap_or_default().max(0) as u64;
                    objects.push(ObjectSummary { key, size });
                }
            }

            match (page.is_truncated, page.next_continuation_token) {
                (Some(true), Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }
}
