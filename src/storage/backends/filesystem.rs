use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::{ObjectSummary, StorageBackend};

pub struct FileSystemBackend {
    directory: PathBuf,
}

impl FileSystemBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { directory: dir }
    }

    #[inline]
    fn format_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.directory.join(bucket).join(key)
    }
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    async fn store(
        &self,
        bucket: &str,
        key: &str,
        _content_type: &str,
        data: Bytes,
    ) -> anyhow::Result<()> {
        let path = self.format_path(bucket, key);

        debug!("Storing object @ {:?}", &path);
        match tokio::fs::write(&path, &data).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, data).await?;
                Ok(())
            },
            Err(other) => Err(other.into()),
        }
    }

    async fn fetch(&self, bucket: &str, key: &str) -> anyhow::Result<Option<Bytes>> {
        let path = self.format_path(bucket, key);

        debug!("Retrieving object @ {:?}", &path);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> anyhow::Result<()> {
        let path = self.format_path(bucket, key);

        debug!("Purging object @ {:?}", &path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    async fn list(&self, bucket: &str) -> anyhow::Result<Vec<ObjectSummary>> {
        let root = self.directory.join(bucket);
        let mut objects = vec![];
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(ref e) if e.kind() == ErrorKind::NotFound => continue,
                Err(other) => return Err(other.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let meta = entry.metadata().await?;
                let path = entry.path();
                if meta.is_dir() {
                    pending.push(path);
                } else if let Some(key) = relative_key(&root, &path) {
                    objects.push(ObjectSummary { key, size: meta.len() });
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

/// Object keys always use `/` no matter the platform.
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}
