//! Durable artifact store.
//!
//! Artifacts are immutable ndjson blobs keyed `{namespace}/cow_{block_to}.json`.
//! The store is also the source of truth for each stream's watermark, see
//! [`watermark::last_synced_block`].

pub mod artifact;
pub mod error;
pub mod watermark;

use std::path::Path;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;

pub use artifact::ArtifactKey;
pub use error::StoreError;

/// Key-value blob store holding published artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Full keys of every object under `namespace`.
    async fn list(&self, namespace: &str) -> Result<Vec<String>, StoreError>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// [`ArtifactStore`] backed by any `object_store` implementation.
pub struct ObjectArtifactStore {
    inner: Box<dyn ObjectStore>,
    description: String,
}

impl std::fmt::Debug for ObjectArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectArtifactStore")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl ObjectArtifactStore {
    /// S3 bucket with credentials and region taken from the standard AWS
    /// environment variables.
    pub fn s3(bucket: &str) -> Result<Self, StoreError> {
        let inner = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(StoreError::Init)?;
        Ok(Self {
            inner: Box::new(inner),
            description: format!("s3://{bucket}"),
        })
    }

    /// Local directory, created if missing.
    pub fn local(root: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root).map_err(|e| {
            StoreError::Init(object_store::Error::Generic {
                store: "LocalFileSystem",
                source: Box::new(e),
            })
        })?;
        let inner = LocalFileSystem::new_with_prefix(root).map_err(StoreError::Init)?;
        Ok(Self {
            inner: Box::new(inner),
            description: format!("file://{}", root.display()),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            inner: Box::new(object_store::memory::InMemory::new()),
            description: "memory://".to_string(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

#[async_trait]
impl ArtifactStore for ObjectArtifactStore {
    async fn list(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let prefix = ObjectPath::from(namespace);
        let objects: Vec<object_store::ObjectMeta> = self
            .inner
            .list(Some(&prefix))
            .try_collect()
            .await
            .map_err(|e| StoreError::from_backend(namespace, e))?;
        Ok(objects.into_iter().map(|o| o.location.to_string()).collect())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.inner
            .put(&ObjectPath::from(key), bytes.into())
            .await
            .map_err(|e| StoreError::from_backend(key, e))?;
        tracing::debug!(key, store = %self.description, "Stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let bytes = self
            .inner
            .get(&ObjectPath::from(key))
            .await
            .map_err(|e| StoreError::from_backend(key, e))?
            .bytes()
            .await
            .map_err(|e| StoreError::from_backend(key, e))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner
            .delete(&ObjectPath::from(key))
            .await
            .map_err(|e| StoreError::from_backend(key, e))
    }
}
