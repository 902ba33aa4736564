use super::artifact;
use super::{ArtifactStore, StoreError};

/// Highest block covered by a published artifact of `namespace`.
///
/// Falls back to `genesis_block` when the namespace holds no indexed
/// artifacts or does not exist. Any other store failure is returned: an
/// unreachable store must not be mistaken for a cold start.
pub async fn last_synced_block<S: ArtifactStore + ?Sized>(
    store: &S,
    namespace: &str,
    genesis_block: u64,
) -> Result<u64, StoreError> {
    let keys = match store.list(namespace).await {
        Ok(keys) => keys,
        Err(StoreError::NotFound { .. }) => {
            tracing::warn!(
                namespace,
                genesis_block,
                "Namespace not found, starting from genesis"
            );
            return Ok(genesis_block);
        }
        Err(e) => return Err(e),
    };

    let mut latest: Option<u64> = None;
    for key in &keys {
        let filename = key.rsplit('/').next().unwrap_or(key);
        match artifact::parse_filename(filename) {
            Some(block) => latest = Some(latest.map_or(block, |l| l.max(block))),
            None => tracing::debug!(namespace, key = %key, "Ignoring non-artifact object"),
        }
    }

    match latest {
        Some(block) => Ok(block),
        None => {
            tracing::warn!(
                namespace,
                genesis_block,
                "No artifacts found, starting from genesis"
            );
            Ok(genesis_block)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ObjectArtifactStore;
    use async_trait::async_trait;

    struct UnreachableStore;

    #[async_trait]
    impl ArtifactStore for UnreachableStore {
        async fn list(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Backend {
                key: namespace.into(),
                source: object_store::Error::Generic {
                    store: "test",
                    source: "connection refused".into(),
                },
            })
        }
        async fn put(&self, _key: &str, _bytes: Vec<u8>) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn get(&self, _key: &str) -> Result<Vec<u8>, StoreError> {
            unreachable!()
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            unreachable!()
        }
    }

    struct MissingNamespace;

    #[async_trait]
    impl ArtifactStore for MissingNamespace {
        async fn list(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::NotFound {
                key: namespace.into(),
            })
        }
        async fn put(&self, _key: &str, _bytes: Vec<u8>) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn get(&self, _key: &str) -> Result<Vec<u8>, StoreError> {
            unreachable!()
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_cold_start_returns_genesis() {
        let store = ObjectArtifactStore::in_memory();
        assert_eq!(last_synced_block(&store, "app_data", 100).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_missing_namespace_returns_genesis() {
        assert_eq!(
            last_synced_block(&MissingNamespace, "app_data", 7).await.unwrap(),
            7
        );
    }

    #[tokio::test]
    async fn test_max_block_wins() {
        let store = ObjectArtifactStore::in_memory();
        for key in [
            "app_data/cow_150.json",
            "app_data/cow_1200.json",
            "app_data/cow_999.json",
        ] {
            store.put(key, vec![]).await.unwrap();
        }
        assert_eq!(last_synced_block(&store, "app_data", 100).await.unwrap(), 1200);
    }

    #[tokio::test]
    async fn test_unparseable_names_ignored() {
        let store = ObjectArtifactStore::in_memory();
        store.put("app_data/cow_300.json", vec![]).await.unwrap();
        store.put("app_data/notes.txt", vec![]).await.unwrap();
        store.put("app_data/cow_9000.json.bak", vec![]).await.unwrap();
        assert_eq!(last_synced_block(&store, "app_data", 100).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_only_unparseable_names_returns_genesis() {
        let store = ObjectArtifactStore::in_memory();
        store.put("app_data/readme.md", vec![]).await.unwrap();
        assert_eq!(last_synced_block(&store, "app_data", 42).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let store = ObjectArtifactStore::in_memory();
        store.put("order_rewards/cow_500.json", vec![]).await.unwrap();
        assert_eq!(last_synced_block(&store, "app_data", 100).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_fatal() {
        let result = last_synced_block(&UnreachableStore, "app_data", 100).await;
        assert!(matches!(result, Err(StoreError::Backend { .. })));
    }
}
