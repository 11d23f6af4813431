use async_trait::async_trait;
use dashmap::DashMap;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{validate_key, Collection, Document, DocumentStore, Mutation, StoreError};

/// One JSON file per document under `<base_dir>/<collection>/<key>.json`.
///
/// Writes go to a temp file in the collection directory which is then
/// renamed over the target, so readers never see a torn document. Writers
/// to the same key queue on a per-key mutex; different keys never contend.
pub struct FileStore {
    base_dir: PathBuf,
    locks: DashMap<(Collection, String), Arc<Mutex<()>>>,
}

#[derive(Debug, Clone, Copy)]
enum WriteMode {
    CreateNew,
    Replace,
}

impl FileStore {
    /// Open (and if needed lay out) a store rooted at `base_dir`
    pub async fn open(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        for collection in Collection::ALL {
            tokio::fs::create_dir_all(base_dir.join(collection.as_str())).await?;
        }
        info!(path = %base_dir.display(), "Opened document store");

        Ok(Self {
            base_dir,
            locks: DashMap::new(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.base_dir.join(collection.as_str())
    }

    fn document_path(&self, collection: Collection, key: &str) -> PathBuf {
        self.collection_dir(collection).join(format!("{key}.json"))
    }

    fn key_lock(&self, collection: Collection, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((collection, key.to_string()))
            .or_default()
            .value()
            .clone()
    }

    /// Drop the lock entry for a deleted key unless someone is still queued on it
    fn release_lock(&self, collection: Collection, key: &str) {
        self.locks
            .remove_if(&(collection, key.to_string()), |_, lock| {
                Arc::strong_count(lock) == 1
            });
    }

    async fn load(&self, collection: Collection, key: &str) -> Result<Document, StoreError> {
        let path = self.document_path(collection, key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    collection,
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        Ok(parse_document(collection, key, &bytes))
    }

    async fn write(
        &self,
        collection: Collection,
        key: &str,
        doc: &Document,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(doc)?;
        let dir = self.collection_dir(collection);
        let path = self.document_path(collection, key);

        let result = tokio::task::spawn_blocking(move || write_atomic(&dir, &path, &bytes, mode))
            .await
            .map_err(io::Error::other)?;

        match result {
            Ok(()) => {
                debug!(%collection, key, ?mode, "Wrote document");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(StoreError::AlreadyExists {
                collection,
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn create(
        &self,
        collection: Collection,
        key: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        let key = validate_key(key)?;
        let lock = self.key_lock(collection, key);
        let _guard = lock.lock().await;

        self.write(collection, key, doc, WriteMode::CreateNew).await
    }

    async fn read(&self, collection: Collection, key: &str) -> Result<Document, StoreError> {
        let key = validate_key(key)?;
        self.load(collection, key).await
    }

    async fn update(
        &self,
        collection: Collection,
        key: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        let key = validate_key(key)?;
        let lock = self.key_lock(collection, key);
        let _guard = lock.lock().await;

        if !tokio::fs::try_exists(self.document_path(collection, key)).await? {
            return Err(StoreError::NotFound {
                collection,
                key: key.to_string(),
            });
        }
        self.write(collection, key, doc, WriteMode::Replace).await
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError> {
        let key = validate_key(key)?;
        let lock = self.key_lock(collection, key);

        let result = {
            let _guard = lock.lock().await;
            match tokio::fs::remove_file(self.document_path(collection, key)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                    collection,
                    key: key.to_string(),
                }),
                Err(e) => Err(e.into()),
            }
        };

        drop(lock);
        self.release_lock(collection, key);
        if result.is_ok() {
            debug!(%collection, key, "Deleted document");
        }
        result
    }

    async fn modify(
        &self,
        collection: Collection,
        key: &str,
        mutation: Mutation,
    ) -> Result<Document, StoreError> {
        let key = validate_key(key)?;
        let lock = self.key_lock(collection, key);
        let _guard = lock.lock().await;

        let current = self.load(collection, key).await?;
        let next = mutation(current)?;
        self.write(collection, key, &next, WriteMode::Replace).await?;
        Ok(next)
    }
}

/// Parse persisted bytes. Malformed content becomes an empty object so that
/// presence checks keep working on a damaged file.
fn parse_document(collection: Collection, key: &str, bytes: &[u8]) -> Document {
    match serde_json::from_slice(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(%collection, key, error = %e, "Stored document is not valid JSON");
            Document::Object(serde_json::Map::new())
        }
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8], mode: WriteMode) -> io::Result<()> {
    // Same directory as the target so the rename stays on one filesystem
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(bytes)?;
    temp_file.as_file().sync_all()?;

    match mode {
        WriteMode::CreateNew => temp_file.persist_noclobber(path).map_err(|e| e.error)?,
        WriteMode::Replace => temp_file.persist(path).map_err(|e| e.error)?,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::typed_mutation;
    use serde_json::json;

    async fn open_store() -> (tempfile::TempDir, FileStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(temp_dir.path().join("data")).await.unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_open_creates_collection_dirs() {
        let (_dir, store) = open_store().await;
        for collection in Collection::ALL {
            assert!(store.base_dir().join(collection.as_str()).is_dir());
        }
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let (_dir, store) = open_store().await;
        let doc = json!({"email": "jane@example.com", "name": "Jane"});

        store.create(Collection::Users, "jane@example.com", &doc).await.unwrap();
        let read = store.read(Collection::Users, "jane@example.com").await.unwrap();
        assert_eq!(read, doc);
    }

    #[tokio::test]
    async fn test_create_does_not_overwrite() {
        let (_dir, store) = open_store().await;
        store.create(Collection::Users, "a@b.co", &json!({"v": 1})).await.unwrap();

        let err = store
            .create(Collection::Users, "a@b.co", &json!({"v": 2}))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());

        let read = store.read(Collection::Users, "a@b.co").await.unwrap();
        assert_eq!(read, json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let (_dir, store) = open_store().await;

        assert!(store.read(Collection::Tokens, "nope").await.unwrap_err().is_not_found());
        assert!(store
            .update(Collection::Tokens, "nope", &json!({}))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.delete(Collection::Tokens, "nope").await.unwrap_err().is_not_found());
        let mutation: Mutation = Box::new(|doc| Ok(doc));
        assert!(store
            .modify(Collection::Tokens, "nope", mutation)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_update_replaces_document() {
        let (_dir, store) = open_store().await;
        store.create(Collection::ShoppingCarts, "a@b.co", &json!([])).await.unwrap();
        store
            .update(Collection::ShoppingCarts, "a@b.co", &json!([{"id": 1, "amount": 2}]))
            .await
            .unwrap();

        let read = store.read(Collection::ShoppingCarts, "a@b.co").await.unwrap();
        assert_eq!(read, json!([{"id": 1, "amount": 2}]));
    }

    #[tokio::test]
    async fn test_delete_removes_document() {
        let (_dir, store) = open_store().await;
        store.create(Collection::Tokens, "abc", &json!({"id": "abc"})).await.unwrap();
        store.delete(Collection::Tokens, "abc").await.unwrap();

        assert!(store.read(Collection::Tokens, "abc").await.unwrap_err().is_not_found());
        assert!(store.locks.is_empty());
        // Key can be reused after deletion
        store.create(Collection::Tokens, "abc", &json!({"id": "abc"})).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_file_reads_as_empty_object() {
        let (_dir, store) = open_store().await;
        let path = store.document_path(Collection::Users, "broken@example.com");
        std::fs::write(&path, b"{not json").unwrap();

        let read = store.read(Collection::Users, "broken@example.com").await.unwrap();
        assert_eq!(read, json!({}));
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected_before_touching_disk() {
        let (_dir, store) = open_store().await;
        let err = store
            .create(Collection::Users, "../tokens/evil", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
        assert!(!store.base_dir().join("tokens").join("evil.json").exists());
    }

    #[tokio::test]
    async fn test_keys_are_trimmed() {
        let (_dir, store) = open_store().await;
        store.create(Collection::Users, " a@b.co ", &json!({"v": 1})).await.unwrap();
        assert!(store.read(Collection::Users, "a@b.co").await.is_ok());
    }

    #[tokio::test]
    async fn test_modify_aborted_leaves_document_untouched() {
        let (_dir, store) = open_store().await;
        store.create(Collection::ShoppingCarts, "a@b.co", &json!([1])).await.unwrap();

        let mutation: Mutation = Box::new(|_| Err(StoreError::Aborted("no".into())));
        let err = store
            .modify(Collection::ShoppingCarts, "a@b.co", mutation)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Aborted(_)));

        let read = store.read(Collection::ShoppingCarts, "a@b.co").await.unwrap();
        assert_eq!(read, json!([1]));
    }

    #[tokio::test]
    async fn test_concurrent_modifies_are_serialized() {
        let (_dir, store) = open_store().await;
        let store = Arc::new(store);
        store.create(Collection::ShoppingCarts, "a@b.co", &json!({"count": 0})).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mutation = typed_mutation(
                    Collection::ShoppingCarts,
                    "a@b.co",
                    |doc: &mut serde_json::Value| {
                        let count = doc["count"].as_u64().unwrap_or_default();
                        doc["count"] = json!(count + 1);
                        Ok(())
                    },
                );
                store
                    .modify(Collection::ShoppingCarts, "a@b.co", mutation)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let read = store.read(Collection::ShoppingCarts, "a@b.co").await.unwrap();
        assert_eq!(read, json!({"count": 25}));
    }

    #[tokio::test]
    async fn test_concurrent_updates_never_tear() {
        let (_dir, store) = open_store().await;
        let store = Arc::new(store);
        store.create(Collection::ShoppingCarts, "a@b.co", &json!([])).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let lines: Vec<_> = (0..50).map(|n| json!({"id": n, "amount": i + 1})).collect();
                store
                    .update(Collection::ShoppingCarts, "a@b.co", &json!(lines))
                    .await
                    .unwrap();
                // Reads racing with writes must always parse
                let read = store.read(Collection::ShoppingCarts, "a@b.co").await.unwrap();
                assert!(read.is_array());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let read = store.read(Collection::ShoppingCarts, "a@b.co").await.unwrap();
        let lines = read.as_array().unwrap();
        assert_eq!(lines.len(), 50);
        let amount = &lines[0]["amount"];
        assert!(lines.iter().all(|line| &line["amount"] == amount));
    }
}
