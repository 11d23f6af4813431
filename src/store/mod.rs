//! Durable document storage.
//!
//! Documents are schema-less JSON values addressed by `(collection, key)`.
//! Everything else in the service reaches persisted state only through the
//! [`DocumentStore`] contract; no handle or cached document outlives a single
//! call.

mod file;

pub use file::FileStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A stored record. Shape is up to the caller.
pub type Document = serde_json::Value;

/// Transformation applied by [`DocumentStore::modify`] while the key is locked.
pub type Mutation = Box<dyn FnOnce(Document) -> Result<Document, StoreError> + Send>;

/// Longest key accepted, leaving room for the `.json` suffix on common filesystems
const MAX_KEY_LEN: usize = 200;

/// The fixed set of collections the service persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Tokens,
    ShoppingCarts,
    Menu,
    Purchases,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Users,
        Collection::Tokens,
        Collection::ShoppingCarts,
        Collection::Menu,
        Collection::Purchases,
    ];

    /// Directory name on disk
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Tokens => "tokens",
            Collection::ShoppingCarts => "shoppingCarts",
            Collection::Menu => "menu",
            Collection::Purchases => "purchases",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {collection}/{key} already exists")]
    AlreadyExists { collection: Collection, key: String },

    #[error("document {collection}/{key} not found")]
    NotFound { collection: Collection, key: String },

    #[error("invalid document key: {0:?}")]
    InvalidKey(String),

    /// A [`Mutation`] declined to produce a new document; nothing was written
    #[error("update aborted: {0}")]
    Aborted(String),

    #[error("document {collection}/{key} has an unexpected shape: {source}")]
    Corrupt {
        collection: Collection,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// CRUD over whole documents.
///
/// Every write is atomic with respect to readers, and writers to the same key
/// are serialized. Nothing spans more than one key.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a new document. Never overwrites.
    async fn create(&self, collection: Collection, key: &str, doc: &Document)
        -> Result<(), StoreError>;

    /// Load a document. Content that cannot be parsed comes back as an empty
    /// object rather than an error.
    async fn read(&self, collection: Collection, key: &str) -> Result<Document, StoreError>;

    /// Replace an existing document.
    async fn update(&self, collection: Collection, key: &str, doc: &Document)
        -> Result<(), StoreError>;

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError>;

    /// Read, transform and write back one document as a single step with
    /// respect to other writers of the same key. Returns the stored result.
    async fn modify(
        &self,
        collection: Collection,
        key: &str,
        mutation: Mutation,
    ) -> Result<Document, StoreError>;
}

/// Trim a caller-supplied key and reject anything that could escape the
/// collection directory.
pub fn validate_key(key: &str) -> Result<&str, StoreError> {
    let trimmed = key.trim();
    let invalid = trimmed.is_empty()
        || trimmed.len() > MAX_KEY_LEN
        || trimmed.starts_with('.')
        || trimmed.contains("..")
        || trimmed
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0') || c.is_control());

    if invalid {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(trimmed)
}

/// Read a document and decode it into `T`.
pub async fn read_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Collection,
    key: &str,
) -> Result<T, StoreError> {
    let doc = store.read(collection, key).await?;
    decode(collection, key, doc)
}

/// Whether a document is present, whatever its content.
pub async fn exists(
    store: &dyn DocumentStore,
    collection: Collection,
    key: &str,
) -> Result<bool, StoreError> {
    match store.read(collection, key).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Build a [`Mutation`] that works on typed values instead of raw documents.
pub fn typed_mutation<T, F>(collection: Collection, key: &str, f: F) -> Mutation
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T) -> Result<(), StoreError> + Send + 'static,
{
    let key = key.to_string();
    Box::new(move |doc| {
        let mut value: T = decode(collection, &key, doc)?;
        f(&mut value)?;
        Ok(serde_json::to_value(value)?)
    })
}

fn decode<T: DeserializeOwned>(
    collection: Collection,
    key: &str,
    doc: Document,
) -> Result<T, StoreError> {
    serde_json::from_value(doc).map_err(|source| StoreError::Corrupt {
        collection,
        key: key.to_string(),
        source,
    })
}
