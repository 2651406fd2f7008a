//! Mapping documents, loaded from a provider and cached for the process lifetime.
//!
//! Readers go through an `ArcSwap` snapshot of the cache and never wait on a
//! writer. A save persists through the provider first and then swaps the new
//! document into the cache, so a reader sees either the old or the new
//! document, never a partial one.
use crate::metrics_defs::{MAPPING_CACHE_HIT, MAPPING_CACHE_MISS, MAPPING_SAVES};
use crate::types::{MappingDocument, is_valid_identifier};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use shared::counter;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{AcquireError, RwLock, Semaphore};

pub const MAPPING_FILENAME: &str = "mappings.yaml";

#[derive(thiserror::Error, Debug)]
pub enum MappingError {
    #[error("invalid source identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("mapping not found for '{0}'")]
    NotFound(String),

    #[error("could not parse mapping for '{identifier}': {reason}")]
    Parse { identifier: String, reason: String },

    #[error("could not encode mapping: {0}")]
    Encode(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("mapping store is shut down")]
    Closed(#[from] AcquireError),
}

/// Storage backend for mapping documents.
#[async_trait]
pub trait MappingProvider: Send + Sync {
    async fn load(&self, identifier: &str) -> Result<MappingDocument, MappingError>;
    /// Must replace any existing document atomically.
    async fn store(&self, identifier: &str, document: &MappingDocument)
    -> Result<(), MappingError>;
    /// Identifiers that currently have a document.
    async fn list(&self) -> Result<Vec<String>, MappingError>;
}

fn parse_document(identifier: &str, text: &str) -> Result<MappingDocument, MappingError> {
    if text.trim().is_empty() {
        return Ok(MappingDocument::default());
    }
    serde_yaml::from_str(text).map_err(|e| MappingError::Parse {
        identifier: identifier.to_string(),
        reason: e.to_string(),
    })
}

/// Keeps one `<base_dir>/<identifier>/mappings.yaml` per source.
pub struct FilesystemMappingProvider {
    base_dir: PathBuf,
}

impl FilesystemMappingProvider {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        FilesystemMappingProvider {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, identifier: &str) -> PathBuf {
        self.base_dir.join(identifier).join(MAPPING_FILENAME)
    }
}

#[async_trait]
impl MappingProvider for FilesystemMappingProvider {
    async fn load(&self, identifier: &str) -> Result<MappingDocument, MappingError> {
        let path = self.path_for(identifier);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::error!(identifier, path = %path.display(), "Mapping file not found");
                return Err(MappingError::NotFound(identifier.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let document = parse_document(identifier, &text)?;
        tracing::info!(identifier, entries = document.len(), "Loaded mapping");
        Ok(document)
    }

    async fn store(
        &self,
        identifier: &str,
        document: &MappingDocument,
    ) -> Result<(), MappingError> {
        let path = self.path_for(identifier);
        let text = serde_yaml::to_string(document)?;

        // Write to a temporary file in the same directory and rename it over the
        // target, so readers of the file never observe a partial write.
        tokio::task::spawn_blocking(move || write_atomic(&path, text.as_bytes()))
            .await
            .map_err(io::Error::other)??;

        tracing::info!(identifier, entries = document.len(), "Stored mapping");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, MappingError> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut identifiers = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if is_valid_identifier(&name)
                && tokio::fs::try_exists(entry.path().join(MAPPING_FILENAME)).await?
            {
                identifiers.push(name);
            }
        }
        identifiers.sort();
        Ok(identifiers)
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), MappingError> {
    use std::io::Write;

    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("mapping path has no parent directory"))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Keeps raw YAML text in memory. Used by tests and embedders without a disk.
#[derive(Default)]
pub struct InMemoryMappingProvider {
    documents: RwLock<HashMap<String, String>>,
}

impl InMemoryMappingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the provider with unparsed YAML, which may be malformed on purpose.
    pub fn with_raw(mut self, identifier: &str, yaml: &str) -> Self {
        self.documents
            .get_mut()
            .insert(identifier.to_string(), yaml.to_string());
        self
    }
}

#[async_trait]
impl MappingProvider for InMemoryMappingProvider {
    async fn load(&self, identifier: &str) -> Result<MappingDocument, MappingError> {
        let documents = self.documents.read().await;
        let text = documents
            .get(identifier)
            .ok_or_else(|| MappingError::NotFound(identifier.to_string()))?;
        parse_document(identifier, text)
    }

    async fn store(
        &self,
        identifier: &str,
        document: &MappingDocument,
    ) -> Result<(), MappingError> {
        let text = serde_yaml::to_string(document)?;
        self.documents
            .write()
            .await
            .insert(identifier.to_string(), text);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, MappingError> {
        let mut identifiers: Vec<String> = self.documents.read().await.keys().cloned().collect();
        identifiers.sort();
        Ok(identifiers)
    }
}

struct MappingStoreInner {
    provider: Arc<dyn MappingProvider>,
    cache: ArcSwap<HashMap<String, Arc<MappingDocument>>>,
    // Only one save runs at a time. Loads never take this permit.
    update_lock: Semaphore,
}

/// Read-through cache in front of a `MappingProvider`.
#[derive(Clone)]
pub struct MappingStore {
    inner: Arc<MappingStoreInner>,
}

impl MappingStore {
    pub fn new(provider: Arc<dyn MappingProvider>) -> Self {
        MappingStore {
            inner: Arc::new(MappingStoreInner {
                provider,
                cache: ArcSwap::from_pointee(HashMap::new()),
                update_lock: Semaphore::new(1),
            }),
        }
    }

    pub async fn load(&self, identifier: &str) -> Result<Arc<MappingDocument>, MappingError> {
        check_identifier(identifier)?;

        if let Some(document) = self.inner.cache.load().get(identifier) {
            counter!(MAPPING_CACHE_HIT).increment(1);
            return Ok(document.clone());
        }
        counter!(MAPPING_CACHE_MISS).increment(1);

        let loaded = Arc::new(self.inner.provider.load(identifier).await?);

        // A save that finished while this load was reading the provider wins.
        let previous = self.inner.cache.rcu(|cache| {
            let mut next = HashMap::clone(cache);
            next.entry(identifier.to_string())
                .or_insert_with(|| loaded.clone());
            next
        });
        Ok(previous.get(identifier).cloned().unwrap_or(loaded))
    }

    pub async fn save(
        &self,
        identifier: &str,
        document: MappingDocument,
    ) -> Result<(), MappingError> {
        check_identifier(identifier)?;
        let _permit = self.inner.update_lock.acquire().await?;

        let duplicates = document.duplicate_targets();
        if !duplicates.is_empty() {
            tracing::warn!(identifier, ?duplicates, "Mapping writes the same target more than once");
        }

        self.inner.provider.store(identifier, &document).await?;

        let document = Arc::new(document);
        self.inner.cache.rcu(|cache| {
            let mut next = HashMap::clone(cache);
            next.insert(identifier.to_string(), document.clone());
            next
        });
        counter!(MAPPING_SAVES).increment(1);
        Ok(())
    }

    /// Drops the cached document so the next load reads the provider again.
    pub fn invalidate(&self, identifier: &str) {
        self.inner.cache.rcu(|cache| {
            let mut next = HashMap::clone(cache);
            next.remove(identifier);
            next
        });
    }

    pub async fn list(&self) -> Result<Vec<String>, MappingError> {
        self.inner.provider.list().await
    }
}

fn check_identifier(identifier: &str) -> Result<(), MappingError> {
    if is_valid_identifier(identifier) {
        Ok(())
    } else {
        Err(MappingError::InvalidIdentifier(identifier.to_string()))
    }
}
