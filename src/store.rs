//! Durable signature → blob store
//!
//! The store is the source of truth. It always contains the default (empty)
//! schema under [`DEFAULT_SIGNATURE`], which can be neither overwritten nor
//! removed. Content entries are verified on write: the key must be the
//! content signature of the blob.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::codec::DEFAULT_SCHEMA_BLOB;
use crate::error::{Result, SchemaError};
use crate::signature::{Signature, DEFAULT_SIGNATURE};

/// Ordered mapping the store persists into
///
/// Backends are expected to be transactional on their own; the store only
/// sees committed reads and writes.
pub trait StoreBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn put(&mut self, key: &Signature, blob: &str) -> Result<()>;

    /// Returns true if the key existed
    fn delete(&mut self, key: &str) -> Result<bool>;

    /// All entries, ordered by signature
    fn entries(&self) -> Result<Vec<(Signature, String)>>;
}

/// Backend holding everything in memory
#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: BTreeMap<Signature, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: &Signature, blob: &str) -> Result<()> {
        self.map.insert(key.clone(), blob.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        Ok(self.map.remove(key).is_some())
    }

    fn entries(&self) -> Result<Vec<(Signature, String)>> {
        Ok(self.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Backend persisted as a single JSON document
///
/// Every write rewrites the file through a temporary sibling followed by a
/// rename, so a crash leaves either the old or the new document.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    map: BTreeMap<Signature, String>,
}

impl FileBackend {
    /// Open the document at `path`, starting empty if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let map = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = map.len(), "opened schema file");
        Ok(Self { path, map })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&self.map)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = self.map.len(), "flushed schema file");
        Ok(())
    }
}

impl StoreBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: &Signature, blob: &str) -> Result<()> {
        let previous = self.map.insert(key.clone(), blob.to_string());
        if let Err(e) = self.flush() {
            match previous {
                Some(old) => self.map.insert(key.clone(), old),
                None => self.map.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool> {
        let Some((k, old)) = self.map.remove_entry(key) else {
            return Ok(false);
        };
        if let Err(e) = self.flush() {
            self.map.insert(k, old);
            return Err(e);
        }
        Ok(true)
    }

    fn entries(&self) -> Result<Vec<(Signature, String)>> {
        Ok(self.map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Signature → canonical blob store
pub struct SchemaStore {
    backend: RwLock<Box<dyn StoreBackend>>,
}

impl std::fmt::Debug for SchemaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaStore").finish_non_exhaustive()
    }
}

impl SchemaStore {
    /// Wrap a backend, seeding the default schema if it is missing
    pub fn new(backend: impl StoreBackend + 'static) -> Result<Self> {
        let mut backend: Box<dyn StoreBackend> = Box::new(backend);
        if backend.get(DEFAULT_SIGNATURE.as_str())?.as_deref() != Some(DEFAULT_SCHEMA_BLOB) {
            backend.put(&DEFAULT_SIGNATURE, DEFAULT_SCHEMA_BLOB)?;
        }
        Ok(Self {
            backend: RwLock::new(backend),
        })
    }

    /// A fresh store backed by memory
    pub fn in_memory() -> Self {
        let mut map = BTreeMap::new();
        map.insert(DEFAULT_SIGNATURE.clone(), DEFAULT_SCHEMA_BLOB.to_string());
        Self {
            backend: RwLock::new(Box::new(MemoryBackend { map })),
        }
    }

    /// Open a file-backed store
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(FileBackend::open(path)?)
    }

    pub fn get(&self, signature: &str) -> Result<Option<String>> {
        self.backend.read().get(signature)
    }

    pub fn contains(&self, signature: &str) -> Result<bool> {
        Ok(self.get(signature)?.is_some())
    }

    /// Store a blob under its content signature
    ///
    /// Returns true if the store changed; writing an identical entry again is
    /// a no-op.
    pub fn put(&self, signature: &Signature, blob: &str) -> Result<bool> {
        let blob = blob.trim();
        let actual = Signature::from_blob(blob);
        if actual != *signature {
            return Err(SchemaError::SignatureMismatch {
                expected: signature.to_string(),
                actual: actual.to_string(),
            });
        }
        self.upsert(signature, blob)
    }

    /// Store a blob under a reference name, without content verification
    pub fn put_reference(&self, signature: &Signature, blob: &str) -> Result<bool> {
        if signature.is_content() {
            return Err(SchemaError::InvalidDefinition(format!(
                "{} is a content signature, not a reference name",
                signature
            )));
        }
        self.upsert(signature, blob.trim())
    }

    /// Store an entry trusting the caller's signature (archive restore)
    pub(crate) fn put_unchecked(&self, signature: &Signature, blob: &str) -> Result<bool> {
        self.upsert(signature, blob.trim())
    }

    fn upsert(&self, signature: &Signature, blob: &str) -> Result<bool> {
        let mut backend = self.backend.write();
        let existing = backend.get(signature.as_str())?;
        if existing.as_deref() == Some(blob) {
            debug!(%signature, "schema already stored");
            return Ok(false);
        }
        if signature.is_default() {
            return Err(SchemaError::ProtectedSignature(signature.to_string()));
        }
        backend.put(signature, blob)?;
        info!(%signature, "stored schema");
        Ok(true)
    }

    /// Remove an entry; the default schema is protected
    pub fn remove(&self, signature: &str) -> Result<()> {
        if signature == DEFAULT_SIGNATURE.as_str() {
            return Err(SchemaError::ProtectedSignature(signature.to_string()));
        }
        if !self.backend.write().delete(signature)? {
            return Err(SchemaError::not_found(signature));
        }
        info!(signature, "removed schema");
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<Signature>> {
        Ok(self.items()?.into_iter().map(|(k, _)| k).collect())
    }

    pub fn values(&self) -> Result<Vec<String>> {
        Ok(self.items()?.into_iter().map(|(_, v)| v).collect())
    }

    pub fn items(&self) -> Result<Vec<(Signature, String)>> {
        self.backend.read().entries()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Content entries whose key no longer matches their blob
    pub fn verify(&self) -> Result<Vec<Signature>> {
        Ok(self
            .items()?
            .into_iter()
            .filter(|(sig, blob)| sig.is_content() && !sig.verify(blob))
            .map(|(sig, _)| sig)
            .collect())
    }
}
