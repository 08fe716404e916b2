//! Materialization cache
//!
//! Maps signatures to live, decoded schema objects. The cache is derived from
//! the store and never persisted; its one guarantee is identity: while an
//! entry exists for a signature, every lookup returns the same `Arc`.
//!
//! All mutation happens under a single mutex. Decoding on a miss also runs
//! under that mutex so two racing lookups cannot both insert.

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::capability::Capability;
use crate::error::Result;
use crate::schema::SchemaDefinition;
use crate::signature::Signature;

/// A decoded schema object
///
/// The definition may be mutated in place; doing so never touches the store.
/// Re-adding the object to the registry stores the mutated content under its
/// new signature.
#[derive(Debug)]
pub struct LoadedSchema {
    signature: RwLock<Signature>,
    definition: RwLock<SchemaDefinition>,
}

impl LoadedSchema {
    pub fn new(signature: Signature, definition: SchemaDefinition) -> Self {
        Self {
            signature: RwLock::new(signature),
            definition: RwLock::new(definition),
        }
    }

    /// An empty stand-in for a signature whose blob is unavailable
    pub fn placeholder(signature: Signature) -> Self {
        Self::new(signature, SchemaDefinition::default())
    }

    /// Signature this object is currently cached under
    pub fn signature(&self) -> Signature {
        self.signature.read().clone()
    }

    /// Deterministic name derived from the signature (`I<signature>`)
    pub fn name(&self) -> String {
        self.signature.read().capability_name()
    }

    pub fn capability(&self) -> Capability {
        Capability::for_signature(&self.signature.read())
    }

    /// Snapshot of the current definition
    pub fn definition(&self) -> SchemaDefinition {
        self.definition.read().clone()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, SchemaDefinition> {
        self.definition.read()
    }

    /// Mutate the definition in place
    pub fn update<R>(&self, f: impl FnOnce(&mut SchemaDefinition) -> R) -> R {
        f(&mut self.definition.write())
    }

    pub(crate) fn rebind(&self, signature: Signature) {
        *self.signature.write() = signature;
    }
}

/// How a cache entry came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Decoded from a stored blob
    Derived,
    /// The exact object a caller passed to `add`
    Retained,
}

#[derive(Debug)]
struct CacheEntry {
    schema: Arc<LoadedSchema>,
    provenance: Provenance,
}

/// Entry counts by provenance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub derived: usize,
    pub retained: usize,
}

/// Process-wide signature → schema object map
#[derive(Debug, Default)]
pub struct MaterializationCache {
    entries: Mutex<HashMap<Signature, CacheEntry>>,
}

impl MaterializationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached object for a signature, if any
    pub fn get(&self, signature: &str) -> Option<Arc<LoadedSchema>> {
        self.entries
            .lock()
            .get(signature)
            .map(|entry| Arc::clone(&entry.schema))
    }

    /// Return the cached object, or decode and memoize one
    ///
    /// `decode` only runs on a miss. An existing entry always wins, so
    /// repeated calls return the same object.
    pub fn get_or_insert_with<F>(&self, signature: &Signature, decode: F) -> Result<Arc<LoadedSchema>>
    where
        F: FnOnce() -> Result<SchemaDefinition>,
    {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(signature) {
            debug!(%signature, "materialization cache hit");
            return Ok(Arc::clone(&entry.schema));
        }

        let schema = Arc::new(LoadedSchema::new(signature.clone(), decode()?));
        debug!(%signature, "materialized schema");
        entries.insert(
            signature.clone(),
            CacheEntry {
                schema: Arc::clone(&schema),
                provenance: Provenance::Derived,
            },
        );
        Ok(schema)
    }

    /// Make `schema` the memoized object for `signature`
    ///
    /// Any other entry holding the same object is dropped first, and the
    /// object is renamed after its new signature.
    pub fn retain(&self, signature: Signature, schema: Arc<LoadedSchema>) {
        let mut entries = self.entries.lock();
        entries.retain(|key, entry| *key == signature || !Arc::ptr_eq(&entry.schema, &schema));
        schema.rebind(signature.clone());
        debug!(%signature, "retained schema object");
        entries.insert(
            signature,
            CacheEntry {
                schema,
                provenance: Provenance::Retained,
            },
        );
    }

    /// Evict the entry for a signature
    pub fn invalidate(&self, signature: &str) -> Option<Arc<LoadedSchema>> {
        let removed = self.entries.lock().remove(signature).map(|entry| entry.schema);
        if removed.is_some() {
            debug!(signature, "invalidated cached schema");
        }
        removed
    }

    /// Evict whichever entry holds this exact object
    pub fn invalidate_object(&self, schema: &Arc<LoadedSchema>) -> Option<Signature> {
        let mut entries = self.entries.lock();
        let key = entries
            .iter()
            .find(|(_, entry)| Arc::ptr_eq(&entry.schema, schema))
            .map(|(key, _)| key.clone())?;
        entries.remove(&key);
        debug!(signature = %key, "invalidated cached schema object");
        Some(key)
    }

    pub fn provenance(&self, signature: &str) -> Option<Provenance> {
        self.entries.lock().get(signature).map(|entry| entry.provenance)
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.entries.lock().contains_key(signature)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        let retained = entries
            .values()
            .filter(|entry| entry.provenance == Provenance::Retained)
            .count();
        CacheStats {
            entries: entries.len(),
            derived: entries.len() - retained,
            retained,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::schema::{FieldDefinition, FieldType};
    use std::thread;

    fn sig(s: &str) -> Signature {
        Signature::from_blob(s)
    }

    #[test]
    fn test_hit_returns_same_object() {
        let cache = MaterializationCache::new();
        let a = cache.get_or_insert_with(&sig("a"), || Ok(SchemaDefinition::new())).unwrap();
        let b = cache
            .get_or_insert_with(&sig("a"), || panic!("decode must not run on a hit"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.provenance(sig("a").as_str()), Some(Provenance::Derived));
    }

    #[test]
    fn test_decode_error_leaves_no_entry() {
        let cache = MaterializationCache::new();
        let result = cache.get_or_insert_with(&sig("bad"), || {
            Err(SchemaError::InvalidDefinition("broken".into()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_forces_fresh_object() {
        let cache = MaterializationCache::new();
        let first = cache.get_or_insert_with(&sig("a"), || Ok(SchemaDefinition::new())).unwrap();
        assert!(cache.invalidate(sig("a").as_str()).is_some());
        let second = cache.get_or_insert_with(&sig("a"), || Ok(SchemaDefinition::new())).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_retain_moves_object_to_new_signature() {
        let cache = MaterializationCache::new();
        let obj = cache.get_or_insert_with(&sig("old"), || Ok(SchemaDefinition::new())).unwrap();
        obj.update(|d| d.set_field(FieldDefinition::new("x", FieldType::Int)));

        cache.retain(sig("new"), Arc::clone(&obj));

        assert!(!cache.contains(sig("old").as_str()));
        assert!(Arc::ptr_eq(&cache.get(sig("new").as_str()).unwrap(), &obj));
        assert_eq!(obj.signature(), sig("new"));
        assert_eq!(obj.name(), format!("I{}", sig("new")));
        assert_eq!(
            cache.stats(),
            CacheStats {
                entries: 1,
                derived: 0,
                retained: 1
            }
        );
    }

    #[test]
    fn test_invalidate_object_by_identity() {
        let cache = MaterializationCache::new();
        let obj = cache.get_or_insert_with(&sig("a"), || Ok(SchemaDefinition::new())).unwrap();
        let stranger = Arc::new(LoadedSchema::new(sig("a"), SchemaDefinition::new()));
        assert_eq!(cache.invalidate_object(&stranger), None);
        assert_eq!(cache.invalidate_object(&obj), Some(sig("a")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_misses_produce_one_object() {
        let cache = Arc::new(MaterializationCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    cache
                        .get_or_insert_with(&sig("shared"), || Ok(SchemaDefinition::new()))
                        .unwrap()
                })
            })
            .collect();
        let objects: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(objects.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len(), 1);
    }
}
