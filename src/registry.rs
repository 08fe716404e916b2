//! Schema Registry
//!
//! Couples the durable [`SchemaStore`] with the in-memory
//! [`MaterializationCache`]. Writes go to the store first; the cache is only
//! touched once the store accepted the entry.
//!
//! Retention of an added object is best effort and narrow: it holds within a
//! single process, after the store write succeeded. If the backing substrate
//! later discards that write, the retained object lingers until the cache is
//! invalidated or the process restarts.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::archive;
use crate::cache::{CacheStats, LoadedSchema, MaterializationCache, Provenance};
use crate::codec::{JsonCodec, SchemaCodec, DEFAULT_SCHEMA_BLOB};
use crate::config::{BackendKind, SchemaStoreConfig};
use crate::error::{Result, SchemaError};
use crate::reference::{ReferenceResolver, StaticResolver};
use crate::schema::SchemaDefinition;
use crate::signature::{Signature, DEFAULT_SIGNATURE};
use crate::store::SchemaStore;

/// Anything a schema can be submitted as
#[derive(Debug, Clone)]
pub enum SchemaInput {
    /// A definition built by the caller
    Definition(SchemaDefinition),
    /// A serialized blob, canonicalized before use
    Blob(String),
    /// A materialized object, retained by identity on `add`
    Loaded(Arc<LoadedSchema>),
    /// A stable dotted name resolved through the reference resolver
    Reference(String),
}

impl From<SchemaDefinition> for SchemaInput {
    fn from(definition: SchemaDefinition) -> Self {
        SchemaInput::Definition(definition)
    }
}

impl From<&SchemaDefinition> for SchemaInput {
    fn from(definition: &SchemaDefinition) -> Self {
        SchemaInput::Definition(definition.clone())
    }
}

impl From<String> for SchemaInput {
    fn from(blob: String) -> Self {
        SchemaInput::Blob(blob)
    }
}

impl From<&str> for SchemaInput {
    fn from(blob: &str) -> Self {
        SchemaInput::Blob(blob.to_string())
    }
}

impl From<Arc<LoadedSchema>> for SchemaInput {
    fn from(schema: Arc<LoadedSchema>) -> Self {
        SchemaInput::Loaded(schema)
    }
}

impl From<&Arc<LoadedSchema>> for SchemaInput {
    fn from(schema: &Arc<LoadedSchema>) -> Self {
        SchemaInput::Loaded(Arc::clone(schema))
    }
}

/// The signature-addressed schema registry
pub struct SchemaRegistry {
    store: SchemaStore,
    cache: MaterializationCache,
    codec: Box<dyn SchemaCodec>,
    resolver: Box<dyn ReferenceResolver>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("store", &self.store)
            .field("cache", &self.cache.stats())
            .finish_non_exhaustive()
    }
}

impl SchemaRegistry {
    /// Registry over an existing store, with the JSON codec and no references
    pub fn new(store: SchemaStore) -> Self {
        Self {
            store,
            cache: MaterializationCache::new(),
            codec: Box::new(JsonCodec),
            resolver: Box::new(StaticResolver::new()),
        }
    }

    /// Registry over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(SchemaStore::in_memory())
    }

    /// Build a registry from configuration
    pub fn open(config: &SchemaStoreConfig) -> Result<Self> {
        let store = match config.store.backend {
            BackendKind::Memory => SchemaStore::in_memory(),
            BackendKind::File => SchemaStore::open(config.store_path())?,
        };

        let mut resolver = StaticResolver::new();
        for reference in &config.references {
            Signature::reference(&reference.name)?;
            resolver.register_file(reference.name.as_str(), &reference.path)?;
        }

        let registry = Self::new(store).with_resolver(resolver);

        if config.store.verify_on_open {
            for signature in registry.verify()? {
                warn!(%signature, "stored blob does not match its signature");
            }
        }
        if config.cache.preload {
            let count = registry.preload()?;
            info!(count, "preloaded schema cache");
        }
        Ok(registry)
    }

    /// Replace the codec, dropping every cached object
    ///
    /// The default signature is fixed to the digest of
    /// [`DEFAULT_SCHEMA_BLOB`], so the codec must encode the empty schema to
    /// exactly that blob; any other codec is rejected with
    /// `InvalidDefinition`.
    pub fn with_codec(mut self, codec: impl SchemaCodec + 'static) -> Result<Self> {
        let empty = codec.encode(&SchemaDefinition::default())?;
        if empty.trim() != DEFAULT_SCHEMA_BLOB {
            return Err(SchemaError::InvalidDefinition(format!(
                "codec encodes the empty schema as {:?}, expected {:?}",
                empty, DEFAULT_SCHEMA_BLOB
            )));
        }
        self.codec = Box::new(codec);
        self.cache.clear();
        Ok(self)
    }

    pub fn with_resolver(mut self, resolver: impl ReferenceResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    pub fn cache(&self) -> &MaterializationCache {
        &self.cache
    }

    pub fn codec(&self) -> &dyn SchemaCodec {
        self.codec.as_ref()
    }

    /// Canonical blob of a schema input
    pub fn canonical(&self, input: &SchemaInput) -> Result<String> {
        match input {
            SchemaInput::Definition(definition) => self.codec.encode(definition),
            SchemaInput::Blob(blob) => self.codec.canonicalize(blob),
            SchemaInput::Loaded(schema) => self.codec.encode(&schema.read()),
            SchemaInput::Reference(name) => {
                let definition = self.resolve(&Signature::reference(name)?)?;
                self.codec.encode(&definition)
            }
        }
    }

    /// Signature of a schema input
    ///
    /// In reference mode the signature is the input's stable dotted name; no
    /// hashing takes place.
    pub fn signature(&self, input: &SchemaInput, use_reference: bool) -> Result<Signature> {
        if use_reference {
            return reference_name(input);
        }
        match input {
            SchemaInput::Reference(name) => Signature::reference(name),
            _ => Ok(Signature::from_blob(&self.canonical(input)?)),
        }
    }

    /// Store a schema, returning its signature
    ///
    /// Adding identical content twice leaves a single entry. When a loaded
    /// object is added it becomes the cached object for its (possibly new)
    /// signature, and any entry it was cached under before is dropped.
    pub fn add(&self, input: impl Into<SchemaInput>) -> Result<Signature> {
        let input = input.into();
        if let SchemaInput::Reference(name) = &input {
            let signature = Signature::reference(name)?;
            self.materialize_reference(&signature)?;
            return Ok(signature);
        }

        let blob = self.canonical(&input)?;
        let signature = Signature::from_blob(&blob);
        self.store.put(&signature, &blob)?;

        if let SchemaInput::Loaded(schema) = input {
            if signature.is_default() {
                debug!("not retaining an object equal to the default schema");
            } else {
                self.cache.retain(signature.clone(), schema);
            }
        }
        Ok(signature)
    }

    /// Stored blob for a signature
    pub fn get(&self, signature: &str) -> Result<Option<String>> {
        self.store.get(signature)
    }

    pub fn contains(&self, signature: &str) -> Result<bool> {
        self.store.contains(signature)
    }

    /// Remove a stored schema and its cached object
    pub fn remove(&self, signature: &str) -> Result<()> {
        self.store.remove(signature)?;
        self.cache.invalidate(signature);
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<Signature>> {
        self.store.keys()
    }

    pub fn values(&self) -> Result<Vec<String>> {
        self.store.values()
    }

    pub fn items(&self) -> Result<Vec<(Signature, String)>> {
        self.store.items()
    }

    pub fn len(&self) -> Result<usize> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.store.is_empty()
    }

    /// Materialize a blob
    ///
    /// The blob's content signature is computed exactly as `add` would; if an
    /// object is already cached under it, that object is returned and the
    /// blob is not decoded again.
    pub fn load(&self, blob: &str) -> Result<Arc<LoadedSchema>> {
        let canonical = self.codec.canonicalize(blob)?;
        let signature = Signature::from_blob(&canonical);
        self.load_as(&signature, &canonical)
    }

    fn load_as(&self, signature: &Signature, blob: &str) -> Result<Arc<LoadedSchema>> {
        self.cache.get_or_insert_with(signature, || {
            let mut definition = self.codec.decode(blob)?;
            if !signature.is_content() {
                definition.identifier = Some(signature.to_string());
            }
            Ok(definition)
        })
    }

    /// Materialize the schema stored under a signature
    pub fn materialize(&self, signature: &str) -> Result<Arc<LoadedSchema>> {
        if let Some(schema) = self.cache.get(signature) {
            return Ok(schema);
        }
        let blob = self
            .store
            .get(signature)?
            .ok_or_else(|| SchemaError::not_found(signature))?;
        self.load_as(&Signature::from(signature), &blob)
    }

    /// Materialize, substituting an uncached empty placeholder when the
    /// signature has no stored blob
    ///
    /// Any other failure, such as a stored blob that no longer decodes, is
    /// returned to the caller.
    pub fn materialize_or_placeholder(&self, signature: &str) -> Result<Arc<LoadedSchema>> {
        match self.materialize(signature) {
            Err(SchemaError::NotFound { .. }) => {
                warn!(signature, "schema not stored; using placeholder");
                Ok(Arc::new(LoadedSchema::placeholder(Signature::from(signature))))
            }
            other => other,
        }
    }

    /// Materialize the default (empty) schema
    pub fn default_schema(&self) -> Result<Arc<LoadedSchema>> {
        self.materialize(DEFAULT_SIGNATURE.as_str())
    }

    /// Resolve a reference name through the resolver
    pub fn resolve(&self, name: &Signature) -> Result<SchemaDefinition> {
        self.resolver
            .resolve(name.as_str())
            .ok_or_else(|| SchemaError::UnresolvableSchema(name.to_string()))
    }

    /// Materialize a schema named by reference, storing it under that name
    pub fn materialize_reference(&self, name: &Signature) -> Result<Arc<LoadedSchema>> {
        let definition = self.resolve(name)?;
        let blob = self.codec.encode(&definition)?;
        if self.store.put_reference(name, &blob)? {
            self.cache.invalidate(name.as_str());
        }
        self.load_as(name, &blob)
    }

    /// Evict the cached object for a signature; the store is untouched
    pub fn invalidate(&self, signature: &str) -> bool {
        self.cache.invalidate(signature).is_some()
    }

    /// Evict whichever cache entry holds this exact object
    pub fn invalidate_schema(&self, schema: &Arc<LoadedSchema>) -> Option<Signature> {
        self.cache.invalidate_object(schema)
    }

    pub fn provenance(&self, signature: &str) -> Option<Provenance> {
        self.cache.provenance(signature)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Content entries whose blob no longer hashes to their key
    pub fn verify(&self) -> Result<Vec<Signature>> {
        self.store.verify()
    }

    /// Materialize every stored schema, returning how many are cached
    pub fn preload(&self) -> Result<usize> {
        for signature in self.store.keys()? {
            self.materialize(signature.as_str())?;
        }
        Ok(self.cache.len())
    }

    /// Write every stored entry to an archive
    pub fn dump(&self, writer: impl Write) -> Result<usize> {
        archive::dump(&self.store, writer)
    }

    /// Restore entries from an archive, dropping stale cached objects
    ///
    /// Each record's cached object is evicted as soon as the record is
    /// written, so an archive that fails partway leaves no stale objects for
    /// the records it did write.
    pub fn restore(&self, reader: impl BufRead) -> Result<usize> {
        archive::restore(&self.store, reader, |signature| {
            self.cache.invalidate(signature.as_str());
        })
    }

    /// Write every stored entry to the archive file at `path`
    pub fn dump_to_path(&self, path: impl AsRef<Path>) -> Result<usize> {
        archive::dump_to_path(&self.store, path)
    }

    /// Restore entries from the archive file at `path`
    pub fn restore_from_path(&self, path: impl AsRef<Path>) -> Result<usize> {
        archive::restore_from_path(&self.store, path, |signature| {
            self.cache.invalidate(signature.as_str());
        })
    }
}

fn reference_name(input: &SchemaInput) -> Result<Signature> {
    let name = match input {
        SchemaInput::Definition(definition) => definition.identifier.clone(),
        SchemaInput::Loaded(schema) => schema.read().identifier.clone(),
        SchemaInput::Reference(name) => Some(name.clone()),
        SchemaInput::Blob(_) => None,
    };
    let name = name.ok_or_else(|| {
        SchemaError::InvalidDefinition("schema has no reference name".to_string())
    })?;
    Signature::reference(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefinition, FieldType};

    fn titled(default: &str) -> SchemaDefinition {
        SchemaDefinition::new()
            .with_field(FieldDefinition::new("title", FieldType::Text).with_default(default))
    }

    #[test]
    fn test_signature_is_deterministic() {
        let registry = SchemaRegistry::in_memory();
        let input = SchemaInput::from(titled("hi"));
        let first = registry.signature(&input, false).unwrap();
        let second = registry.signature(&input, false).unwrap();
        assert_eq!(first, second);

        let blob = registry.canonical(&input).unwrap();
        assert_eq!(first, Signature::from_blob(&blob));
    }

    #[test]
    fn test_blob_and_definition_share_signature() {
        let registry = SchemaRegistry::in_memory();
        let definition = titled("hi");
        let loose = format!(
            "\n {}  ",
            serde_json::to_string_pretty(&definition).unwrap()
        );
        let a = registry.add(definition).unwrap();
        let b = registry.add(loose.as_str()).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len().unwrap(), 2);
    }

    #[test]
    fn test_add_rejects_malformed_input() {
        let registry = SchemaRegistry::in_memory();
        let err = registry.add("not a schema").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefinition(_)));

        let dup = titled("hi").with_field(FieldDefinition::new("title", FieldType::Int));
        assert!(registry.add(dup).is_err());
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn test_load_is_identity_stable() {
        let registry = SchemaRegistry::in_memory();
        let sig = registry.add(titled("hi")).unwrap();
        let blob = registry.get(sig.as_str()).unwrap().unwrap();

        let first = registry.load(&blob).unwrap();
        let second = registry.load(&blob).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &registry.materialize(sig.as_str()).unwrap()));
        assert_eq!(first.name(), format!("I{}", sig));
    }

    #[test]
    fn test_materialize_unknown_is_not_found() {
        let registry = SchemaRegistry::in_memory();
        let err = registry.materialize("0123456789abcdef0123456789abcdef").unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { .. }));

        let placeholder = registry
            .materialize_or_placeholder("0123456789abcdef0123456789abcdef")
            .unwrap();
        assert!(placeholder.read().is_empty());
        assert!(registry.cache().is_empty());
    }

    #[test]
    fn test_placeholder_only_covers_missing_blobs() {
        let registry = SchemaRegistry::in_memory();
        let sig = registry.add(titled("hi")).unwrap();
        let archive = format!(r#"{{"signature":"{}","blob":"<garbage>"}}"#, sig);
        registry.restore(archive.as_bytes()).unwrap();

        let err = registry.materialize_or_placeholder(sig.as_str()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefinition(_)));
    }

    #[test]
    fn test_restore_evicts_records_written_before_a_bad_line() {
        let registry = SchemaRegistry::in_memory();
        let sig = registry.add(titled("hi")).unwrap();
        let cached = registry.materialize(sig.as_str()).unwrap();

        let blob = r#"{"fields":[]}"#;
        let archive = format!(
            "{}\nnot json\n",
            serde_json::json!({ "signature": sig.as_str(), "blob": blob })
        );
        let err = registry.restore(archive.as_bytes()).unwrap_err();
        assert!(matches!(err, SchemaError::Archive { line: 2, .. }));

        assert!(!registry.cache().contains(sig.as_str()));
        let reloaded = registry.materialize(sig.as_str()).unwrap();
        assert!(!Arc::ptr_eq(&cached, &reloaded));
        assert!(reloaded.read().is_empty());
    }

    struct PrettyCodec;

    impl SchemaCodec for PrettyCodec {
        fn encode(&self, definition: &SchemaDefinition) -> Result<String> {
            Ok(serde_json::to_string_pretty(definition)?)
        }

        fn decode(&self, blob: &str) -> Result<SchemaDefinition> {
            JsonCodec.decode(blob)
        }
    }

    #[test]
    fn test_with_codec_requires_the_default_blob() {
        let err = SchemaRegistry::in_memory().with_codec(PrettyCodec).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefinition(_)));

        let registry = SchemaRegistry::in_memory().with_codec(JsonCodec).unwrap();
        assert!(registry.default_schema().unwrap().read().is_empty());
    }

    #[test]
    fn test_add_loaded_retains_object() {
        let registry = SchemaRegistry::in_memory();
        let sig = registry.add(titled("hi")).unwrap();
        let obj = registry.materialize(sig.as_str()).unwrap();

        obj.update(|d| d.set_field(FieldDefinition::new("body", FieldType::Text)));
        let new_sig = registry.add(&obj).unwrap();

        assert_ne!(sig, new_sig);
        assert_eq!(registry.provenance(new_sig.as_str()), Some(Provenance::Retained));
        assert!(Arc::ptr_eq(&obj, &registry.materialize(new_sig.as_str()).unwrap()));
        assert!(!registry.cache().contains(sig.as_str()));

        // the original signature still materializes its stored content
        let original = registry.materialize(sig.as_str()).unwrap();
        assert!(!Arc::ptr_eq(&obj, &original));
        assert_eq!(original.read().field_names(), vec!["title"]);
    }

    #[test]
    fn test_add_default_equivalent_object_is_not_retained() {
        let registry = SchemaRegistry::in_memory();
        let obj = Arc::new(LoadedSchema::new(
            Signature::from_blob("x"),
            SchemaDefinition::new(),
        ));
        let sig = registry.add(&obj).unwrap();
        assert!(sig.is_default());
        assert!(!registry.cache().contains(sig.as_str()));
    }

    #[test]
    fn test_remove_evicts_cache() {
        let registry = SchemaRegistry::in_memory();
        let sig = registry.add(titled("hi")).unwrap();
        registry.materialize(sig.as_str()).unwrap();
        registry.remove(sig.as_str()).unwrap();
        assert!(!registry.contains(sig.as_str()).unwrap());
        assert!(!registry.cache().contains(sig.as_str()));

        let err = registry.remove(DEFAULT_SIGNATURE.as_str()).unwrap_err();
        assert!(matches!(err, SchemaError::ProtectedSignature(_)));
    }

    #[test]
    fn test_reference_signature_and_storage() {
        let registry = SchemaRegistry::in_memory()
            .with_resolver(StaticResolver::new().with("app.schemas.Note", titled("note")));

        let input = SchemaInput::Reference("app.schemas.Note".to_string());
        let sig = registry.signature(&input, true).unwrap();
        assert_eq!(sig.as_str(), "app.schemas.Note");

        assert_eq!(registry.add(input).unwrap(), sig);
        let stored = registry.get("app.schemas.Note").unwrap().unwrap();
        assert_eq!(registry.codec().decode(&stored).unwrap().field_names(), vec!["title"]);

        let schema = registry.materialize("app.schemas.Note").unwrap();
        assert_eq!(schema.read().identifier.as_deref(), Some("app.schemas.Note"));
    }

    #[test]
    fn test_unknown_reference_is_unresolvable() {
        let registry = SchemaRegistry::in_memory();
        let err = registry
            .add(SchemaInput::Reference("app.schemas.Missing".to_string()))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvableSchema(_)));

        let unnamed = SchemaInput::from(titled("hi"));
        assert!(matches!(
            registry.signature(&unnamed, true),
            Err(SchemaError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_preload_materializes_everything() {
        let registry = SchemaRegistry::in_memory();
        registry.add(titled("a")).unwrap();
        registry.add(titled("b")).unwrap();
        assert_eq!(registry.preload().unwrap(), 3);
        assert_eq!(registry.cache_stats().derived, 3);
    }
}
