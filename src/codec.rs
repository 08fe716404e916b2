//! Canonical text encoding of schema definitions

use crate::error::{Result, SchemaError};
use crate::schema::SchemaDefinition;

/// Canonical blob of the empty base schema
pub const DEFAULT_SCHEMA_BLOB: &str = r#"{"fields":[]}"#;

/// Turns definitions into canonical blobs and back
///
/// `encode` must be deterministic: equal definitions always produce
/// byte-identical text, which is what content signatures are computed over.
/// The empty schema must encode to [`DEFAULT_SCHEMA_BLOB`], since the default
/// signature is fixed to that blob's digest.
pub trait SchemaCodec: Send + Sync {
    fn encode(&self, definition: &SchemaDefinition) -> Result<String>;

    fn decode(&self, blob: &str) -> Result<SchemaDefinition>;

    /// Normalize any accepted blob to its canonical form
    fn canonicalize(&self, blob: &str) -> Result<String> {
        self.encode(&self.decode(blob)?)
    }
}

/// Compact JSON codec
///
/// Fields keep their declaration order; default values that are objects are
/// emitted with sorted keys, so output never depends on insertion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl SchemaCodec for JsonCodec {
    fn encode(&self, definition: &SchemaDefinition) -> Result<String> {
        definition.validate()?;
        Ok(serde_json::to_string(definition)?)
    }

    fn decode(&self, blob: &str) -> Result<SchemaDefinition> {
        let blob = blob.trim();
        if blob.is_empty() {
            return Ok(SchemaDefinition::default());
        }
        let definition: SchemaDefinition = serde_json::from_str(blob).map_err(|e| {
            SchemaError::InvalidDefinition(format!("could not parse schema blob: {}", e))
        })?;
        definition.validate()?;
        Ok(definition)
    }
}
