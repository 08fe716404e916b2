//! Resolution of schemas named by a stable dotted path

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::codec::{JsonCodec, SchemaCodec};
use crate::error::Result;
use crate::schema::SchemaDefinition;

/// Looks up schemas defined outside the dynamic store
pub trait ReferenceResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<SchemaDefinition>;
}

/// Fixed table of named definitions
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    definitions: HashMap<String, SchemaDefinition>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under `name`
    pub fn register(&mut self, name: impl Into<String>, mut definition: SchemaDefinition) {
        let name = name.into();
        definition.identifier = Some(name.clone());
        self.definitions.insert(name, definition);
    }

    pub fn with(mut self, name: impl Into<String>, definition: SchemaDefinition) -> Self {
        self.register(name, definition);
        self
    }

    /// Register a definition read from a JSON file
    pub fn register_file(&mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Result<()> {
        let content = fs::read_to_string(path)?;
        let definition = JsonCodec.decode(&content)?;
        self.register(name, definition);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl ReferenceResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Option<SchemaDefinition> {
        self.definitions.get(name).cloned()
    }
}
