//! Schema definitions: ordered sets of named, typed fields

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{Result, SchemaError};

static FIELD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

/// Type tag of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Int,
    Float,
    Bool,
    Date,
    Datetime,
    List,
    Object,
}

/// A single named field of a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Value applied to entities that do not set this field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl FieldDefinition {
    /// Create an optional field with no default
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            title: None,
            description: None,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// An ordered set of fields
///
/// Field order is significant: it is preserved by the codec and therefore
/// part of the content signature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    /// Stable dotted name used when signing by reference; not content
    #[serde(skip)]
    pub identifier: Option<String>,
}

impl SchemaDefinition {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty schema known under a stable dotted name
    pub fn named(identifier: impl Into<String>) -> Self {
        Self {
            fields: Vec::new(),
            identifier: Some(identifier.into()),
        }
    }

    /// Builder-style field append
    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a field, replacing any existing field of the same name in place
    pub fn set_field(&mut self, field: FieldDefinition) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Remove a field by name, returning it if present
    pub fn remove_field(&mut self, name: &str) -> Option<FieldDefinition> {
        let index = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(index))
    }

    /// Get a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in declaration order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Fields that carry a default value, in declaration order
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .filter_map(|f| f.default.as_ref().map(|v| (f.name.as_str(), v)))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check that every field descriptor is well formed
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !FIELD_NAME.is_match(&field.name) {
                return Err(SchemaError::InvalidDefinition(format!(
                    "field name '{}' is not an identifier",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::InvalidDefinition(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
        }
        Ok(())
    }
}
