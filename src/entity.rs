//! Schema-signed entities
//!
//! An entity starts unsigned and becomes signed by submitting a schema. Signing
//! stores the schema if needed, fills in field defaults, tags the entity with
//! the schema's capability and records the signature. The protocol is
//! all-or-nothing: every fallible step runs before the entity is touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::cache::LoadedSchema;
use crate::capability::{Capabilities, Capability, CapabilitySet, SIGNED_ENTITY_CAPABILITY};
use crate::error::{Result, SchemaError};
use crate::registry::{SchemaInput, SchemaRegistry};
use crate::signature::{Signature, DEFAULT_SIGNATURE};

/// An object whose schema is chosen at runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEntity {
    record_uid: Uuid,
    #[serde(default)]
    signature: Option<Signature>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    modified: DateTime<Utc>,
    #[serde(skip)]
    capabilities: CapabilitySet,
}

impl Default for SignedEntity {
    fn default() -> Self {
        Self::new()
    }
}

impl SignedEntity {
    /// A new unsigned entity with a random record id
    pub fn new() -> Self {
        Self::with_uid(Uuid::new_v4())
    }

    pub fn with_uid(record_uid: Uuid) -> Self {
        Self {
            record_uid,
            signature: None,
            attributes: BTreeMap::new(),
            modified: Utc::now(),
            capabilities: CapabilitySet::from_iter([Capability::new(SIGNED_ENTITY_CAPABILITY)]),
        }
    }

    /// A new entity signed with its context's schema
    pub fn in_context(registry: &SchemaRegistry, schema: impl Into<SchemaInput>) -> Result<Self> {
        let mut entity = Self::new();
        entity.sign(registry, schema, false)?;
        Ok(entity)
    }

    pub fn record_uid(&self) -> Uuid {
        self.record_uid
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Directly set attribute value
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
        self.modified = Utc::now();
    }

    /// Sign the entity with a schema
    ///
    /// In content mode the schema is stored if its signature is new. In
    /// reference mode the schema's stable name is the signature and its
    /// definition comes from the registry's resolver. Re-signing replaces
    /// the previous signature and capability; attributes already set are
    /// kept.
    pub fn sign(
        &mut self,
        registry: &SchemaRegistry,
        schema: impl Into<SchemaInput>,
        use_reference: bool,
    ) -> Result<Signature> {
        let input = schema.into();
        let signature = registry.signature(&input, use_reference)?;

        let loaded = if use_reference || !signature.is_content() {
            registry.materialize_reference(&signature)?
        } else {
            if !registry.contains(signature.as_str())? {
                registry.add(input)?;
            }
            registry.materialize(signature.as_str())?
        };

        let defaults: Vec<(String, Value)> = loaded
            .read()
            .defaults()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();

        for (name, value) in defaults {
            self.attributes.entry(name).or_insert(value);
        }
        if let Some(previous) = self.signature.take() {
            self.capabilities.untag(&Capability::for_signature(&previous));
        }
        self.capabilities.tag(Capability::for_signature(&signature));
        self.signature = Some(signature.clone());
        self.modified = Utc::now();

        debug!(record_uid = %self.record_uid, %signature, "signed entity");
        Ok(signature)
    }

    /// The entity's schema; the default schema when unsigned or when its
    /// signature is no longer stored
    ///
    /// A stored blob that fails to decode is an error, not a fallback.
    pub fn schema(&self, registry: &SchemaRegistry) -> Result<Arc<LoadedSchema>> {
        match &self.signature {
            Some(signature) => match registry.materialize(signature.as_str()) {
                Err(SchemaError::NotFound { .. }) => registry.default_schema(),
                other => other,
            },
            None => registry.default_schema(),
        }
    }

    /// Attribute value, falling back to the schema field's default
    pub fn get(&self, name: &str, registry: &SchemaRegistry) -> Result<Option<Value>> {
        if let Some(value) = self.attributes.get(name) {
            return Ok(Some(value.clone()));
        }
        let schema = self.schema(registry)?;
        let definition = schema.read();
        Ok(definition.field(name).and_then(|f| f.default.clone()))
    }

    /// Capabilities provided right now, derived from the signature
    ///
    /// Unlike [`Capabilities::query`], this consults the registry on every
    /// call, so an entity deserialized without its transient tags still
    /// reports the schema it is signed with.
    pub fn provided(&self, registry: &SchemaRegistry) -> Result<BTreeSet<Capability>> {
        let mut provided = self.capabilities.query();
        provided.insert(Capability::new(SIGNED_ENTITY_CAPABILITY));
        if let Some(signature) = &self.signature {
            provided.insert(registry.materialize_or_placeholder(signature.as_str())?.capability());
        }
        Ok(provided)
    }

    /// Re-attach the transient capability tags after deserialization
    pub fn reattach(&mut self) {
        self.capabilities.tag(Capability::new(SIGNED_ENTITY_CAPABILITY));
        if let Some(signature) = &self.signature {
            self.capabilities.tag(Capability::for_signature(signature));
        }
    }

    /// Whether this entity uses the default schema
    pub fn has_default_schema(&self) -> bool {
        self.signature.as_ref().map_or(true, |s| *s == *DEFAULT_SIGNATURE)
    }
}

impl Capabilities for SignedEntity {
    fn tag(&mut self, capability: Capability) -> bool {
        self.capabilities.tag(capability)
    }

    fn untag(&mut self, capability: &Capability) -> bool {
        self.capabilities.untag(capability)
    }

    fn query(&self) -> BTreeSet<Capability> {
        self.capabilities.query()
    }
}
