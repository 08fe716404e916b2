//! Capability tagging
//!
//! An entity "provides" a schema when it carries that schema's capability.
//! Capabilities are plain names; the ones derived from a signature are
//! `I<signature>`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::signature::Signature;

/// Capability every signed entity provides regardless of its schema
pub const SIGNED_ENTITY_CAPABILITY: &str = "ISchemaSignedEntity";

/// A named capability
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The capability provided by entities signed with `signature`
    pub fn for_signature(signature: &Signature) -> Self {
        Self(signature.capability_name())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// The signature this capability was derived from, if any
    pub fn signature(&self) -> Option<Signature> {
        if self.0 == SIGNED_ENTITY_CAPABILITY {
            return None;
        }
        Signature::from_capability_name(&self.0)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attach, detach and query capabilities on an instance
pub trait Capabilities {
    /// Returns true if the capability was newly attached
    fn tag(&mut self, capability: Capability) -> bool;

    /// Returns true if the capability was attached before
    fn untag(&mut self, capability: &Capability) -> bool;

    fn query(&self) -> BTreeSet<Capability>;

    fn provides(&self, capability: &Capability) -> bool {
        self.query().contains(capability)
    }
}

/// Set of capabilities directly attached to one instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    tags: BTreeSet<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.tags.iter()
    }
}

impl Capabilities for CapabilitySet {
    fn tag(&mut self, capability: Capability) -> bool {
        self.tags.insert(capability)
    }

    fn untag(&mut self, capability: &Capability) -> bool {
        self.tags.remove(capability)
    }

    fn query(&self) -> BTreeSet<Capability> {
        self.tags.clone()
    }

    fn provides(&self, capability: &Capability) -> bool {
        self.tags.contains(capability)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().collect(),
        }
    }
}
