//! Schema signatures
//!
//! A signature is the key a schema is stored and materialized under. It comes
//! in two forms:
//!
//! - **content signatures**: the first 128 bits of the SHA-256 digest of a
//!   canonical blob (trimmed of surrounding whitespace), as 32 lowercase hex
//!   characters;
//! - **reference signatures**: a dotted path (`app.schemas.Contact`) naming a
//!   schema defined outside the dynamic store.

use std::borrow::Borrow;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::DEFAULT_SCHEMA_BLOB;
use crate::error::{Result, SchemaError};

/// Length in hex characters of a content signature
pub const SIGNATURE_LEN: usize = 32;

/// Prefix of the capability name derived from a signature
const CAPABILITY_PREFIX: char = 'I';

static DOTTED_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$").expect("valid regex")
});

/// Signature of the empty base schema, always present in a store
pub static DEFAULT_SIGNATURE: Lazy<Signature> =
    Lazy::new(|| Signature::from_blob(DEFAULT_SCHEMA_BLOB));

/// Key identifying a stored schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    /// Compute the content signature of a canonical blob
    pub fn from_blob(blob: &str) -> Self {
        let digest = Sha256::digest(blob.trim().as_bytes());
        Self(hex::encode(&digest[..SIGNATURE_LEN / 2]))
    }

    /// Wrap a stable dotted name as a reference signature
    pub fn reference(name: &str) -> Result<Self> {
        let name = name.trim();
        if !DOTTED_PATH.is_match(name) {
            return Err(SchemaError::InvalidDefinition(format!(
                "reference name '{}' is not a dotted path",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// The default (empty) schema signature
    pub fn default_signature() -> Self {
        DEFAULT_SIGNATURE.clone()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        *self == *DEFAULT_SIGNATURE
    }

    /// Whether this looks like a content digest rather than a reference name
    pub fn is_content(&self) -> bool {
        self.0.len() == SIGNATURE_LEN
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// Verify that a blob hashes to this signature
    ///
    /// Reference signatures never verify; they are not derived from content.
    pub fn verify(&self, blob: &str) -> bool {
        self.is_content() && Self::from_blob(blob) == *self
    }

    /// Name of the capability an entity signed with this signature provides
    pub fn capability_name(&self) -> String {
        format!("{}{}", CAPABILITY_PREFIX, self.0)
    }

    /// Recover a signature from a capability name (`I<signature>`)
    pub fn from_capability_name(name: &str) -> Option<Self> {
        name.strip_prefix(CAPABILITY_PREFIX)
            .filter(|rest| !rest.is_empty())
            .map(|rest| Self(rest.to_string()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Signature {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Signature {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Signature {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Signature {
    fn borrow(&self) -> &str {
        &self.0
    }
}
