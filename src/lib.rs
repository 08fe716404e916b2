//! Signed Schemas
//!
//! Runtime schemas for content objects, addressed by the signature of their
//! canonical serialization.
//!
//! ## Features
//!
//! - **Content Addressing**: structurally identical schemas share one signature
//! - **Durable Store**: signature → canonical blob, with a protected default entry
//! - **Identity-Stable Cache**: a signature materializes to the same object until invalidated
//! - **Entity Signing**: entities acquire a schema, its field defaults and its capability
//! - **Archives**: the whole store dumps to and restores from JSON lines
//!
//! ## Architecture
//!
//! ```text
//! SignedEntity::sign
//!       │
//!       ▼
//! SchemaRegistry ──► Signature::from_blob(codec.encode(definition))
//!   │        │
//!   ▼        ▼
//! SchemaStore      MaterializationCache
//! (StoreBackend)   (signature → Arc<LoadedSchema>)
//! ```

pub mod archive;
pub mod cache;
pub mod capability;
pub mod codec;
pub mod config;
pub mod entity;
pub mod error;
pub mod reference;
pub mod registry;
pub mod schema;
pub mod signature;
pub mod store;

pub use cache::{CacheStats, LoadedSchema, MaterializationCache, Provenance};
pub use capability::{Capabilities, Capability, CapabilitySet, SIGNED_ENTITY_CAPABILITY};
pub use codec::{JsonCodec, SchemaCodec, DEFAULT_SCHEMA_BLOB};
pub use config::SchemaStoreConfig;
pub use entity::SignedEntity;
pub use error::{Result, SchemaError};
pub use reference::{ReferenceResolver, StaticResolver};
pub use registry::{SchemaInput, SchemaRegistry};
pub use schema::{FieldDefinition, FieldType, SchemaDefinition};
pub use signature::{Signature, DEFAULT_SIGNATURE};
pub use store::{FileBackend, MemoryBackend, SchemaStore, StoreBackend};
