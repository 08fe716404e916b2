//! Configuration for the signed schema store
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-store.toml)
//! - Environment variables (SCHEMA_STORE__*)
//!
//! ## Example config file (schema-store.toml):
//! ```toml
//! [store]
//! backend = "file"
//! path = "./var/schemas.json"
//! verify_on_open = true
//!
//! [cache]
//! preload = false
//!
//! [archive]
//! path = "./var/schemas.jsonl"
//!
//! [[references]]
//! name = "app.schemas.Contact"
//! path = "./schemas/contact.json"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaStoreConfig {
    /// Durable store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Materialization cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Import/export settings
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Schemas resolvable by reference name
    #[serde(default)]
    pub references: Vec<ReferenceConfig>,
}

/// Which substrate backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[default]
    File,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Path of the schema document for the file backend
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Check every content entry against its signature when opening
    #[serde(default = "default_true")]
    pub verify_on_open: bool,
}

/// Cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Materialize every stored schema when opening
    #[serde(default)]
    pub preload: bool,
}

/// Archive configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Default archive location for dump/restore
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// A schema definition file known under a dotted reference name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub name: String,
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("schemas.json")
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            path: default_store_path(),
            verify_on_open: true,
        }
    }
}

impl SchemaStoreConfig {
    /// Configuration for a throwaway in-memory store
    pub fn in_memory() -> Self {
        Self {
            store: StoreConfig {
                backend: BackendKind::Memory,
                ..StoreConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a required file if given
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "schema-store.toml",
            ".schema-store.toml",
            "config/schema-store.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "schema-store") {
            let xdg_config = config_dir.config_dir().join("schema-store.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("SCHEMA_STORE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Store path, resolved against the working directory if relative
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.store.path)
        }
    }
}
