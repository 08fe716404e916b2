//! Schema Store CLI
//!
//! Commands for inspecting and maintaining a signed schema store.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use signed_schemas::config::BackendKind;
use signed_schemas::{SchemaInput, SchemaRegistry, SchemaStoreConfig, DEFAULT_SIGNATURE};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-store")]
#[command(about = "Signature-addressed schema store")]
struct Cli {
    /// Config file (defaults to schema-store.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Path to the schema document, overriding the config
    #[arg(short, long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store with only the default schema
    Init,

    /// Print the signature of a schema file without storing it
    Signature {
        /// Schema definition file (JSON)
        file: PathBuf,
        /// Sign by this dotted reference name instead of content
        #[arg(short, long)]
        reference: Option<String>,
    },

    /// Store a schema file and print its signature
    Add {
        /// Schema definition file (JSON)
        file: PathBuf,
    },

    /// Print the blob stored under a signature
    Get { signature: String },

    /// List stored signatures
    List,

    /// Remove a stored schema
    Remove { signature: String },

    /// Check every content entry against its signature
    Verify,

    /// Write the whole store to an archive
    Dump {
        /// Archive path (defaults to [archive].path)
        output: Option<PathBuf>,
    },

    /// Load entries from an archive
    Restore {
        /// Archive path (defaults to [archive].path)
        input: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = SchemaStoreConfig::load_from(cli.config.as_deref())
        .context("loading configuration")?;
    if let Some(path) = cli.store {
        config.store.backend = BackendKind::File;
        config.store.path = path;
    }
    let registry = SchemaRegistry::open(&config)?;

    match cli.command {
        Commands::Init => {
            println!("📦 Schema store at {:?}", config.store_path());
            println!("✅ Default schema {}", *DEFAULT_SIGNATURE);
        }

        Commands::Signature { file, reference } => {
            let blob = fs::read_to_string(&file)
                .with_context(|| format!("reading {:?}", file))?;
            let signature = match reference {
                Some(name) => {
                    let mut definition = registry.codec().decode(&blob)?;
                    definition.identifier = Some(name);
                    registry.signature(&SchemaInput::Definition(definition), true)?
                }
                None => registry.signature(&SchemaInput::Blob(blob), false)?,
            };
            println!("{}", signature);
        }

        Commands::Add { file } => {
            let blob = fs::read_to_string(&file)
                .with_context(|| format!("reading {:?}", file))?;
            let existed = registry.len()?;
            let signature = registry.add(blob)?;
            if registry.len()? > existed {
                println!("✅ Stored {}", signature);
            } else {
                println!("🔒 Already stored {}", signature);
            }
        }

        Commands::Get { signature } => {
            let blob = registry
                .get(&signature)?
                .ok_or_else(|| anyhow!("Schema '{}' not found", signature))?;
            let definition = registry.codec().decode(&blob)?;
            println!("{}", serde_json::to_string_pretty(&definition)?);
        }

        Commands::List => {
            println!("📚 Stored schemas:");
            for (signature, blob) in registry.items()? {
                let fields = registry
                    .codec()
                    .decode(&blob)
                    .map(|d| d.field_names().join(", "))
                    .unwrap_or_else(|_| "<unreadable>".to_string());
                let marker = if signature.is_default() { " (default)" } else { "" };
                println!("  {}{}  [{}]", signature, marker, fields);
            }
        }

        Commands::Remove { signature } => {
            registry.remove(&signature)?;
            println!("🗑️  Removed {}", signature);
        }

        Commands::Verify => {
            let mismatched = registry.verify()?;
            if mismatched.is_empty() {
                println!("✅ All signatures verified ({} entries)", registry.len()?);
            } else {
                for signature in &mismatched {
                    eprintln!("❌ {} does not match its blob", signature);
                }
                bail!("{} entries failed verification", mismatched.len());
            }
        }

        Commands::Dump { output } => {
            let path = output
                .or_else(|| config.archive.path.clone())
                .ok_or_else(|| anyhow!("no archive path given or configured"))?;
            let count = registry
                .dump_to_path(&path)
                .with_context(|| format!("dumping to {:?}", path))?;
            println!("✅ Dumped {} entries to {:?}", count, path);
        }

        Commands::Restore { input } => {
            let path = input
                .or_else(|| config.archive.path.clone())
                .ok_or_else(|| anyhow!("no archive path given or configured"))?;
            let count = registry
                .restore_from_path(&path)
                .with_context(|| format!("restoring from {:?}", path))?;
            println!("✅ Restored {} entries from {:?}", count, path);
        }
    }

    Ok(())
}
