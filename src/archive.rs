//! Export and import of the whole store
//!
//! The archive is JSON lines, one `{"signature": .., "blob": ..}` record per
//! entry. Restoring trusts the archived signature, so entries stored under a
//! reference name come back under that same name.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, SchemaError};
use crate::signature::Signature;
use crate::store::SchemaStore;

/// One archived store entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub signature: Signature,
    pub blob: String,
}

/// Write every store entry, returning the number of records written
pub fn dump(store: &SchemaStore, writer: impl Write) -> Result<usize> {
    let mut writer = BufWriter::new(writer);
    let mut count = 0;
    for (signature, blob) in store.items()? {
        serde_json::to_writer(&mut writer, &ArchiveRecord { signature, blob })?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    info!(records = count, "dumped schema archive");
    Ok(count)
}

/// Upsert every archived record, returning how many were written
///
/// `on_write` runs after each record reaches the store, including the records
/// written before a malformed line aborts the restore. The default schema is
/// never replaced; its record, if present, is skipped.
pub fn restore(
    store: &SchemaStore,
    reader: impl BufRead,
    mut on_write: impl FnMut(&Signature),
) -> Result<usize> {
    let mut count = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ArchiveRecord =
            serde_json::from_str(&line).map_err(|e| SchemaError::Archive {
                line: index + 1,
                message: e.to_string(),
            })?;
        if record.signature.is_default() {
            debug!("skipping archived default schema");
            continue;
        }
        store.put_unchecked(&record.signature, &record.blob)?;
        on_write(&record.signature);
        count += 1;
    }
    info!(records = count, "restored schema archive");
    Ok(count)
}

/// Dump into a file at `path`, replacing it
pub fn dump_to_path(store: &SchemaStore, path: impl AsRef<Path>) -> Result<usize> {
    dump(store, File::create(path)?)
}

/// Restore from the file at `path`
pub fn restore_from_path(
    store: &SchemaStore,
    path: impl AsRef<Path>,
    on_write: impl FnMut(&Signature),
) -> Result<usize> {
    restore(store, BufReader::new(File::open(path)?), on_write)
}
