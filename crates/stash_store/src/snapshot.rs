//! Snapshot file codec: the whole value map dumped as one checksummed
//! record.
//!
//! The payload is a self-describing JSON list of `(key, value)` pairs, with
//! the per-section counters flattened to their raw integers. The file frame
//! is `[len u32 BE][crc32 BE][payload]`; writes go to a sibling temp file
//! that is renamed over the snapshot once synced, so readers never observe a
//! torn file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::StashError;
use crate::key::SyntheticKey;
use crate::record::{FieldValue, RecordHeader};
use crate::value_map::Slot;

/// Serialized form of a [`Slot`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotValue {
    Counter(u64),
    Name(String),
    Header(RecordHeader),
    Field(FieldValue),
}

impl SnapshotValue {
    pub fn from_slot(slot: &Slot) -> Self {
        match slot {
            Slot::Counter(c) => SnapshotValue::Counter(c.load(Ordering::SeqCst)),
            Slot::Name(name) => SnapshotValue::Name(name.clone()),
            Slot::Header(header) => SnapshotValue::Header(header.clone()),
            Slot::Field(value) => SnapshotValue::Field(value.clone()),
        }
    }

    /// Rebuild the in-memory slot; counters are rewrapped as shared atomics.
    pub fn into_slot(self) -> Slot {
        match self {
            SnapshotValue::Counter(v) => Slot::Counter(Arc::new(AtomicU64::new(v))),
            SnapshotValue::Name(name) => Slot::Name(name),
            SnapshotValue::Header(header) => Slot::Header(header),
            SnapshotValue::Field(value) => Slot::Field(value),
        }
    }
}

pub type SnapshotEntries = Vec<(SyntheticKey, SnapshotValue)>;

/// Serialize `entries` and atomically replace the file at `path`.
pub fn write_snapshot(path: &Path, entries: &SnapshotEntries) -> Result<(), StashError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let payload = serde_json::to_vec(entries)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StashError::SnapshotIo("snapshot payload exceeds frame size".to_string()))?;
    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let checksum = hasher.finalize();

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp_path)?;
    file.write_all(&len.to_be_bytes())?;
    file.write_all(&checksum.to_be_bytes())?;
    file.write_all(&payload)?;
    file.flush()?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Read the snapshot at `path`. A missing file is a clean empty start and
/// yields `None`; a torn or corrupt file is `SnapshotIo`.
pub fn read_snapshot(path: &Path) -> Result<Option<SnapshotEntries>, StashError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut reader = BufReader::new(file);

    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut crc_buf = [0u8; 4];
    reader.read_exact(&mut crc_buf)?;
    let expected_crc = u32::from_be_bytes(crc_buf);

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let mut hasher = Hasher::new();
    hasher.update(&payload);
    if hasher.finalize() != expected_crc {
        return Err(StashError::SnapshotIo(
            "snapshot checksum mismatch".to_string(),
        ));
    }

    let entries = serde_json::from_slice(&payload)?;
    Ok(Some(entries))
}
