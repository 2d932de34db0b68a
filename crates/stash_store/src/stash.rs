//! The stash engine: Insert/Get/Update/Replace/Remove/Find over the ordered
//! index, value map, interner, and record directory, plus the snapshot
//! copy/save/restore paths.
//!
//! An engine-level reader/writer lock serializes reads against writes:
//! mutation paths take it exclusively, read paths share it. This is
//! deliberately coarse; the component locks underneath stay fine-grained.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::directory::RecordDirectory;
use crate::error::StashError;
use crate::interner::FieldInterner;
use crate::key::{
    RecordId, SectionId, SyntheticKey, COUNTER_FIELD_ID, HEADER_FIELD_ID, METADATA_RECORD_ID,
};
use crate::rbtree::OrderedIndex;
use crate::record::{unix_time_ms, FieldValue, Guid, Operation, Record, RecordHeader};
use crate::saver::CancelFlag;
use crate::snapshot::{self, SnapshotEntries, SnapshotValue};
use crate::value_map::{Slot, ValueMap};

/// The in-memory NoSQL key-value thread-safe stash.
///
/// Records are unordered collections of named typed fields addressed by a
/// caller-opaque GUID; physically every row lives under a synthetic
/// (section, record, field) key in the ordered index and value map.
pub struct Stash {
    index: Arc<OrderedIndex>,
    map: Arc<ValueMap>,
    interner: FieldInterner,
    directory: RecordDirectory,
    gate: RwLock<()>,
    store_file: PathBuf,
}

impl Stash {
    /// Build an engine, restoring the snapshot file when the config asks
    /// for it. A missing file is a clean empty start; a corrupt one aborts
    /// startup.
    pub fn new(config: &Config) -> Result<Self, StashError> {
        let index = Arc::new(OrderedIndex::new());
        let map = Arc::new(ValueMap::new());
        let interner = FieldInterner::new(Arc::clone(&index), Arc::clone(&map));
        let stash = Stash {
            index,
            map,
            interner,
            directory: RecordDirectory::new(),
            gate: RwLock::new(()),
            store_file: config.store_file.clone(),
        };
        if config.restore {
            stash.restore_from_disk()?;
        }
        Ok(stash)
    }

    /// Insert a record into `section` and return its GUID.
    pub fn insert(
        &self,
        section: SectionId,
        fields: HashMap<String, FieldValue>,
    ) -> Result<Guid, StashError> {
        check_section(section)?;
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);

        let (guid, record) = self.put_header(section, RecordHeader::new(Operation::Insert))?;
        self.put_fields(section, record, fields);

        debug!(guid = %guid, section, record, "insert");
        Ok(guid)
    }

    /// Current field set of the record behind `guid`.
    pub fn get(&self, guid: &str) -> Result<HashMap<String, FieldValue>, StashError> {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        self.get_inner(guid)
    }

    /// Install a new version of the record behind `guid` holding exactly
    /// `fields`. The previous version's rows stay in the index but become
    /// unreachable through the directory.
    pub fn update(
        &self,
        guid: &str,
        fields: HashMap<String, FieldValue>,
    ) -> Result<(), StashError> {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        self.update_inner(guid, fields)
    }

    /// Full-overwrite alias of [`Stash::update`]: the engine writes exactly
    /// the supplied fields either way, so replacement and extension
    /// coincide.
    pub fn replace(
        &self,
        guid: &str,
        fields: HashMap<String, FieldValue>,
    ) -> Result<(), StashError> {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        self.update_inner(guid, fields)
    }

    /// Remove the record behind `guid`. Terminal: later gets and updates
    /// miss, and a repeated remove misses too.
    pub fn remove(&self, guid: &str) -> Result<(), StashError> {
        let _gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);

        let key = self.directory.remove(guid)?;
        let Some(mut header) = self.load_header(key)? else {
            return Err(StashError::CorruptState(format!(
                "directory pointed at {key} but no header is stored there"
            )));
        };
        header.deleted = true;
        header.op_time_ms = unix_time_ms();
        self.map.store(key, Slot::Header(header));

        debug!(guid, key = %key, "remove");
        Ok(())
    }

    /// Scan the live records of `section`, applying `predicate` to each
    /// field set; it returns (include, stop). Scan order is unspecified.
    /// The cancel flag is advisory and checked once per record.
    pub fn find<F>(
        &self,
        section: SectionId,
        cancel: &CancelFlag,
        mut predicate: F,
    ) -> Result<Vec<Record>, StashError>
    where
        F: FnMut(&HashMap<String, FieldValue>) -> (bool, bool),
    {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);

        let mut found = Vec::new();
        for (guid, key) in self.directory.live_entries() {
            if key.section() != section {
                continue;
            }
            if cancel.is_cancelled() {
                break;
            }
            let fields = match self.get_inner(&guid) {
                Ok(fields) => fields,
                Err(StashError::RecordNotFound) => {
                    warn!(guid = %guid, "record vanished during find");
                    continue;
                }
                Err(err) => return Err(err),
            };
            let (include, stop) = predicate(&fields);
            if include {
                found.push(Record { guid, fields });
            }
            if stop {
                break;
            }
        }
        Ok(found)
    }

    /// Synthetic key of the live header behind `guid`. Diagnostic surface:
    /// the record id advances on every update.
    pub fn record_key(&self, guid: &str) -> Result<SyntheticKey, StashError> {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        self.directory.get(guid)
    }

    /// Copy the value map under shared access and write it to the snapshot
    /// file. A cancelled copy abandons the save without touching the file.
    pub fn save_to_disk(&self, cancel: &CancelFlag) -> Result<(), StashError> {
        let entries = self.copy_data(cancel);
        if cancel.is_cancelled() {
            debug!("snapshot copy cancelled, skipping write");
            return Ok(());
        }
        snapshot::write_snapshot(&self.store_file, &entries)?;
        debug!(entries = entries.len(), file = %self.store_file.display(), "saved snapshot");
        Ok(())
    }

    fn copy_data(&self, cancel: &CancelFlag) -> SnapshotEntries {
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries = Vec::with_capacity(self.map.len());
        self.map.for_each(|key, slot| {
            if cancel.is_cancelled() {
                return false;
            }
            entries.push((*key, SnapshotValue::from_slot(slot)));
            true
        });
        entries
    }

    fn restore_from_disk(&self) -> Result<(), StashError> {
        let Some(entries) = snapshot::read_snapshot(&self.store_file)? else {
            info!(file = %self.store_file.display(), "no snapshot file, starting empty");
            return Ok(());
        };

        for (key, value) in &entries {
            self.map.store(*key, value.clone().into_slot());
            self.index.put(*key);
        }

        // Rebuild the derived structures from the scanned key space.
        let mut records = 0usize;
        let mut names = 0usize;
        for (key, value) in entries {
            if key.record() == METADATA_RECORD_ID {
                if key.field() != COUNTER_FIELD_ID {
                    if let SnapshotValue::Name(name) = value {
                        self.interner.restore_name(key.section(), key.field(), name);
                        names += 1;
                    }
                }
            } else if key.field() == HEADER_FIELD_ID {
                if let SnapshotValue::Header(header) = value {
                    if !header.deleted {
                        self.directory.put(&header.guid, key);
                        records += 1;
                    }
                }
            }
        }

        info!(
            file = %self.store_file.display(),
            records,
            names,
            "restored snapshot"
        );
        Ok(())
    }

    /// Allocate the next record id of `section` through the counter row at
    /// (section, 0, 0).
    fn new_id(&self, section: SectionId) -> Result<RecordId, StashError> {
        let key = SyntheticKey::new(section, METADATA_RECORD_ID, COUNTER_FIELD_ID);
        let (slot, loaded) = self
            .map
            .load_or_store(key, Slot::Counter(Arc::new(AtomicU64::new(1))));
        if !loaded {
            self.index.put(key);
            return Ok(1);
        }
        match slot {
            Slot::Counter(counter) => Ok(counter.fetch_add(1, Ordering::SeqCst) + 1),
            other => Err(StashError::CorruptState(format!(
                "counter row {key} holds {other:?}"
            ))),
        }
    }

    fn put_header(
        &self,
        section: SectionId,
        header: RecordHeader,
    ) -> Result<(Guid, RecordId), StashError> {
        let record = self.new_id(section)?;
        let key = SyntheticKey::new(section, record, HEADER_FIELD_ID);
        let guid = header.guid.clone();
        self.map.store(key, Slot::Header(header));
        self.directory.put(&guid, key);
        self.index.put(key);
        Ok((guid, record))
    }

    fn put_fields(
        &self,
        section: SectionId,
        record: RecordId,
        fields: HashMap<String, FieldValue>,
    ) {
        for (name, value) in fields {
            let fid = self.interner.field_id(section, &name);
            let key = SyntheticKey::new(section, record, fid);
            self.map.store(key, Slot::Field(value));
            self.index.put(key);
        }
    }

    /// Header stored at `key`, or `None` when the coordinate is empty.
    /// A non-header slot at a header coordinate is corrupt state.
    fn load_header(&self, key: SyntheticKey) -> Result<Option<RecordHeader>, StashError> {
        match self.map.load(key) {
            None => Ok(None),
            Some(Slot::Header(header)) => Ok(Some(header)),
            Some(other) => Err(StashError::CorruptState(format!(
                "header row {key} holds {other:?}"
            ))),
        }
    }

    fn update_inner(
        &self,
        guid: &str,
        fields: HashMap<String, FieldValue>,
    ) -> Result<(), StashError> {
        let prev_key = self.directory.get(guid)?;
        let Some(mut prev_header) = self.load_header(prev_key)? else {
            return Err(StashError::RecordNotFound);
        };

        let mut header = RecordHeader::new(Operation::Update);
        header.guid = guid.to_string();
        let section = prev_key.section();
        let (_, record) = self.put_header(section, header)?;
        self.put_fields(section, record, fields);

        prev_header.deleted = true;
        prev_header.next = record;
        prev_header.op_time_ms = unix_time_ms();
        self.map.store(prev_key, Slot::Header(prev_header));

        debug!(guid, prev_key = %prev_key, record, "update");
        Ok(())
    }

    /// Shared walk behind `get` and `find`; the caller holds the engine
    /// gate.
    fn get_inner(&self, guid: &str) -> Result<HashMap<String, FieldValue>, StashError> {
        let anchor = self.directory.get(guid)?;
        let section = anchor.section();
        let record = anchor.record();

        let snap = self.index.snapshot();
        let Some(node) = snap.lookup(anchor) else {
            return Err(StashError::RecordNotFound);
        };

        // Only the ordered walk knows which fields belong to the record;
        // the directory provides the anchor.
        let mut fields = HashMap::new();
        let mut it = snap.iter_at(node);
        while let Some(key) = it.key() {
            if key.section() != section || key.record() != record {
                break;
            }
            if key.field() == HEADER_FIELD_ID {
                it.next();
                continue;
            }
            let name = self.interner.field_name(section, key.field())?;
            let value = match self.map.load(key) {
                Some(Slot::Field(value)) => value,
                Some(other) => {
                    return Err(StashError::CorruptState(format!(
                        "field row {key} holds {other:?}"
                    )))
                }
                None => {
                    return Err(StashError::CorruptState(format!(
                        "indexed key {key} is missing from the value map"
                    )))
                }
            };
            fields.insert(name, value);
            it.next();
        }
        Ok(fields)
    }
}

fn check_section(section: SectionId) -> Result<(), StashError> {
    if section == 0 || section == SectionId::MAX {
        return Err(StashError::InvalidSection);
    }
    Ok(())
}
