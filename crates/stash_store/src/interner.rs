//! Per-section field-name interning.
//!
//! Each section keeps an ordered set of field names; a name's 1-based
//! position in that set is its field id. The first allocation of a name also
//! persists it at `(section, 0, id)` in the value map and ordered index so
//! snapshots capture it. Both lookup directions coalesce concurrent callers
//! through single-flight, so racing first-inserts of one (section, name)
//! allocate exactly one id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StashError;
use crate::key::{FieldId, SectionId, SyntheticKey, METADATA_RECORD_ID};
use crate::rbtree::OrderedIndex;
use crate::single_flight::SingleFlight;
use crate::value_map::{Slot, ValueMap};

pub struct FieldInterner {
    index: Arc<OrderedIndex>,
    map: Arc<ValueMap>,
    table: Mutex<HashMap<SectionId, HashMap<String, FieldId>>>,
    id_flight: SingleFlight<String, FieldId>,
    name_flight: SingleFlight<String, Result<String, StashError>>,
}

impl FieldInterner {
    pub fn new(index: Arc<OrderedIndex>, map: Arc<ValueMap>) -> Self {
        FieldInterner {
            index,
            map,
            table: Mutex::new(HashMap::new()),
            id_flight: SingleFlight::new(),
            name_flight: SingleFlight::new(),
        }
    }

    /// Field id for `name` in `section`, allocating the next dense id when
    /// the name is new.
    pub fn field_id(&self, section: SectionId, name: &str) -> FieldId {
        let flight_key = format!("{section}-{name}");
        self.id_flight.run(flight_key, || {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            let fields = table.entry(section).or_default();
            if let Some(&fid) = fields.get(name) {
                return fid;
            }
            let fid = (fields.len() + 1) as FieldId;
            let key = SyntheticKey::new(section, METADATA_RECORD_ID, fid);
            self.map.store(key, Slot::Name(name.to_string()));
            self.index.put(key);
            fields.insert(name.to_string(), fid);
            fid
        })
    }

    /// Name interned under `id` in `section`, or `FieldNotFound`.
    pub fn field_name(&self, section: SectionId, id: FieldId) -> Result<String, StashError> {
        let flight_key = format!("{section}-{id}");
        self.name_flight.run(flight_key, || {
            let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(fields) = table.get(&section) else {
                return Err(StashError::FieldNotFound);
            };
            fields
                .iter()
                .find(|(_, &fid)| fid == id)
                .map(|(name, _)| name.clone())
                .ok_or(StashError::FieldNotFound)
        })
    }

    /// Repopulate the table from a scanned name row. Restore path only; the
    /// row is already present in the value map and index.
    pub(crate) fn restore_name(&self, section: SectionId, id: FieldId, name: String) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(section).or_default().insert(name, id);
    }
}
