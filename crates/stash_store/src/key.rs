//! The synthetic key: a 16-byte packed (section, record, field) triple.
//!
//! All digits are stored big-endian, so the derived lexicographic order on
//! the raw bytes equals tuple order on (section, record, field). An in-order
//! walk of the index starting at any `(section, record, 0)` therefore visits
//! exactly that record's fields in field-id order before crossing into the
//! next record or section.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level namespace for records. Data sections are 1..=254; 0 holds the
/// per-section system rows and 255 is reserved as an error sentinel.
pub type SectionId = u8;
/// Per-section monotonic row-set id. Advances on update.
pub type RecordId = u64;
/// Per-section dense id interned from a field name.
pub type FieldId = u16;

pub const KEY_LENGTH: usize = 16;

/// Record id 0 carries the per-section system rows.
pub const METADATA_RECORD_ID: RecordId = 0;
/// Field id 0 at record 0 is the per-section record-id counter.
pub const COUNTER_FIELD_ID: FieldId = 0;
/// Field id 0 at record >= 1 is the record header.
pub const HEADER_FIELD_ID: FieldId = 0;

/// The synthetic unique key.
///
/// Layout: `[0]` section, `[1..9]` record id (u64 BE), `[9..11]` field id
/// (u16 BE), `[11..16]` reserved zero.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyntheticKey([u8; KEY_LENGTH]);

impl SyntheticKey {
    pub fn new(section: SectionId, record: RecordId, field: FieldId) -> Self {
        let mut k = [0u8; KEY_LENGTH];
        k[0] = section;
        k[1..9].copy_from_slice(&record.to_be_bytes());
        k[9..11].copy_from_slice(&field.to_be_bytes());
        SyntheticKey(k)
    }

    pub fn section(&self) -> SectionId {
        self.0[0]
    }

    pub fn record(&self) -> RecordId {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.0[1..9]);
        u64::from_be_bytes(b)
    }

    pub fn field(&self) -> FieldId {
        u16::from_be_bytes([self.0[9], self.0[10]])
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Display for SyntheticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x} {:016x} {:04x}",
            self.section(),
            self.record(),
            self.field()
        )
    }
}

impl fmt::Debug for SyntheticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntheticKey({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_follows_tuple_order() {
        let k0 = SyntheticKey::new(0, 0, 0);
        let k1 = SyntheticKey::new(0, 0, 1);
        let k2 = SyntheticKey::new(0, 1, 0);
        let k3 = SyntheticKey::new(0, 1, 1);
        let k4 = SyntheticKey::new(1, 0, 0);
        let k5 = SyntheticKey::new(1, 0, 1);
        let k6 = SyntheticKey::new(1, 1, 0);

        assert!(k0 < k1);
        assert!(k1 < k2);
        assert!(k2 < k3);
        assert!(k3 < k4);
        assert!(k4 < k5);
        assert!(k5 < k6);
        assert!(k6 > k1);
        assert!(k4 > k0);
        assert_eq!(k4, k4);
    }

    #[test]
    fn accessors_round_trip() {
        let key = SyntheticKey::new(17, 0x0102_0304_0506_0708, 0x0a0b);
        assert_eq!(key.section(), 17);
        assert_eq!(key.record(), 0x0102_0304_0506_0708);
        assert_eq!(key.field(), 0x0a0b);
        assert_eq!(key.as_bytes()[11..], [0u8; 5]);
    }

    #[test]
    fn lexicographic_order_equals_tuple_order() {
        let triples = [
            (0u8, 0u64, 0u16),
            (0, 0, 1),
            (0, 1, 0),
            (1, 0, 0),
            (1, 0, 65535),
            (1, u64::MAX, 0),
            (2, 0, 0),
            (254, 7, 3),
            (255, u64::MAX, u16::MAX),
        ];
        for &a in &triples {
            for &b in &triples {
                let ka = SyntheticKey::new(a.0, a.1, a.2);
                let kb = SyntheticKey::new(b.0, b.1, b.2);
                assert_eq!(ka.cmp(&kb), a.cmp(&b), "triples {a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn hex_rendering() {
        let key = SyntheticKey::new(1, 42, 3);
        assert_eq!(key.to_string(), "01 000000000000002a 0003");
    }
}
