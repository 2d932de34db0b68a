//! Record-level data model: headers, field values, and the find result type.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::key::RecordId;

/// Stable, opaque external identifier for a logical record. Survives update.
pub type Guid = String;

/// The operation that produced a record version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Insert,
    Update,
}

/// Per-record metadata row stored at field id 0.
///
/// `next` links a superseded version to its replacement (0 when this version
/// is the head of the chain). `op_time_ms` is carried for observability only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub guid: Guid,
    pub next: RecordId,
    pub operation: Operation,
    pub op_time_ms: u64,
    pub deleted: bool,
}

impl RecordHeader {
    pub fn new(operation: Operation) -> Self {
        RecordHeader {
            guid: Uuid::new_v4().to_string(),
            next: 0,
            operation,
            op_time_ms: unix_time_ms(),
            deleted: false,
        }
    }
}

/// A user field value; the two variants the wire recognizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Str(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

/// A record surfaced by a find scan.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub guid: Guid,
    pub fields: HashMap<String, FieldValue>,
}

/// Wall-clock milliseconds since the unix epoch.
pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
