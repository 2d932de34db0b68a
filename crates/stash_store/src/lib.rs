//! In-memory, thread-safe NoSQL record stash.
//!
//! A record is an unordered collection of named typed fields identified by a
//! caller-opaque GUID, living under a caller-supplied numeric section. Every
//! row is addressed by a 16-byte packed synthetic key whose byte order equals
//! tuple order on (section, record, field), so the concurrent red-black index
//! can walk one record's fields with a single in-order scan.
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`key`] | packed synthetic key |
//! | [`rbtree`] | concurrent ordered key index |
//! | [`value_map`] | sharded key-to-slot store |
//! | [`single_flight`] | per-key request coalescing |
//! | [`interner`] | per-section field-name interning |
//! | [`directory`] | GUID-to-header-key directory |
//! | [`stash`] | the engine: insert/get/update/replace/remove/find |
//! | [`snapshot`] | checksummed whole-map dump and restore |
//! | [`saver`] | periodic background saving |
//! | [`config`] | flag/env configuration |
//! | [`error`] | failure taxonomy |

pub mod config;
pub mod directory;
pub mod error;
pub mod interner;
pub mod key;
pub mod rbtree;
pub mod record;
pub mod saver;
pub mod single_flight;
pub mod snapshot;
pub mod stash;
pub mod value_map;

pub use config::Config;
pub use error::StashError;
pub use key::{FieldId, RecordId, SectionId, SyntheticKey};
pub use record::{FieldValue, Guid, Operation, Record, RecordHeader};
pub use saver::{CancelFlag, PeriodicSaver};
pub use stash::Stash;
