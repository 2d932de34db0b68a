use thiserror::Error;

/// Typed failures surfaced by stash operations.
///
/// The enum is `Clone` so results can be published through the
/// single-flight coalescer to every waiting caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StashError {
    /// Section id outside the valid data range on a write.
    #[error("section must be in [1 ... 254]")]
    InvalidSection,

    /// Directory lookup or removal missed.
    #[error("record not found")]
    RecordNotFound,

    /// Reverse lookup of a field id with no interned name.
    #[error("field not found")]
    FieldNotFound,

    /// The ordered index and the value map disagree about a key.
    #[error("corrupt state: {0}")]
    CorruptState(String),

    /// Snapshot file open/write/read/decode failure.
    #[error("snapshot io: {0}")]
    SnapshotIo(String),

    /// Reserved for future operations.
    #[error("not implemented")]
    NotImplemented,
}

impl From<std::io::Error> for StashError {
    fn from(err: std::io::Error) -> Self {
        StashError::SnapshotIo(err.to_string())
    }
}

impl From<serde_json::Error> for StashError {
    fn from(err: serde_json::Error) -> Self {
        StashError::SnapshotIo(err.to_string())
    }
}
