//! Where committed sighting ops go to survive a restart.

/// SQLite journal implementation.
pub mod sqlite;

use crate::{
    core::store::StoreSnapshotV1,
    op::StoredOp,
    types::OpSeq,
};

/// Durable storage failure. The in-memory store keeps its last good state.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Database error.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Payload encode or decode error.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Anything else, such as a full queue or an unsupported format.
    #[error("{0}")]
    Message(String),
}

/// Result alias for journal calls.
pub type PersistResult<T> = Result<T, PersistenceError>;

/// Destination for the ops a [`crate::core::store::SightingStore`] commits.
///
/// Calls are made from a blocking worker thread, in sequence order.
pub trait OpSink: Send {
    /// Appends `ops` atomically and returns the highest sequence now stored.
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;

    /// Pushes buffered writes to stable storage.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }

    /// Records a full snapshot covering every op through `last_seq`.
    fn write_snapshot(&mut self, _snapshot: &StoreSnapshotV1, _last_seq: OpSeq) -> PersistResult<()> {
        Ok(())
    }

    /// Forgets ops already covered by a snapshot. Returns how many went.
    fn compact_through(&mut self, _seq: OpSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
