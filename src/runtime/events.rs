//! Runtime event stream payloads.

use crate::types::{OpSeq, SightingId};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SightingEvent {
    /// A new sighting was stored.
    Created {
        /// Assigned id.
        id: SightingId,
    },
    /// An existing sighting was replaced in full.
    Replaced {
        /// Replaced id.
        id: SightingId,
    },
    /// A sighting was removed.
    Deleted {
        /// Removed id.
        id: SightingId,
    },
    /// Every sighting was removed.
    Cleared {
        /// Number of records removed.
        removed: usize,
    },
    /// An empty log was seeded with defaults.
    Seeded {
        /// Number of records inserted.
        inserted: usize,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
    /// A journal write failed. The ops stay queued and are retried in order
    /// unless the mutation was refused with a durable ack.
    JournalFailed {
        /// First op sequence of the failed batch.
        from_seq: OpSeq,
        /// Last op sequence of the failed batch.
        through_seq: OpSeq,
        /// Sink error text.
        error: String,
    },
}
