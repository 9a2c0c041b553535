//! Journal entries: one immutable op per committed sighting mutation.

use serde::{Deserialize, Serialize};

use crate::{
    sighting::Sighting,
    types::{OpSeq, SightingId},
};

/// Payload version written into every [`StoredOpEnvelope`].
pub const OP_FORMAT_VERSION: u16 = 1;

/// A committed change to the sighting log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Insert or fully replace the record with `sighting.id`.
    Upsert {
        /// Record as stored after the op.
        sighting: Sighting,
    },
    /// Remove one record. Absent ids are a no-op.
    Delete {
        /// Sighting id to remove.
        id: SightingId,
    },
    /// Remove every record.
    Clear,
}

impl Op {
    /// Journal kind code and affected id.
    pub fn kind_and_id(&self) -> (i64, Option<SightingId>) {
        match self {
            Op::Upsert { sighting } => (1, Some(sighting.id)),
            Op::Delete { id } => (2, Some(*id)),
            Op::Clear => (3, None),
        }
    }
}

/// An [`Op`] stamped with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Log position; also the version of the view it produces.
    pub seq: OpSeq,
    /// Wall-clock time of the commit, Unix milliseconds.
    pub ts_ms: u64,
    /// What changed.
    pub op: Op,
}

/// On-disk form of a [`StoredOp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Must equal [`OP_FORMAT_VERSION`] to be replayed.
    pub format_version: u16,
    /// The op itself.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Wraps `stored` at the current format version.
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }

    /// Unwraps the op, rejecting payloads written by another format version.
    pub fn into_current(self) -> Result<StoredOp, u16> {
        if self.format_version == OP_FORMAT_VERSION {
            Ok(self.stored)
        } else {
            Err(self.format_version)
        }
    }
}
