use std::cmp::Reverse;

use hashbrown::HashMap;

use crate::{
    sighting::SpottedAt,
    types::{OpSeq, SightingId},
};

/// Secondary index from a key to the ids carrying it.
pub type VecIndex<K> = HashMap<K, Vec<SightingId>>;

/// Position of a record in the newest-first view.
///
/// Sorts by datetime descending, then by the sequence of the last write
/// descending, so the most recently written of two equal timestamps leads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewKey {
    spotted_at: Reverse<SpottedAt>,
    written_seq: Reverse<OpSeq>,
}

impl ViewKey {
    /// Key for a record spotted at `spotted_at`, last written by op `written_seq`.
    pub fn new(spotted_at: SpottedAt, written_seq: OpSeq) -> Self {
        Self {
            spotted_at: Reverse(spotted_at),
            written_seq: Reverse(written_seq),
        }
    }

    /// Sequence of the op that last wrote the record.
    pub fn written_seq(&self) -> OpSeq {
        self.written_seq.0
    }
}

/// Drops one occurrence of `id` from an index bucket.
pub fn remove_id(v: &mut Vec<SightingId>, id: SightingId) {
    if let Some(pos) = v.iter().position(|x| *x == id) {
        v.remove(pos);
    }
}
