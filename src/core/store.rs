use std::collections::BTreeMap;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{
    op::{Op, StoredOp},
    sighting::{Sighting, SightingDraft, normalize_tail},
    types::{CancelFlag, OpSeq, SightingId, now_ms},
};

use super::indices::{VecIndex, ViewKey, remove_id};

/// Rejection of a mutation. The store is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A required field was empty or whitespace.
    #[error("sighting field `{field}` must not be blank")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
    },
    /// Strict replace of an id that is not live.
    #[error("no sighting with id {0}")]
    NotFound(SightingId),
}

/// Effect of committing one op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A record was inserted under this id.
    Created(SightingId),
    /// The live record with this id was replaced.
    Replaced(SightingId),
    /// The record with this id was removed.
    Deleted(SightingId),
    /// The store was emptied.
    Cleared {
        /// Records removed.
        removed: usize,
    },
    /// Replay of a delete for an id that was already gone.
    Unchanged,
}

/// One record in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Sequence of the op that last wrote the record; breaks datetime ties.
    pub written_seq: OpSeq,
    /// The record.
    pub sighting: Sighting,
}

/// Full store state, enough to rebuild order and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    /// Next id to hand out.
    pub next_sighting_id: SightingId,
    /// Next op sequence to stamp.
    pub next_op_seq: OpSeq,
    /// Newest first.
    pub entries: Vec<SnapshotEntry>,
}

/// Result of a seed attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedOutcome {
    /// Ids inserted, in default order.
    pub inserted: Vec<SightingId>,
    /// True when the cancel flag stopped the seed early.
    pub cancelled: bool,
}

/// Authoritative set of sightings with its ordering and tail indices.
///
/// Every mutation is recorded as a [`StoredOp`] in a pending queue that the
/// caller drains into a journal.
#[derive(Debug)]
pub struct SightingStore {
    records: HashMap<SightingId, Sighting>,
    keys: HashMap<SightingId, ViewKey>,
    view: BTreeMap<ViewKey, SightingId>,
    by_tail: VecIndex<String>,
    pending_ops: Vec<StoredOp>,
    next_op_seq: OpSeq,
    next_sighting_id: SightingId,
}

impl Default for SightingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SightingStore {
    /// Empty store; ids and op sequences start at 1.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            keys: HashMap::new(),
            view: BTreeMap::new(),
            by_tail: VecIndex::new(),
            pending_ops: Vec::new(),
            next_op_seq: 1,
            next_sighting_id: 1,
        }
    }

    /// Rebuilds a store from [`SightingStore::export_snapshot`] output.
    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Self {
        let mut store = Self::new();
        for entry in snapshot.entries {
            store.next_sighting_id = store
                .next_sighting_id
                .max(entry.sighting.id.saturating_add(1));
            store.bump_next_seq_from(entry.written_seq);
            store.index(entry.sighting, entry.written_seq);
        }
        store.next_sighting_id = store.next_sighting_id.max(snapshot.next_sighting_id);
        store.next_op_seq = store.next_op_seq.max(snapshot.next_op_seq);
        store
    }

    /// Captures records, write order and counters.
    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        let entries = self
            .view
            .iter()
            .filter_map(|(key, id)| {
                self.records.get(id).map(|sighting| SnapshotEntry {
                    written_seq: key.written_seq(),
                    sighting: sighting.clone(),
                })
            })
            .collect();

        StoreSnapshotV1 {
            next_sighting_id: self.next_sighting_id,
            next_op_seq: self.next_op_seq,
            entries,
        }
    }

    /// Inserts `draft` under a fresh id, or replaces the live record whose id
    /// it carries. Unknown ids are treated as new records.
    pub fn upsert(&mut self, draft: SightingDraft) -> Result<(SightingId, StoredOp), StoreError> {
        let (id, stored) = self.plan_upsert(draft)?;
        Ok((id, self.journal(stored)))
    }

    /// Replaces a record that must already exist.
    pub fn replace(&mut self, id: SightingId, draft: SightingDraft) -> Result<StoredOp, StoreError> {
        let stored = self.prepare_replace(id, draft)?;
        Ok(self.journal(stored))
    }

    /// Removes `id`. Returns `None` when it is not live.
    pub fn delete_by_id(&mut self, id: SightingId) -> Option<StoredOp> {
        let stored = self.prepare_delete(id)?;
        Some(self.journal(stored))
    }

    /// Deletes every record whose tail matches case-insensitively.
    pub fn delete_by_tail(&mut self, tail: &str) -> Vec<StoredOp> {
        self.ids_by_tail(tail)
            .into_iter()
            .filter_map(|id| self.delete_by_id(id))
            .collect()
    }

    /// Removes every record. Returns `None` on an empty store.
    pub fn clear_all(&mut self) -> Option<StoredOp> {
        let stored = self.prepare_clear()?;
        Some(self.journal(stored))
    }

    /// Inserts `defaults` with fresh ids when the store is empty.
    ///
    /// Every default is validated before the first insert. `cancel` is
    /// checked between records.
    pub fn seed_if_empty<I>(&mut self, defaults: I, cancel: &CancelFlag) -> Result<SeedOutcome, StoreError>
    where
        I: IntoIterator<Item = SightingDraft>,
    {
        let plan = self.prepare_seed(defaults)?;
        let mut outcome = SeedOutcome::default();
        for draft in plan {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let (id, _) = self.upsert(draft)?;
            outcome.inserted.push(id);
        }
        Ok(outcome)
    }

    /// Like [`SightingStore::plan_upsert`] without the id.
    pub fn prepare_upsert(&self, draft: SightingDraft) -> Result<StoredOp, StoreError> {
        self.plan_upsert(draft).map(|(_, stored)| stored)
    }

    /// Validates `draft` and resolves the id it will be stored under.
    pub fn plan_upsert(&self, draft: SightingDraft) -> Result<(SightingId, StoredOp), StoreError> {
        draft.validate()?;
        let id = match draft.id {
            Some(id) if self.records.contains_key(&id) => id,
            _ => self.next_sighting_id,
        };
        let stored = self.stamp(Op::Upsert {
            sighting: draft.into_sighting(id),
        });
        Ok((id, stored))
    }

    /// Builds the op for a strict replace without applying it.
    pub fn prepare_replace(&self, id: SightingId, draft: SightingDraft) -> Result<StoredOp, StoreError> {
        if !self.records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        self.prepare_upsert(SightingDraft {
            id: Some(id),
            ..draft
        })
    }

    /// Builds the delete op for a live `id` without applying it.
    pub fn prepare_delete(&self, id: SightingId) -> Option<StoredOp> {
        self.records
            .contains_key(&id)
            .then(|| self.stamp(Op::Delete { id }))
    }

    /// Builds the clear op for a non-empty store without applying it.
    pub fn prepare_clear(&self) -> Option<StoredOp> {
        (!self.records.is_empty()).then(|| self.stamp(Op::Clear))
    }

    /// Validated seed drafts with ids stripped, or nothing if the store
    /// already holds a record.
    pub fn prepare_seed<I>(&self, defaults: I) -> Result<Vec<SightingDraft>, StoreError>
    where
        I: IntoIterator<Item = SightingDraft>,
    {
        if !self.is_empty() {
            return Ok(Vec::new());
        }
        let drafts: Vec<SightingDraft> = defaults
            .into_iter()
            .map(|d| SightingDraft { id: None, ..d })
            .collect();
        for draft in &drafts {
            draft.validate()?;
        }
        Ok(drafts)
    }

    /// Applies a prepared or replayed op.
    pub fn commit(&mut self, stored: StoredOp) -> Change {
        let seq = stored.seq;
        self.bump_next_seq_from(seq);
        match stored.op {
            Op::Upsert { sighting } => {
                let id = sighting.id;
                self.next_sighting_id = self.next_sighting_id.max(id.saturating_add(1));
                let replaced = self.unindex(id).is_some();
                self.index(sighting, seq);
                if replaced {
                    Change::Replaced(id)
                } else {
                    Change::Created(id)
                }
            }
            Op::Delete { id } => match self.unindex(id) {
                Some(_) => Change::Deleted(id),
                None => Change::Unchanged,
            },
            Op::Clear => {
                let removed = self.records.len();
                self.records.clear();
                self.keys.clear();
                self.view.clear();
                self.by_tail.clear();
                Change::Cleared { removed }
            }
        }
    }

    /// Record with `id`, if live.
    pub fn get(&self, id: SightingId) -> Option<&Sighting> {
        self.records.get(&id)
    }

    /// Owned copy of [`SightingStore::get`].
    pub fn get_cloned(&self, id: SightingId) -> Option<Sighting> {
        self.get(id).cloned()
    }

    /// Lazily walks the records newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Sighting> + '_ {
        self.view.values().filter_map(|id| self.records.get(id))
    }

    /// Every record, newest first.
    pub fn all(&self) -> Vec<&Sighting> {
        self.iter().collect()
    }

    /// Owned copy of [`SightingStore::all`].
    pub fn all_cloned(&self) -> Vec<Sighting> {
        self.iter().cloned().collect()
    }

    /// Ids in view order.
    pub fn ordered_ids(&self) -> Vec<SightingId> {
        self.view.values().copied().collect()
    }

    /// Ids whose tail matches case-insensitively, newest first.
    pub fn ids_by_tail(&self, tail: &str) -> Vec<SightingId> {
        let mut ids = self
            .by_tail
            .get(&normalize_tail(tail))
            .cloned()
            .unwrap_or_default();
        ids.sort_by(|a, b| self.keys.get(a).cmp(&self.keys.get(b)));
        ids
    }

    /// Records whose tail matches ignoring case, newest first.
    pub fn by_tail(&self, tail: &str) -> Vec<&Sighting> {
        self.ids_by_tail(tail)
            .into_iter()
            .filter_map(|id| self.records.get(&id))
            .collect()
    }

    /// Owned copy of [`SightingStore::by_tail`].
    pub fn by_tail_cloned(&self, tail: &str) -> Vec<Sighting> {
        self.by_tail(tail).into_iter().cloned().collect()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no record is live.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Takes the ops committed since the last drain, oldest first.
    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Sequence of the last committed op, 0 before any.
    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn journal(&mut self, stored: StoredOp) -> StoredOp {
        self.commit(stored.clone());
        self.pending_ops.push(stored.clone());
        stored
    }

    fn stamp(&self, op: Op) -> StoredOp {
        StoredOp {
            seq: self.next_op_seq,
            ts_ms: now_ms(),
            op,
        }
    }

    fn index(&mut self, sighting: Sighting, written_seq: OpSeq) {
        let id = sighting.id;
        let key = ViewKey::new(sighting.spotted_at(), written_seq);
        self.view.insert(key.clone(), id);
        self.keys.insert(id, key);
        self.by_tail.entry(sighting.tail_key()).or_default().push(id);
        self.records.insert(id, sighting);
    }

    fn unindex(&mut self, id: SightingId) -> Option<Sighting> {
        let rec = self.records.remove(&id)?;
        if let Some(key) = self.keys.remove(&id) {
            self.view.remove(&key);
        }
        let tail_key = rec.tail_key();
        if let Some(ids) = self.by_tail.get_mut(&tail_key) {
            remove_id(ids, id);
            if ids.is_empty() {
                self.by_tail.remove(&tail_key);
            }
        }
        Some(rec)
    }

    fn bump_next_seq_from(&mut self, seq: OpSeq) {
        self.next_op_seq = self.next_op_seq.max(seq.saturating_add(1));
    }
}
