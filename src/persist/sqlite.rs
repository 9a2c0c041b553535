//! SQLite journal: one row per committed op plus periodic full snapshots.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::{
    core::store::{SightingStore, StoreSnapshotV1},
    op::{StoredOp, StoredOpEnvelope},
    types::{OpSeq, now_ms},
};

use super::{OpSink, PersistResult, PersistenceError};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;

const INSERT_EVENT: &str =
    "INSERT INTO events(seq, ts_ms, kind, sighting_id, payload) VALUES (?1, ?2, ?3, ?4, ?5)";
const SELECT_EVENTS_AFTER: &str =
    "SELECT seq, ts_ms, payload FROM events WHERE seq > ?1 ORDER BY seq ASC";
const INSERT_SNAPSHOT: &str = "INSERT INTO snapshots(last_seq, ts_ms, payload) VALUES (?1, ?2, ?3)";
const SELECT_LATEST_SNAPSHOT: &str = "SELECT payload FROM snapshots ORDER BY id DESC LIMIT 1";

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotRecord {
    format_version: u16,
    snapshot: StoreSnapshotV1,
}

/// Journal database backing a [`SightingStore`].
pub struct SqliteOpSink {
    conn: Connection,
}

impl SqliteOpSink {
    /// Opens or creates the journal at `path` in WAL mode.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let path = path.as_ref();
        log::debug!("opening sighting journal at {}", path.display());
        Self::prepare(Connection::open(path)?)
    }

    /// Journal that lives only as long as the sink.
    pub fn open_in_memory() -> PersistResult<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Restores the newest snapshot, then replays every op journaled after it.
    pub fn load_store(&self) -> PersistResult<SightingStore> {
        let mut store = self
            .latest_snapshot()?
            .map(SightingStore::from_snapshot)
            .unwrap_or_default();

        let tail = self.load_events_after(store.latest_op_seq())?;
        let replayed = tail.len();
        for stored in tail {
            store.commit(stored);
        }
        log::debug!(
            "restored {} sightings at op {} ({replayed} replayed)",
            store.len(),
            store.latest_op_seq()
        );
        Ok(store)
    }

    /// Journaled ops with a sequence above `seq`, oldest first.
    pub fn load_events_after(&self, seq: OpSeq) -> PersistResult<Vec<StoredOp>> {
        let mut stmt = self.conn.prepare_cached(SELECT_EVENTS_AFTER)?;
        let rows = stmt
            .query_map(params![seq as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, ts_ms, payload)| -> PersistResult<StoredOp> {
                let mut stored = decode_op(&payload)?;
                // Row columns are authoritative over the payload copy.
                stored.seq = seq as OpSeq;
                stored.ts_ms = ts_ms as u64;
                Ok(stored)
            })
            .collect()
    }

    /// Stores `snapshot` as covering the journal through `last_seq`.
    pub fn write_snapshot(&mut self, snapshot: &StoreSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        let payload = serde_json::to_vec(&SnapshotRecord {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        })?;
        self.conn
            .execute(INSERT_SNAPSHOT, params![last_seq as i64, now_ms() as i64, payload])?;
        log::debug!("snapshot of {} sightings written at op {last_seq}", snapshot.entries.len());
        Ok(())
    }

    /// Drops journaled ops with a sequence at or below `seq`.
    pub fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM events WHERE seq <= ?1", params![seq as i64])?)
    }

    /// Highest journaled sequence, 0 for an empty journal.
    pub fn latest_seq(&self) -> PersistResult<OpSeq> {
        let seq = self
            .conn
            .query_row("SELECT MAX(seq) FROM events", [], |row| row.get::<_, Option<i64>>(0))?;
        Ok(seq.map_or(0, |s| s as OpSeq))
    }

    fn latest_snapshot(&self) -> PersistResult<Option<StoreSnapshotV1>> {
        let payload = self
            .conn
            .query_row(SELECT_LATEST_SNAPSHOT, [], |row| row.get::<_, Vec<u8>>(0))
            .optional()?;
        let Some(payload) = payload else {
            return Ok(None);
        };

        let record: SnapshotRecord = serde_json::from_slice(&payload)?;
        if record.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistenceError::Message(format!(
                "snapshot format {} is not supported",
                record.format_version
            )));
        }
        Ok(Some(record.snapshot))
    }
}

impl OpSink for SqliteOpSink {
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq> {
        let Some(last) = ops.last() else {
            return self.latest_seq();
        };

        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(INSERT_EVENT)?;
            for stored in ops {
                let (kind, sighting_id) = stored.op.kind_and_id();
                let payload = serde_json::to_vec(&StoredOpEnvelope::new(stored.clone()))?;
                insert.execute(params![
                    stored.seq as i64,
                    stored.ts_ms as i64,
                    kind,
                    sighting_id.map(|id| id as i64),
                    payload,
                ])?;
            }
        }
        tx.commit()?;
        Ok(last.seq)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &StoreSnapshotV1, last_seq: OpSeq) -> PersistResult<()> {
        SqliteOpSink::write_snapshot(self, snapshot, last_seq)
    }

    fn compact_through(&mut self, seq: OpSeq) -> PersistResult<usize> {
        SqliteOpSink::compact_through(self, seq)
    }
}

fn decode_op(payload: &[u8]) -> PersistResult<StoredOp> {
    serde_json::from_slice::<StoredOpEnvelope>(payload)?
        .into_current()
        .map_err(|version| PersistenceError::Message(format!("op format {version} is not supported")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sighting::SightingDraft;

    fn draft(tail: &str) -> SightingDraft {
        SightingDraft {
            tail: tail.to_string(),
            manufacturer: "ATR".to_string(),
            model: "ATR 72-600".to_string(),
            datetime: "2025-10-18 07:55".to_string(),
            ..SightingDraft::default()
        }
    }

    #[test]
    fn empty_append_reports_latest_seq() {
        let mut sink = SqliteOpSink::open_in_memory().expect("open");
        assert_eq!(sink.append_ops(&[]).expect("append"), 0);

        let mut store = SightingStore::new();
        store.upsert(draft("PT-114N")).expect("upsert");
        sink.append_ops(&store.drain_pending_ops()).expect("append");
        assert_eq!(sink.append_ops(&[]).expect("append"), 1);
    }

    #[test]
    fn unknown_op_format_is_rejected() {
        let mut store = SightingStore::new();
        let (_, stored) = store.upsert(draft("PT-114N")).expect("upsert");
        let mut envelope = StoredOpEnvelope::new(stored);
        envelope.format_version = 99;
        let payload = serde_json::to_vec(&envelope).expect("encode");

        assert!(matches!(decode_op(&payload), Err(PersistenceError::Message(_))));
    }
}
