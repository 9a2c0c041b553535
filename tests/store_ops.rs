use spotlog::{
    core::store::{SightingStore, StoreError},
    defaults::placeholder_sightings,
    sighting::SightingDraft,
    types::CancelFlag,
};

fn draft(tail: &str, datetime: &str) -> SightingDraft {
    SightingDraft {
        id: None,
        tail: tail.to_string(),
        manufacturer: "Boeing".to_string(),
        model: "737-800".to_string(),
        airport_city: "Atlanta".to_string(),
        airport_icao: "KATL".to_string(),
        airport_iata: "ATL".to_string(),
        datetime: datetime.to_string(),
    }
}

fn tails(store: &SightingStore) -> Vec<String> {
    store.iter().map(|s| s.tail.clone()).collect()
}

#[test]
fn upsert_yields_monotonic_ids() {
    let mut store = SightingStore::new();
    let (id1, op1) = store.upsert(draft("PT-101A", "2025-10-10 08:45")).unwrap();
    let (id2, op2) = store.upsert(draft("PT-102B", "2025-10-11 09:20")).unwrap();
    let (id3, op3) = store.upsert(draft("PT-103C", "2025-10-11 15:30")).unwrap();

    assert_eq!((id1, id2, id3), (1, 2, 3));
    assert_eq!((op1.seq, op2.seq, op3.seq), (1, 2, 3));
    assert_eq!(store.len(), 3);
}

#[test]
fn example_scenario_orders_newest_first() {
    let mut store = SightingStore::new();
    let (a, _) = store.upsert(draft("PT-101A", "2025-10-10 08:45")).unwrap();
    let (b, _) = store.upsert(draft("PT-102B", "2025-10-11 09:20")).unwrap();
    assert_eq!((a, b), (1, 2));
    assert_eq!(store.ordered_ids(), vec![2, 1]);

    store.delete_by_id(1).unwrap();
    assert_eq!(store.ordered_ids(), vec![2]);

    store.clear_all().unwrap();
    assert!(store.all().is_empty());
}

#[test]
fn upsert_with_live_id_replaces_in_full() {
    let mut store = SightingStore::new();
    let (id, _) = store.upsert(draft("PT-101A", "2025-10-10 08:45")).unwrap();

    let replacement = SightingDraft {
        id: Some(id),
        model: "737 MAX 8".to_string(),
        ..draft("PT-101A", "2025-10-12 10:00")
    };
    let (same, _) = store.upsert(replacement).unwrap();

    assert_eq!(same, id);
    assert_eq!(store.len(), 1);
    let rec = store.get(id).unwrap();
    assert_eq!(rec.model, "737 MAX 8");
    assert_eq!(rec.datetime, "2025-10-12 10:00");
}

#[test]
fn upsert_with_unknown_id_assigns_fresh_one() {
    let mut store = SightingStore::new();
    let (id, _) = store
        .upsert(SightingDraft {
            id: Some(99),
            ..draft("PT-101A", "2025-10-10 08:45")
        })
        .unwrap();
    assert_eq!(id, 1);
    assert!(store.get(99).is_none());
}

#[test]
fn ids_are_not_reused_after_delete() {
    let mut store = SightingStore::new();
    let (a, _) = store.upsert(draft("PT-101A", "2025-10-10 08:45")).unwrap();
    store.delete_by_id(a).unwrap();
    store.clear_all();
    let (b, _) = store.upsert(draft("PT-102B", "2025-10-10 08:45")).unwrap();
    assert!(b > a);
}

#[test]
fn blank_required_fields_are_rejected_without_side_effects() {
    let mut store = SightingStore::new();
    store.upsert(draft("PT-101A", "2025-10-10 08:45")).unwrap();
    let before = store.export_snapshot();

    assert_eq!(
        store.upsert(draft("   ", "2025-10-10 08:45")).unwrap_err(),
        StoreError::Validation { field: "tail" }
    );
    assert_eq!(
        store.upsert(draft("PT-102B", "")).unwrap_err(),
        StoreError::Validation { field: "datetime" }
    );

    assert_eq!(store.export_snapshot(), before);
    assert_eq!(store.drain_pending_ops().len(), 1);
}

#[test]
fn delete_missing_id_is_noop() {
    let mut store = SightingStore::new();
    store.upsert(draft("PT-101A", "2025-10-10 08:45")).unwrap();
    assert!(store.delete_by_id(42).is_none());
    assert_eq!(store.len(), 1);
}

#[test]
fn delete_by_tail_matches_case_insensitively() {
    let mut store = SightingStore::new();
    store.upsert(draft("PT-101A", "2025-10-10 08:45")).unwrap();
    store.upsert(draft("pt-101a", "2025-10-11 08:45")).unwrap();
    store.upsert(draft("PT-102B", "2025-10-12 08:45")).unwrap();

    assert_eq!(store.by_tail(" Pt-101A ").len(), 2);
    let ops = store.delete_by_tail("PT-101a");

    assert_eq!(ops.len(), 2);
    assert_eq!(tails(&store), vec!["PT-102B"]);
    assert!(store.delete_by_tail("PT-101A").is_empty());
}

#[test]
fn equal_datetimes_put_latest_write_first() {
    let mut store = SightingStore::new();
    let (a, _) = store.upsert(draft("A", "2025-10-10 08:45")).unwrap();
    let (b, _) = store.upsert(draft("B", "2025-10-10 08:45")).unwrap();
    assert_eq!(store.ordered_ids(), vec![b, a]);
    assert_eq!(store.ordered_ids(), vec![b, a]);

    store
        .upsert(SightingDraft {
            id: Some(a),
            ..draft("A", "2025-10-10 08:45")
        })
        .unwrap();
    assert_eq!(store.ordered_ids(), vec![a, b]);
}

#[test]
fn unparsable_datetimes_sort_last() {
    let mut store = SightingStore::new();
    store.upsert(draft("JUNK", "sometime")).unwrap();
    store.upsert(draft("OLD", "2020-01-01 00:00")).unwrap();
    store.upsert(draft("NEW", "2025-01-01T00:00")).unwrap();
    assert_eq!(tails(&store), vec!["NEW", "OLD", "JUNK"]);
}

#[test]
fn replace_requires_existing_record() {
    let mut store = SightingStore::new();
    assert_eq!(
        store
            .replace(7, draft("PT-101A", "2025-10-10 08:45"))
            .unwrap_err(),
        StoreError::NotFound(7)
    );

    let (id, _) = store.upsert(draft("PT-101A", "2025-10-10 08:45")).unwrap();
    store
        .replace(id, draft("PT-101A", "2025-10-10 09:00"))
        .unwrap();
    assert_eq!(store.get(id).unwrap().datetime, "2025-10-10 09:00");
}

#[test]
fn seed_if_empty_inserts_once() {
    let mut store = SightingStore::new();
    let defaults = placeholder_sightings();
    let never = CancelFlag::new();

    let outcome = store.seed_if_empty(defaults.clone(), &never).unwrap();
    assert_eq!(outcome.inserted.len(), defaults.len());
    assert!(!outcome.cancelled);

    let mut ids = outcome.inserted.clone();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), defaults.len());

    let again = store.seed_if_empty(defaults.clone(), &never).unwrap();
    assert!(again.inserted.is_empty());
    assert_eq!(store.len(), defaults.len());
}

#[test]
fn seed_rejects_invalid_default_before_inserting() {
    let mut store = SightingStore::new();
    let mut defaults = placeholder_sightings();
    defaults[3].model = String::new();

    let err = store
        .seed_if_empty(defaults, &CancelFlag::new())
        .unwrap_err();
    assert_eq!(err, StoreError::Validation { field: "model" });
    assert!(store.is_empty());
}

#[test]
fn cancelled_seed_inserts_nothing() {
    let mut store = SightingStore::new();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let outcome = store.seed_if_empty(placeholder_sightings(), &cancel).unwrap();
    assert!(outcome.cancelled);
    assert!(outcome.inserted.is_empty());
    assert!(store.is_empty());
}

#[test]
fn snapshot_round_trip_preserves_order_and_counters() {
    let mut store = SightingStore::new();
    store.upsert(draft("A", "2025-10-10 08:45")).unwrap();
    store.upsert(draft("B", "2025-10-10 08:45")).unwrap();
    let (c, _) = store.upsert(draft("C", "2025-10-09 08:45")).unwrap();
    store.delete_by_id(c);

    let restored = SightingStore::from_snapshot(store.export_snapshot());
    assert_eq!(restored.ordered_ids(), store.ordered_ids());
    assert_eq!(restored.latest_op_seq(), store.latest_op_seq());

    let mut restored = restored;
    let (next, _) = restored.upsert(draft("D", "2025-10-10 08:45")).unwrap();
    assert_eq!(next, 4);
    assert_eq!(restored.ordered_ids()[0], next);
}
