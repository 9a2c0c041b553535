use std::collections::BTreeSet;

use proptest::prelude::*;

use spotlog::{
    core::store::SightingStore,
    sighting::{SightingDraft, SpottedAt},
    types::SightingId,
};

#[derive(Debug, Clone)]
enum Action {
    Insert { tail_idx: u8, day: u8, minute: u8 },
    Replace { target: u8, day: u8 },
    DeleteId { target: u8 },
    DeleteMissing { id: u16 },
    DeleteTail { tail_idx: u8 },
    Clear,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        6 => (0u8..12, 1u8..28, 0u8..3)
            .prop_map(|(tail_idx, day, minute)| Action::Insert { tail_idx, day, minute }),
        2 => (0u8..32, 1u8..28).prop_map(|(target, day)| Action::Replace { target, day }),
        2 => (0u8..32).prop_map(|target| Action::DeleteId { target }),
        1 => (1000u16..2000).prop_map(|id| Action::DeleteMissing { id }),
        1 => (0u8..12).prop_map(|tail_idx| Action::DeleteTail { tail_idx }),
        1 => Just(Action::Clear),
    ]
}

fn tail(idx: u8) -> String {
    if idx % 2 == 0 {
        format!("PT-{idx}A")
    } else {
        format!("pt-{}a", idx - 1)
    }
}

fn draft(id: Option<SightingId>, tail: String, day: u8, minute: u8) -> SightingDraft {
    SightingDraft {
        id,
        tail,
        manufacturer: "Airbus".to_string(),
        model: "A320neo".to_string(),
        airport_city: "Dubai".to_string(),
        airport_icao: "OMDB".to_string(),
        airport_iata: "DXB".to_string(),
        datetime: format!("2025-10-{day:02} 08:{minute:02}"),
    }
}

fn pick(store: &SightingStore, target: u8) -> Option<SightingId> {
    let ids = store.ordered_ids();
    (!ids.is_empty()).then(|| ids[usize::from(target) % ids.len()])
}

proptest! {
    #[test]
    fn random_sequences_keep_order_ids_and_tail_index(actions in prop::collection::vec(action_strategy(), 1..200)) {
        let mut store = SightingStore::new();
        let mut issued = BTreeSet::<SightingId>::new();

        for action in actions {
            match action {
                Action::Insert { tail_idx, day, minute } => {
                    let before = store.len();
                    let (id, _) = store.upsert(draft(None, tail(tail_idx), day, minute)).unwrap();
                    prop_assert!(issued.insert(id), "id {} issued twice", id);
                    prop_assert_eq!(store.len(), before + 1);
                }
                Action::Replace { target, day } => {
                    let Some(id) = pick(&store, target) else { continue; };
                    let existing = store.get(id).unwrap().tail.clone();
                    let before = store.len();
                    let (same, _) = store.upsert(draft(Some(id), existing, day, 0)).unwrap();
                    prop_assert_eq!(same, id);
                    prop_assert_eq!(store.len(), before);
                }
                Action::DeleteId { target } => {
                    let Some(id) = pick(&store, target) else { continue; };
                    prop_assert!(store.delete_by_id(id).is_some());
                    prop_assert!(store.get(id).is_none());
                }
                Action::DeleteMissing { id } => {
                    let before = store.len();
                    prop_assert!(store.delete_by_id(u64::from(id)).is_none());
                    prop_assert_eq!(store.len(), before);
                }
                Action::DeleteTail { tail_idx } => {
                    store.delete_by_tail(&tail(tail_idx));
                    prop_assert!(store.by_tail(&tail(tail_idx)).is_empty());
                }
                Action::Clear => {
                    store.clear_all();
                    prop_assert!(store.all().is_empty());
                }
            }

            let keys: Vec<SpottedAt> = store.iter().map(|s| s.spotted_at()).collect();
            prop_assert!(keys.windows(2).all(|w| w[0] >= w[1]), "view not newest first");
            prop_assert_eq!(store.ordered_ids(), store.ordered_ids());

            for idx in 0..12u8 {
                let wanted = tail(idx).to_uppercase();
                let scanned: BTreeSet<SightingId> = store
                    .iter()
                    .filter(|s| s.tail.to_uppercase() == wanted)
                    .map(|s| s.id)
                    .collect();
                let indexed: BTreeSet<SightingId> = store.ids_by_tail(&tail(idx)).into_iter().collect();
                prop_assert_eq!(indexed, scanned);
            }
        }

        let restored = SightingStore::from_snapshot(store.export_snapshot());
        prop_assert_eq!(restored.all_cloned(), store.all_cloned());
    }
}
