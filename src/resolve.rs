//! Two-step joins of primary records with separately fetched lookups.
//!
//! The referenced keys are collected first, the lookups are fetched for
//! exactly that key set, and the results are zipped back through an
//! explicit key map.

use std::{convert::Infallible, hash::Hash};

use hashbrown::{HashMap, HashSet};

use crate::{
    catalog::{Airport, AirportCatalog},
    sighting::Sighting,
};

/// A primary record and the lookup its key resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T, L> {
    /// Primary record, unchanged.
    pub record: T,
    /// Matching lookup, or `None` when unreferenced or not found.
    pub lookup: Option<L>,
}

/// Joins `records` with lookups fetched once for all referenced keys.
///
/// `fetch` is not called when no record references a key.
pub fn try_resolve_by_key<T, K, L, E>(
    records: Vec<T>,
    key_of: impl Fn(&T) -> Option<K>,
    fetch: impl FnOnce(&HashSet<K>) -> Result<Vec<L>, E>,
    lookup_key: impl Fn(&L) -> K,
) -> Result<Vec<Resolved<T, L>>, E>
where
    K: Eq + Hash,
    L: Clone,
{
    let keys: HashSet<K> = records.iter().filter_map(&key_of).collect();
    let lookups = if keys.is_empty() {
        Vec::new()
    } else {
        fetch(&keys)?
    };

    let by_key: HashMap<K, L> = lookups
        .into_iter()
        .map(|lookup| (lookup_key(&lookup), lookup))
        .collect();

    Ok(records
        .into_iter()
        .map(|record| {
            let lookup = key_of(&record).and_then(|key| by_key.get(&key).cloned());
            Resolved { record, lookup }
        })
        .collect())
}

/// Infallible form of [`try_resolve_by_key`].
pub fn resolve_by_key<T, K, L>(
    records: Vec<T>,
    key_of: impl Fn(&T) -> Option<K>,
    fetch: impl FnOnce(&HashSet<K>) -> Vec<L>,
    lookup_key: impl Fn(&L) -> K,
) -> Vec<Resolved<T, L>>
where
    K: Eq + Hash,
    L: Clone,
{
    let resolved = try_resolve_by_key(
        records,
        key_of,
        |keys| Ok::<_, Infallible>(fetch(keys)),
        lookup_key,
    );
    match resolved {
        Ok(out) => out,
        Err(never) => match never {},
    }
}

/// Pairs each sighting with its catalog airport, matched by ICAO code.
pub fn sightings_with_airports(
    sightings: Vec<Sighting>,
    catalog: &AirportCatalog,
) -> Vec<Resolved<Sighting, Airport>> {
    resolve_by_key(
        sightings,
        |s: &Sighting| {
            let icao = s.airport_icao.trim();
            (!icao.is_empty()).then(|| icao.to_uppercase())
        },
        |codes: &HashSet<String>| catalog.by_icaos(codes).into_iter().cloned().collect(),
        |airport: &Airport| airport.icao.to_uppercase(),
    )
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::defaults::default_airports;

    fn sighting(id: u64, icao: &str) -> Sighting {
        Sighting {
            id,
            tail: format!("PT-{id}"),
            manufacturer: "Boeing".to_string(),
            model: "737-800".to_string(),
            airport_city: String::new(),
            airport_icao: icao.to_string(),
            airport_iata: String::new(),
            datetime: "2025-10-10 08:45".to_string(),
        }
    }

    #[test]
    fn joins_by_icao_and_keeps_order() {
        let catalog = AirportCatalog::new(default_airports());
        let out = sightings_with_airports(
            vec![sighting(1, "katl"), sighting(2, "ZZZZ"), sighting(3, ""), sighting(4, "EGLL")],
            &catalog,
        );

        let ids: Vec<u64> = out.iter().map(|r| r.record.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(out[0].lookup.as_ref().map(|a| a.iata.as_str()), Some("ATL"));
        assert!(out[1].lookup.is_none());
        assert!(out[2].lookup.is_none());
        assert_eq!(out[3].lookup.as_ref().map(|a| a.iata.as_str()), Some("LHR"));
    }

    #[test]
    fn fetch_sees_distinct_keys_once() {
        let calls = Cell::new(0);
        let out = resolve_by_key(
            vec![(1, Some(7u32)), (2, Some(7)), (3, None)],
            |r: &(u32, Option<u32>)| r.1,
            |keys: &HashSet<u32>| {
                calls.set(calls.get() + 1);
                assert_eq!(keys.len(), 1);
                keys.iter().map(|k| (*k, format!("airport-{k}"))).collect()
            },
            |l: &(u32, String)| l.0,
        );

        assert_eq!(calls.get(), 1);
        assert_eq!(out[1].lookup.as_ref().map(|l| l.1.as_str()), Some("airport-7"));
        assert!(out[2].lookup.is_none());
    }

    #[test]
    fn fetch_skipped_without_keys() {
        let out = try_resolve_by_key(
            vec![1u32, 2],
            |_| None::<u32>,
            |_| Err::<Vec<u32>, &str>("should not fetch"),
            |l| *l,
        );
        assert_eq!(out.map(|v| v.len()), Ok(2));
    }
}
