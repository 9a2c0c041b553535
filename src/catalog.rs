//! Airport reference rows and client-side search.

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

/// Result cap used by [`AirportCatalog::search_default`].
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
/// Shortest trimmed query that produces results.
pub const MIN_QUERY_LEN: usize = 2;

/// Airport identifier.
pub type AirportId = u32;

/// One airport reference row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airport {
    /// Catalog id.
    pub id: AirportId,
    /// Display name.
    pub name: String,
    /// Four-letter ICAO code.
    pub icao: String,
    /// Three-letter IATA code.
    pub iata: String,
    /// City served.
    pub city: String,
}

impl Airport {
    /// `Name (ICAO)`, as shown in pickers.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.icao)
    }

    fn matches(&self, needle: &str) -> bool {
        [&self.name, &self.icao, &self.iata, &self.city]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// In-memory airport list keyed by id and ICAO code.
#[derive(Debug, Clone, Default)]
pub struct AirportCatalog {
    airports: Vec<Airport>,
    by_id: HashMap<AirportId, usize>,
    by_icao: HashMap<String, usize>,
}

impl AirportCatalog {
    /// Builds a catalog; a later row with a duplicate id or ICAO wins.
    pub fn new(airports: Vec<Airport>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_icao = HashMap::new();
        for (idx, airport) in airports.iter().enumerate() {
            by_id.insert(airport.id, idx);
            by_icao.insert(airport.icao.to_uppercase(), idx);
        }
        Self {
            airports,
            by_id,
            by_icao,
        }
    }

    /// Number of airports.
    pub fn len(&self) -> usize {
        self.airports.len()
    }

    /// True for an empty catalog.
    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }

    /// Airport with catalog id `id`.
    pub fn get(&self, id: AirportId) -> Option<&Airport> {
        self.by_id.get(&id).map(|idx| &self.airports[*idx])
    }

    /// Airport for an ICAO code, ignoring case and padding.
    pub fn by_icao(&self, icao: &str) -> Option<&Airport> {
        self.by_icao
            .get(&icao.trim().to_uppercase())
            .map(|idx| &self.airports[*idx])
    }

    /// Airports for every id in `ids` that the catalog knows.
    pub fn by_ids(&self, ids: &HashSet<AirportId>) -> Vec<&Airport> {
        self.airports
            .iter()
            .filter(|a| ids.contains(&a.id))
            .collect()
    }

    /// Airports for every ICAO code in `codes` that the catalog knows.
    pub fn by_icaos(&self, codes: &HashSet<String>) -> Vec<&Airport> {
        codes.iter().filter_map(|code| self.by_icao(code)).collect()
    }

    /// Case-insensitive substring match over name, ICAO, IATA and city, in
    /// catalog order. Queries shorter than [`MIN_QUERY_LEN`] after trimming
    /// return nothing.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&Airport> {
        let needle = query.trim().to_lowercase();
        if needle.chars().count() < MIN_QUERY_LEN {
            return Vec::new();
        }
        self.airports
            .iter()
            .filter(|a| a.matches(&needle))
            .take(limit)
            .collect()
    }

    /// [`AirportCatalog::search`] capped at [`DEFAULT_SEARCH_LIMIT`].
    pub fn search_default(&self, query: &str) -> Vec<&Airport> {
        self.search(query, DEFAULT_SEARCH_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::default_airports;

    #[test]
    fn search_ignores_short_queries_and_case() {
        let catalog = AirportCatalog::new(default_airports());

        assert!(catalog.search_default(" a ").is_empty());

        let hits: Vec<&str> = catalog
            .search_default("lax")
            .into_iter()
            .map(|a| a.icao.as_str())
            .collect();
        assert_eq!(hits, vec!["KLAX"]);

        let by_city = catalog.search_default("DUB");
        assert_eq!(by_city[0].iata, "DXB");
    }

    #[test]
    fn search_respects_limit() {
        let catalog = AirportCatalog::new(default_airports());
        assert_eq!(catalog.search("k", 3).len(), 0);
        assert_eq!(catalog.search("an", 2).len(), 2);
    }

    #[test]
    fn icao_lookup_is_case_insensitive() {
        let catalog = AirportCatalog::new(default_airports());
        assert_eq!(catalog.by_icao("egll").map(|a| a.iata.as_str()), Some("LHR"));
        assert!(catalog.by_icao("XXXX").is_none());
    }
}
