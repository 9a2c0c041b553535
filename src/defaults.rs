//! Built-in reference data used to seed an empty log.

use crate::{catalog::Airport, sighting::SightingDraft};

/// Aircraft maker and its common models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manufacturer {
    /// Maker name.
    pub name: &'static str,
    /// Model designations.
    pub models: &'static [&'static str],
}

/// Manufacturers offered when logging a sighting.
pub const MANUFACTURERS: &[Manufacturer] = &[
    Manufacturer {
        name: "Boeing",
        models: &["737-800", "737 MAX 8", "747-8", "757-200", "767-300ER", "777-300ER", "787-9"],
    },
    Manufacturer {
        name: "Airbus",
        models: &["A320neo", "A321neo", "A330-300", "A350-900", "A380-800"],
    },
    Manufacturer {
        name: "Embraer",
        models: &["E175", "E190", "E195-E2"],
    },
    Manufacturer {
        name: "Bombardier",
        models: &["CRJ900", "Q400"],
    },
    Manufacturer {
        name: "Cessna",
        models: &["Citation XLS+", "208 Caravan"],
    },
    Manufacturer {
        name: "ATR",
        models: &["ATR 72-600", "ATR 42-500"],
    },
];

/// Models for `manufacturer`, matched case-insensitively.
pub fn models_for(manufacturer: &str) -> &'static [&'static str] {
    MANUFACTURERS
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(manufacturer.trim()))
        .map(|m| m.models)
        .unwrap_or(&[])
}

const AIRPORTS: [(&str, &str, &str, &str); 10] = [
    ("Hartsfield-Jackson Atlanta International", "Atlanta", "KATL", "ATL"),
    ("Beijing Capital International", "Beijing", "ZBAA", "PEK"),
    ("Los Angeles International", "Los Angeles", "KLAX", "LAX"),
    ("Dubai International", "Dubai", "OMDB", "DXB"),
    ("Tokyo Haneda", "Tokyo", "RJTT", "HND"),
    ("London Heathrow", "London", "EGLL", "LHR"),
    ("Paris Charles de Gaulle", "Paris", "LFPG", "CDG"),
    ("Chicago O'Hare International", "Chicago", "KORD", "ORD"),
    ("Shanghai Pudong International", "Shanghai", "ZSPD", "PVG"),
    ("Dallas/Fort Worth International", "Dallas", "KDFW", "DFW"),
];

/// Airports bundled for offline lookup, ids 1 through 10.
pub fn default_airports() -> Vec<Airport> {
    AIRPORTS
        .iter()
        .zip(1..)
        .map(|((name, city, icao, iata), id)| Airport {
            id,
            name: name.to_string(),
            icao: icao.to_string(),
            iata: iata.to_string(),
            city: city.to_string(),
        })
        .collect()
}

// tail, manufacturer, model, city, icao, iata, datetime
const PLACEHOLDERS: [(&str, &str, &str, &str, &str, &str, &str); 25] = [
    ("PT-101A", "Boeing", "737-800", "Atlanta", "KATL", "ATL", "2025-10-10 08:45"),
    ("PT-102B", "Airbus", "A320neo", "Los Angeles", "KLAX", "LAX", "2025-10-11 09:20"),
    ("PT-103C", "Embraer", "E190", "São Paulo", "SBGR", "GRU", "2025-10-11 15:30"),
    ("PT-104D", "Airbus", "A350-900", "London Heathrow", "EGLL", "LHR", "2025-10-09 22:00"),
    ("PT-105E", "Boeing", "777-300ER", "Dubai", "OMDB", "DXB", "2025-10-12 04:25"),
    ("PT-106F", "Cessna", "208 Caravan", "Curitiba", "SBCT", "CWB", "2025-10-10 12:45"),
    ("PT-107G", "Boeing", "787-9", "Tokyo Haneda", "RJTT", "HND", "2025-10-14 18:15"),
    ("PT-108H", "Airbus", "A321neo", "Paris Charles de Gaulle", "LFPG", "CDG", "2025-10-13 05:50"),
    ("PT-109I", "Embraer", "E195-E2", "São José do Rio Preto", "SBSR", "SJP", "2025-10-16 14:10"),
    ("PT-110J", "Boeing", "737 MAX 8", "Chicago O'Hare", "KORD", "ORD", "2025-10-17 09:05"),
    ("PT-111K", "Airbus", "A330-300", "Beijing", "ZBAA", "PEK", "2025-10-11 11:40"),
    ("PT-112L", "Boeing", "767-300ER", "Dallas/Fort Worth", "KDFW", "DFW", "2025-10-15 06:10"),
    ("PT-113M", "Boeing", "757-200", "Atlanta", "KATL", "ATL", "2025-10-09 19:45"),
    ("PT-114N", "ATR", "ATR 72-600", "Belo Horizonte", "SBCF", "CNF", "2025-10-18 07:55"),
    ("PT-115O", "Bombardier", "Q400", "London Heathrow", "EGLL", "LHR", "2025-10-17 10:20"),
    ("PT-116P", "Airbus", "A380-800", "Dubai", "OMDB", "DXB", "2025-10-10 23:00"),
    ("PT-117Q", "Embraer", "E175", "Curitiba", "SBCT", "CWB", "2025-10-15 17:30"),
    ("PT-118R", "Boeing", "787-9", "Shanghai Pudong", "ZSPD", "PVG", "2025-10-13 21:10"),
    ("PT-119S", "Cessna", "Citation XLS+", "Paris Charles de Gaulle", "LFPG", "CDG", "2025-10-14 09:25"),
    ("PT-120T", "Airbus", "A321neo", "São Paulo", "SBGR", "GRU", "2025-10-18 13:40"),
    ("PT-121U", "Boeing", "747-8", "Tokyo Haneda", "RJTT", "HND", "2025-10-16 15:15"),
    ("PT-122V", "ATR", "ATR 42-500", "Belo Horizonte", "SBCF", "CNF", "2025-10-10 06:30"),
    ("PT-123W", "Airbus", "A350-900", "London Heathrow", "EGLL", "LHR", "2025-10-11 16:45"),
    ("PT-124X", "Boeing", "737-800", "Atlanta", "KATL", "ATL", "2025-10-12 11:00"),
    ("PT-125Y", "Embraer", "E195-E2", "Curitiba", "SBCT", "CWB", "2025-10-18 08:00"),
];

/// Placeholder sightings for first-run seeding.
pub fn placeholder_sightings() -> Vec<SightingDraft> {
    PLACEHOLDERS
        .iter()
        .map(
            |(tail, manufacturer, model, city, icao, iata, datetime)| SightingDraft {
                id: None,
                tail: tail.to_string(),
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
                airport_city: city.to_string(),
                airport_icao: icao.to_string(),
                airport_iata: iata.to_string(),
                datetime: datetime.to_string(),
            },
        )
        .collect()
}
