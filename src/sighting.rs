//! Sighting record, draft, and datetime ordering key.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{core::store::StoreError, types::SightingId};

/// Display format of [`Sighting::datetime`].
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

const ACCEPTED_FORMATS: [&str; 4] = [
    DATETIME_FORMAT,
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Fully materialized, stored sighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sighting {
    /// Stable store-assigned identifier.
    pub id: SightingId,
    /// Aircraft registration as entered.
    pub tail: String,
    /// Aircraft manufacturer.
    pub manufacturer: String,
    /// Aircraft model.
    pub model: String,
    /// City of the spotting airport.
    pub airport_city: String,
    /// ICAO code of the spotting airport.
    pub airport_icao: String,
    /// IATA code of the spotting airport.
    pub airport_iata: String,
    /// Sighting time, `yyyy-MM-dd HH:mm`.
    pub datetime: String,
}

impl Sighting {
    /// Case-folded tail used for lookup and tail-based deletion.
    pub fn tail_key(&self) -> String {
        normalize_tail(&self.tail)
    }

    /// Ordering key derived from [`Sighting::datetime`].
    pub fn spotted_at(&self) -> SpottedAt {
        SpottedAt::parse(&self.datetime)
    }

    /// Turns this record back into a draft that replaces it on upsert.
    pub fn into_draft(self) -> SightingDraft {
        SightingDraft {
            id: Some(self.id),
            tail: self.tail,
            manufacturer: self.manufacturer,
            model: self.model,
            airport_city: self.airport_city,
            airport_icao: self.airport_icao,
            airport_iata: self.airport_iata,
            datetime: self.datetime,
        }
    }
}

/// Upsert payload. `id` is `None` for a new sighting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SightingDraft {
    /// Id of the record to replace, if any.
    pub id: Option<SightingId>,
    /// Aircraft registration as entered.
    pub tail: String,
    /// Aircraft manufacturer.
    pub manufacturer: String,
    /// Aircraft model.
    pub model: String,
    /// City of the spotting airport.
    pub airport_city: String,
    /// ICAO code of the spotting airport.
    pub airport_icao: String,
    /// IATA code of the spotting airport.
    pub airport_iata: String,
    /// Sighting time, `yyyy-MM-dd HH:mm`.
    pub datetime: String,
}

impl SightingDraft {
    /// Rejects drafts with a blank tail, manufacturer, model or datetime.
    pub fn validate(&self) -> Result<(), StoreError> {
        let required = [
            ("tail", &self.tail),
            ("manufacturer", &self.manufacturer),
            ("model", &self.model),
            ("datetime", &self.datetime),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(StoreError::Validation { field });
            }
        }
        Ok(())
    }

    pub(crate) fn into_sighting(self, id: SightingId) -> Sighting {
        Sighting {
            id,
            tail: self.tail,
            manufacturer: self.manufacturer,
            model: self.model,
            airport_city: self.airport_city,
            airport_icao: self.airport_icao,
            airport_iata: self.airport_iata,
            datetime: self.datetime,
        }
    }
}

impl From<Sighting> for SightingDraft {
    fn from(value: Sighting) -> Self {
        value.into_draft()
    }
}

/// Sort key for the display datetime.
///
/// Parsable values order chronologically and rank above unparsable ones,
/// which fall back to plain string order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpottedAt {
    /// Value that matched none of the accepted formats.
    Unparsed(String),
    /// Parsed wall-clock time.
    At(NaiveDateTime),
}

impl SpottedAt {
    /// Parses `raw`, falling back to [`SpottedAt::Unparsed`].
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        ACCEPTED_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .map(Self::At)
            .unwrap_or_else(|| Self::Unparsed(trimmed.to_string()))
    }
}

/// Trims and upper-cases a tail number for case-insensitive matching.
pub fn normalize_tail(tail: &str) -> String {
    tail.trim().to_uppercase()
}
