//! Plane-spotting logbook store: an authoritative in-memory sighting log with
//! push subscriptions and optional append-only SQLite journaling.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::SightingStore`]:
//! ```
//! use spotlog::{core::store::SightingStore, sighting::SightingDraft};
//!
//! let mut store = SightingStore::new();
//! let (id, _op) = store.upsert(SightingDraft {
//!     id: None,
//!     tail: "PT-101A".to_string(),
//!     manufacturer: "Boeing".to_string(),
//!     model: "737-800".to_string(),
//!     airport_city: "Atlanta".to_string(),
//!     airport_icao: "KATL".to_string(),
//!     airport_iata: "ATL".to_string(),
//!     datetime: "2025-10-10 08:45".to_string(),
//! }).expect("upsert");
//! assert_eq!(id, 1);
//! ```
//!
//! Runtime usage with a SQLite journal and a push subscription:
//! ```no_run
//! use spotlog::{
//!     defaults::placeholder_sightings,
//!     persist::sqlite::SqliteOpSink,
//!     runtime::handle::{spawn_spotlog, AckMode, RuntimeConfig},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteOpSink::open("spotlog.db").expect("open sqlite");
//! let store = sink.load_store().expect("replay journal");
//! let cfg = RuntimeConfig { ack_mode: AckMode::Durable, ..RuntimeConfig::default() };
//! let handle = spawn_spotlog(store, Some(Box::new(sink)), cfg);
//!
//! let sub = handle.subscribe(|view| println!("{} sightings", view.len()));
//! handle.seed_if_empty(placeholder_sightings()).await.expect("seed");
//!
//! handle.cancel(&sub);
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Airport reference rows and search.
pub mod catalog;
/// Core in-memory store and index helpers.
pub mod core;
/// Built-in airports, manufacturers and placeholder sightings.
pub mod defaults;
/// Mutation op model and persistence wrapper types.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Explicit two-step record/lookup joins.
pub mod resolve;
/// Single-writer runtime handle, events and push feed.
pub mod runtime;
/// Sighting records and drafts.
pub mod sighting;
/// Shared primitive types.
pub mod types;
