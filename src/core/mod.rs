//! In-memory authoritative store and index helpers.

/// Ordering key and index aliases.
pub mod indices;
/// Authoritative sighting store.
pub mod store;
