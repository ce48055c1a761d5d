//! In-memory authoritative record store.

/// Revision-keyed observation groups and the merged view over them.
pub mod store;
