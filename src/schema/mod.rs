//! Stored document schema
//!
//! Decoding of Extended JSON documents into typed records, and loading of
//! whole snapshots of the `users`, `member_visits` and `facilities`
//! collections.

mod document;
mod snapshot;

pub use document::*;
pub use snapshot::*;
