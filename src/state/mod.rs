//! Persisted project state.
//!
//! `store` defines the persistence seam and its file/in-memory backends;
//! `migration` upgrades older documents and normalizes a project after load.

pub mod migration;
pub mod store;

pub use migration::{decode_project, encode_project, recover, RecoveryReport, SCHEMA_VERSION};
pub use store::{FileStore, MemoryStore, Persistence};
