//! Caching layer — key derivation, per-key request entries, and the registry that owns them.
//!
//! - [`derive_key`] turns a request input into a canonical string key.
//! - [`RequestEntry`] holds the cache/dedup state of one key.
//! - [`Registry`] maps keys to entries for a single engine.

pub mod entry;
pub mod key;
pub mod registry;

pub use entry::{Outcome, RequestEntry};
pub use key::{derive_key, sort_object_keys};
pub use registry::Registry;
