//! Diagnostics surface over a running registry.

pub mod api;

pub use api::{health, snapshot, snapshot_json, Health, PoolSnapshot, RegistrySnapshot};
