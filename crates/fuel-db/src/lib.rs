//! Sqlite-backed storage layer for Fuel's task/epic/run/review/health data model.
//!
//! This crate owns the schema, the connection pool, and hand-written query functions per
//! entity. It has no scheduling or supervision logic; that lives in `fuel-core`, which
//! depends on this crate.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
