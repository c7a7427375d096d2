//! # mpgate-store
//!
//! SQLite-backed configuration store for the gateway: tenant credentials,
//! per-category feature flags and auto-reply rule documents.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection`; async callers are expected to move work onto a
//! blocking thread.

pub mod database;
pub mod migrations;
pub mod models;
pub mod rules;
pub mod tenants;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
