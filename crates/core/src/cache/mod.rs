//! SQLite-backed cache stores of request/response pairs.
//!
//! This module provides named, versioned stores persisted in SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Request identity keys using SHA-256 over method and URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Store enumeration and deletion by name (the only eviction path)

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod naming;
pub mod stores;

pub use crate::Error;

pub use connection::CacheStorage;
pub use entries::CacheStore;
pub use naming::CacheNames;
pub use stores::StoreInfo;
