//! Core types and shared functionality for swcache.
//!
//! This crate provides:
//! - Versioned cache stores with a SQLite backend
//! - Request/response model shared by the fetch engine and the stores
//! - The resource classifier and its caching policy table
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod request;
pub mod response;

pub use cache::{CacheNames, CacheStorage, CacheStore};
pub use classify::{CachingStrategy, ClassifierRules, ResourceCategory, classify};
pub use config::AppConfig;
pub use error::Error;
pub use request::{Request, RequestMode};
pub use response::{Headers, Response, ResponseSource, ResponseType};
