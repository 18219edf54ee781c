//! Client side of swcache.
//!
//! This crate provides the network seam, the service worker lifecycle and
//! fetch interception engine, control messaging and background sync used
//! by the server.

pub mod fetch;
pub mod worker;

#[cfg(test)]
mod testing;

pub use fetch::{FetchClient, FetchConfig, Network};

pub use worker::{
    ATTENDANCE_SYNC_TAG, AttendanceSync, ControlMessage, EventOutcome, ManifestFeed, Registration, ServiceWorker,
    UpdateFeed, WorkerContext, WorkerEvent, WorkerState,
};
