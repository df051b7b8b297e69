//! Offline cache manager.
//!
//! Models the application's service worker: a versioned worker that
//! pre-caches the app shell on install, removes stale partitions on
//! activation, and answers every in-scope GET with one of three strategies:
//! - cache-first for static assets and other requests
//! - network-first for page navigations, falling back to the cached shell
//! - network-only for cross-origin API calls
//!
//! Partitions, entries and the worker registration persist in SQLite so the
//! active version survives between runs.

mod discovery;
mod layer;
mod messages;
mod network;
mod partition;
mod request;
mod route;
mod status;
mod storage;
#[cfg(test)]
pub(crate) mod testing;
mod traits;
mod worker;

pub use messages::{ClientMessage, QrCacheEntry, WorkerMessage};
pub use network::HttpNetwork;
pub use partition::BuildVersion;
pub use request::{Method, Request};
pub use route::Scope;
pub use status::{format_bytes, status};
pub use storage::SqliteCacheStorage;
pub use worker::{ServiceWorker, WorkerSettings};
