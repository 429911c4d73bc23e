//! Algo Cache - concept-keyed caching for algorithm services
//!
//! A Redis-backed cache facade with per-concept TTL policy, bucketed
//! time-series keys, pipelined batch reads and an in-memory fallback store,
//! plus a small administrative HTTP surface.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheFacade, CacheKey, Concept, Freshness, TtlPolicy};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_sweep_task;
