//! API Module
//!
//! HTTP handlers and routing for the cache's administrative surface.
//!
//! # Endpoints
//! - `GET /health` - Primary store health probe
//! - `GET /stats` - Cache statistics
//! - `POST /stats/reset` - Clear statistics counters
//! - `DELETE /cache/algorithms/:algorithm_id` - Invalidate one algorithm
//! - `DELETE /cache/symbols/:symbol` - Invalidate one symbol
//! - `POST /cache/invalidate` - Invalidate a raw pattern

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
