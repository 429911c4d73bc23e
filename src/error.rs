//! Error types for the algorithm cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache layer and its admin surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Error reported by the primary store client
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Primary store is not connected (disconnected or reconnecting)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Store operation exceeded the command timeout
    #[error("Store operation timed out")]
    Timeout,

    /// Invalidation pattern rejected before reaching the store
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Incomplete or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// True for failures that mean "the store could not be reached".
    pub fn is_unreachable(&self) -> bool {
        match self {
            CacheError::Unavailable(_) | CacheError::Timeout => true,
            CacheError::Redis(e) => is_connection_error(e),
            _ => false,
        }
    }
}

/// Connection-class redis failures: the link is gone, not the command.
pub fn is_connection_error(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::Redis(_) | CacheError::Unavailable(_) | CacheError::Timeout => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::InvalidPattern(_) | CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Serialization(_) | CacheError::Config(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
