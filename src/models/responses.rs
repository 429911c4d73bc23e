//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, ConnectionState, HealthReport, HealthStatus};

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub connection_state: ConnectionState,
    pub fallback_active: bool,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        Self {
            status: report.status,
            latency_ms: report.latency_ms,
            error: report.error,
            connection_state: report.connection_state,
            fallback_active: report.fallback_active,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Reads counted since the last reset
    pub total_operations: u64,
    /// Hit rate (hits / (hits + misses)), two decimals
    pub hit_rate: f64,
    pub fallback_operations: u64,
    pub primary_errors: u64,
    /// Keys currently held by the fallback store
    pub fallback_entries: usize,
    pub fallback_evictions: u64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            total_operations: stats.total_operations,
            hit_rate: stats.hit_rate,
            fallback_operations: stats.fallback_operations,
            primary_errors: stats.primary_errors,
            fallback_entries: stats.fallback_entries,
            fallback_evictions: stats.fallback_evictions,
        }
    }
}

/// Response body for the invalidation endpoints
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Pattern applied, relative to the key namespace
    pub pattern: String,
    /// Number of keys removed
    pub removed: u64,
}

impl InvalidateResponse {
    pub fn new(pattern: impl Into<String>, removed: u64) -> Self {
        Self {
            pattern: pattern.into(),
            removed,
        }
    }
}

/// Response body for POST /stats/reset
#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub message: String,
}

impl ResetResponse {
    pub fn new() -> Self {
        Self {
            message: "Statistics reset".to_string(),
        }
    }
}

impl Default for ResetResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_uses_camel_case() {
        let resp = HealthResponse::from(HealthReport {
            status: HealthStatus::Unhealthy,
            latency_ms: 3,
            error: Some("Store unavailable: redis is reconnecting".to_string()),
            connection_state: ConnectionState::Reconnecting,
            fallback_active: true,
        });
        let json = serde_json::to_value(&resp).unwrap();

        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["latencyMs"], 3);
        assert_eq!(json["connectionState"], "reconnecting");
        assert_eq!(json["fallbackActive"], true);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_healthy_response_omits_error() {
        let resp = HealthResponse::from(HealthReport {
            status: HealthStatus::Healthy,
            latency_ms: 1,
            error: None,
            connection_state: ConnectionState::Connected,
            fallback_active: false,
        });
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("error"));
        assert!(json.contains("healthy"));
    }

    #[test]
    fn test_stats_response_from_stats() {
        let resp = StatsResponse::from(CacheStats {
            hits: 3,
            misses: 4,
            total_operations: 7,
            hit_rate: 0.43,
            ..CacheStats::default()
        });
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["hit_rate"], 0.43);
        assert_eq!(json["total_operations"], 7);
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}
