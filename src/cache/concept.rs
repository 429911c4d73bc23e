//! Concept Module
//!
//! Named categories of cached data and the TTL policy table that governs them.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::{CacheError, Result};

/// Upper bound for market-sensitive concepts.
pub const MAX_MARKET_SENSITIVE_TTL: Duration = Duration::from_secs(300);

/// Lower bound for slow-changing concepts.
pub const MIN_SLOW_CHANGING_TTL: Duration = Duration::from_secs(3600);

// == Concept ==
/// A category of cached data with its own TTL and key rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Concept {
    Configuration,
    StockScores,
    MarketData,
    FundamentalData,
    SelectionResults,
    Universe,
    Factors,
    DataQuality,
}

impl Concept {
    pub const ALL: [Concept; 8] = [
        Concept::Configuration,
        Concept::StockScores,
        Concept::MarketData,
        Concept::FundamentalData,
        Concept::SelectionResults,
        Concept::Universe,
        Concept::Factors,
        Concept::DataQuality,
    ];

    /// Concepts whose data follows the live market.
    pub fn is_market_sensitive(self) -> bool {
        matches!(self, Concept::MarketData | Concept::StockScores)
    }

    /// Concepts that change on the order of hours or days.
    pub fn is_slow_changing(self) -> bool {
        matches!(
            self,
            Concept::Configuration | Concept::Universe | Concept::FundamentalData
        )
    }

    /// Suffix used in `CACHE_TTL_<NAME>` environment variables.
    pub fn env_name(self) -> &'static str {
        match self {
            Concept::Configuration => "CONFIGURATION",
            Concept::StockScores => "STOCK_SCORES",
            Concept::MarketData => "MARKET_DATA",
            Concept::FundamentalData => "FUNDAMENTAL_DATA",
            Concept::SelectionResults => "SELECTION_RESULTS",
            Concept::Universe => "UNIVERSE",
            Concept::Factors => "FACTORS",
            Concept::DataQuality => "DATA_QUALITY",
        }
    }

    fn default_ttl(self) -> Duration {
        let secs = match self {
            Concept::Configuration => 3600,
            Concept::StockScores => 300,
            Concept::MarketData => 300,
            Concept::FundamentalData => 3600,
            Concept::SelectionResults => 600,
            Concept::Universe => 3600,
            Concept::Factors => 900,
            Concept::DataQuality => 1800,
        };
        Duration::from_secs(secs)
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Concept::Configuration => "configuration",
            Concept::StockScores => "stockScores",
            Concept::MarketData => "marketData",
            Concept::FundamentalData => "fundamentalData",
            Concept::SelectionResults => "selectionResults",
            Concept::Universe => "universe",
            Concept::Factors => "factors",
            Concept::DataQuality => "dataQuality",
        };
        f.write_str(name)
    }
}

// == Freshness ==
/// Caller-selected market data freshness; picks the TTL for market data writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    RealTime,
    Delayed,
}

// == TTL Policy ==
/// Static mapping from concept to TTL, plus the real-time market data override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    ttls: BTreeMap<Concept, Duration>,
    real_time_market_data: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            ttls: Concept::ALL.iter().map(|c| (*c, c.default_ttl())).collect(),
            real_time_market_data: Duration::from_secs(60),
        }
    }
}

impl TtlPolicy {
    /// Builds a policy from explicit entries. Missing concepts are caught by `validate`.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (Concept, Duration)>,
        real_time_market_data: Duration,
    ) -> Self {
        Self {
            ttls: entries.into_iter().collect(),
            real_time_market_data,
        }
    }

    /// Replaces the TTL of one concept.
    pub fn with_ttl(mut self, concept: Concept, ttl: Duration) -> Self {
        self.ttls.insert(concept, ttl);
        self
    }

    pub fn with_real_time_market_data(mut self, ttl: Duration) -> Self {
        self.real_time_market_data = ttl;
        self
    }

    /// Policy TTL for a concept. Only valid on a validated policy.
    pub fn ttl(&self, concept: Concept) -> Duration {
        self.ttls
            .get(&concept)
            .copied()
            .unwrap_or_else(|| concept.default_ttl())
    }

    pub fn market_data_ttl(&self, freshness: Freshness) -> Duration {
        match freshness {
            Freshness::RealTime => self.real_time_market_data,
            Freshness::Delayed => self.ttl(Concept::MarketData),
        }
    }

    /// Checks completeness and the freshness bounds.
    pub fn validate(&self) -> Result<()> {
        for concept in Concept::ALL {
            let ttl = self.ttls.get(&concept).copied().ok_or_else(|| {
                CacheError::Config(format!("TTL policy has no entry for {}", concept))
            })?;

            if ttl.is_zero() {
                return Err(CacheError::Config(format!("TTL for {} must be non-zero", concept)));
            }
            if concept.is_market_sensitive() && ttl > MAX_MARKET_SENSITIVE_TTL {
                return Err(CacheError::Config(format!(
                    "TTL for {} is {}s, market-sensitive data allows at most {}s",
                    concept,
                    ttl.as_secs(),
                    MAX_MARKET_SENSITIVE_TTL.as_secs()
                )));
            }
            if concept.is_slow_changing() && ttl < MIN_SLOW_CHANGING_TTL {
                return Err(CacheError::Config(format!(
                    "TTL for {} is {}s, slow-changing data requires at least {}s",
                    concept,
                    ttl.as_secs(),
                    MIN_SLOW_CHANGING_TTL.as_secs()
                )));
            }
        }

        let delayed = self.ttl(Concept::MarketData);
        if self.real_time_market_data.is_zero() || self.real_time_market_data > delayed {
            return Err(CacheError::Config(format!(
                "real-time market data TTL must be in 1..={}s",
                delayed.as_secs()
            )));
        }

        Ok(())
    }

    /// All entries, for reporting.
    pub fn entries(&self) -> impl Iterator<Item = (Concept, Duration)> + '_ {
        self.ttls.iter().map(|(c, d)| (*c, *d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = TtlPolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.ttl(Concept::Configuration), Duration::from_secs(3600));
        assert_eq!(policy.market_data_ttl(Freshness::RealTime), Duration::from_secs(60));
        assert_eq!(policy.market_data_ttl(Freshness::Delayed), Duration::from_secs(300));
    }

    #[test]
    fn test_incomplete_policy_rejected() {
        let policy = TtlPolicy::from_entries(
            [(Concept::Configuration, Duration::from_secs(3600))],
            Duration::from_secs(60),
        );
        let err = policy.validate().unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn test_market_data_bound_enforced() {
        let policy = TtlPolicy::default().with_ttl(Concept::MarketData, Duration::from_secs(301));
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_slow_changing_bound_enforced() {
        let policy = TtlPolicy::default().with_ttl(Concept::Universe, Duration::from_secs(60));
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let policy = TtlPolicy::default().with_ttl(Concept::Factors, Duration::ZERO);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_real_time_override_cannot_exceed_delayed() {
        let policy = TtlPolicy::default().with_real_time_market_data(Duration::from_secs(600));
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_concept_display() {
        assert_eq!(Concept::MarketData.to_string(), "marketData");
        assert_eq!(Concept::DataQuality.to_string(), "dataQuality");
    }
}
