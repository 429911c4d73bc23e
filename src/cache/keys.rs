//! Key Module
//!
//! Typed cache keys, bucketed time-series keys and glob pattern matching.
//!
//! Every key lives under `{prefix}v{KEY_NAMESPACE_VERSION}:`. The version must be
//! bumped whenever a bucket width changes so old and new buckets never collide.

use std::borrow::Cow;
use std::fmt;

use crate::cache::Concept;

/// Namespace version embedded in every key.
pub const KEY_NAMESPACE_VERSION: u32 = 1;

/// Bucket width for stock scores and score maps (1 minute).
pub const SCORE_BUCKET_MS: u64 = 60_000;

/// Bucket width for selection results (5 minutes).
pub const SELECTION_BUCKET_MS: u64 = 300_000;

/// Coarsens a timestamp to its bucket index.
pub fn bucket(timestamp_ms: u64, width_ms: u64) -> u64 {
    timestamp_ms / width_ms
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Percent-encodes an identifier so it occupies exactly one `:`-separated segment.
fn segment(raw: &str) -> Cow<'_, str> {
    urlencoding::encode(raw)
}

// == Cache Key ==
/// A domain-level key. Callers name what they want; the builder decides the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Configuration { algorithm_id: String },
    StockScore { algorithm_id: String, symbol: String, timestamp_ms: u64 },
    MarketData { symbol: String },
    FundamentalData { symbol: String },
    SelectionResults { algorithm_id: String, timestamp_ms: u64 },
    Factors { symbol: String },
    DataQuality { symbol: String },
}

impl CacheKey {
    pub fn configuration(algorithm_id: impl Into<String>) -> Self {
        CacheKey::Configuration {
            algorithm_id: algorithm_id.into(),
        }
    }

    pub fn stock_score(algorithm_id: impl Into<String>, symbol: &str, timestamp_ms: u64) -> Self {
        CacheKey::StockScore {
            algorithm_id: algorithm_id.into(),
            symbol: normalize_symbol(symbol),
            timestamp_ms,
        }
    }

    pub fn market_data(symbol: &str) -> Self {
        CacheKey::MarketData {
            symbol: normalize_symbol(symbol),
        }
    }

    pub fn fundamental_data(symbol: &str) -> Self {
        CacheKey::FundamentalData {
            symbol: normalize_symbol(symbol),
        }
    }

    pub fn selection_results(algorithm_id: impl Into<String>, timestamp_ms: u64) -> Self {
        CacheKey::SelectionResults {
            algorithm_id: algorithm_id.into(),
            timestamp_ms,
        }
    }

    pub fn factors(symbol: &str) -> Self {
        CacheKey::Factors {
            symbol: normalize_symbol(symbol),
        }
    }

    pub fn data_quality(symbol: &str) -> Self {
        CacheKey::DataQuality {
            symbol: normalize_symbol(symbol),
        }
    }

    pub fn concept(&self) -> Concept {
        match self {
            CacheKey::Configuration { .. } => Concept::Configuration,
            CacheKey::StockScore { .. } => Concept::StockScores,
            CacheKey::MarketData { .. } => Concept::MarketData,
            CacheKey::FundamentalData { .. } => Concept::FundamentalData,
            CacheKey::SelectionResults { .. } => Concept::SelectionResults,
            CacheKey::Factors { .. } => Concept::Factors,
            CacheKey::DataQuality { .. } => Concept::DataQuality,
        }
    }

    /// Key path below the versioned prefix.
    fn path(&self) -> String {
        match self {
            CacheKey::Configuration { algorithm_id } => format!("algo:{}:config", segment(algorithm_id)),
            CacheKey::StockScore {
                algorithm_id,
                symbol,
                timestamp_ms,
            } => format!(
                "algo:{}:scores:{}:{}",
                segment(algorithm_id),
                segment(symbol),
                bucket(*timestamp_ms, SCORE_BUCKET_MS)
            ),
            CacheKey::SelectionResults {
                algorithm_id,
                timestamp_ms,
            } => format!(
                "algo:{}:selection:{}",
                segment(algorithm_id),
                bucket(*timestamp_ms, SELECTION_BUCKET_MS)
            ),
            CacheKey::MarketData { symbol } => format!("symbol:{}:market", segment(symbol)),
            CacheKey::FundamentalData { symbol } => format!("symbol:{}:fundamentals", segment(symbol)),
            CacheKey::Factors { symbol } => format!("symbol:{}:factors", segment(symbol)),
            CacheKey::DataQuality { symbol } => format!("symbol:{}:quality", segment(symbol)),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

// == Key Builder ==
/// Renders typed keys and patterns under one versioned namespace.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    namespace: String,
}

impl KeyBuilder {
    pub fn new(prefix: &str) -> Self {
        Self {
            namespace: format!("{}v{}:", prefix, KEY_NAMESPACE_VERSION),
        }
    }

    /// The versioned prefix every key starts with.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.namespace, key.path())
    }

    pub fn score_map(&self, algorithm_id: &str, timestamp_ms: u64) -> String {
        format!(
            "{}algo:{}:scoremap:{}",
            self.namespace,
            segment(algorithm_id),
            bucket(timestamp_ms, SCORE_BUCKET_MS)
        )
    }

    pub fn universe(&self, algorithm_id: &str) -> String {
        format!("{}algo:{}:universe", self.namespace, segment(algorithm_id))
    }

    pub fn universe_meta(&self, algorithm_id: &str) -> String {
        format!("{}algo:{}:universe:meta", self.namespace, segment(algorithm_id))
    }

    /// Prefixes a caller pattern with the namespace.
    pub fn pattern(&self, relative: &str) -> String {
        format!("{}{}", escape_glob(&self.namespace), relative)
    }

    /// Pattern covering every entry written for one algorithm.
    pub fn algorithm_pattern(algorithm_id: &str) -> String {
        format!("algo:{}:*", escape_glob(&segment(algorithm_id)))
    }

    /// Patterns covering every entry written for one symbol, across concepts.
    pub fn symbol_patterns(symbol: &str) -> [String; 2] {
        let symbol = escape_glob(&segment(&normalize_symbol(symbol)));
        [
            format!("symbol:{}:*", symbol),
            format!("algo:*:scores:{}:*", symbol),
        ]
    }
}

// == Glob Matching ==
/// Escapes glob metacharacters so `text` only matches itself.
pub fn escape_glob(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Redis `KEYS`-style glob match: `*`, `?`, `[abc]`, `[^a-z]`, `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    // Last `*` seen in the pattern and the text position it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(&p, pi, t[ti]) {
                        if matched {
                            pi = next;
                            ti += 1;
                            continue;
                        }
                    } else if t[ti] == '[' {
                        // Unterminated class is a literal '['.
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((star_pi, star_ti)) => {
                pi = star_pi + 1;
                ti = star_ti + 1;
                star = Some((star_pi, star_ti + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Matches `c` against the class starting at `p[start] == '['`.
/// Returns `(matched, index after ']')`, or `None` when the class is unterminated.
fn match_class(p: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = i < p.len() && p[i] == '^';
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    while i < p.len() {
        if p[i] == ']' && !first {
            return Some((matched != negate, i + 1));
        }
        first = false;

        let lo = if p[i] == '\\' && i + 1 < p.len() {
            i += 1;
            p[i]
        } else {
            p[i]
        };

        if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
            let hi = p[i + 2];
            let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            if c >= lo && c <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if c == lo {
                matched = true;
            }
            i += 1;
        }
    }
    None
}
