//! Cache types

use crate::category::CategoryRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the last lookup was answered from, or why it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSource {
    Memory,
    Disk,
    Miss,
    Expired,
    ReadError,
    DecodeError,
    Write,
    WriteError,
    UnknownCategory,
}

impl LookupSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LookupSource::Memory => "memory",
            LookupSource::Disk => "disk",
            LookupSource::Miss => "miss",
            LookupSource::Expired => "expired",
            LookupSource::ReadError => "read_error",
            LookupSource::DecodeError => "decode_error",
            LookupSource::Write => "write",
            LookupSource::WriteError => "write_error",
            LookupSource::UnknownCategory => "unknown_category",
        }
    }
}

/// Diagnostic record of the last `get`/`set`, e.g. for `X-Cache-*` headers.
/// Never affects what the cache returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupMetadata {
    pub category: String,
    pub hit: bool,
    pub source: LookupSource,
    pub ttl: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Process-local lookup counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupCounters {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub write_failures: u64,
}

impl LookupCounters {
    /// Share of lookups answered by either tier (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.disk_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Configuration for a report cache instance
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    pub registry: CategoryRegistry,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            registry: CategoryRegistry::standard(),
        }
    }
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.cache_dir, PathBuf::from("./cache"));
        assert_eq!(config.registry.len(), 18);
    }

    #[test]
    fn test_counters_hit_rate() {
        assert_eq!(LookupCounters::default().hit_rate(), 0.0);
        let counters = LookupCounters {
            memory_hits: 2,
            disk_hits: 1,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(counters.hit_rate(), 0.75);
    }

    #[test]
    fn test_metadata_serialization() {
        let meta = LookupMetadata {
            category: "tdb_comparison".to_string(),
            hit: false,
            source: LookupSource::DecodeError,
            ttl: 1800,
            expires_at: None,
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains(r#""source":"decode_error""#));
        assert!(!json.contains("expires_at"));
    }

    #[test]
    fn test_source_as_str_matches_serde() {
        for source in [LookupSource::Memory, LookupSource::ReadError, LookupSource::UnknownCategory] {
            let json = serde_json::to_string(&source).unwrap();
            assert_eq!(json, format!("\"{}\"", source.as_str()));
        }
    }
}
