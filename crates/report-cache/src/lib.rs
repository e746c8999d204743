//! Category-based two-tier cache for tourism report payloads
//!
//! Report endpoints consult the cache before running their aggregations.
//! Entries live as one pretty-printed JSON file per (category, parameters)
//! under a category subdirectory, with a per-instance memory tier in front.
//! Freshness is judged from the file modification time against the
//! category TTL; expired entries are removed when read, or in bulk by the
//! maintenance operations.

mod cache;
pub mod category;
pub mod disk;
pub mod error;
pub mod key;
mod maintenance;
pub mod memory;
pub mod params;
mod stats;
mod types;

pub use cache::ReportCache;
pub use category::{CacheCategory, CategoryRegistry, CategorySpec};
pub use error::{CacheError, Result};
pub use key::{build_filename, build_key, FileSlug};
pub use params::{ParamValue, ReportParams};
pub use stats::{CategoryStats, StatsReport};
pub use types::{CacheConfig, LookupCounters, LookupMetadata, LookupSource};
