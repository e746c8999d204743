//! Two-tier report cache: memory first, then disk

use crate::category::{CacheCategory, CategoryRegistry, CategorySpec};
use crate::disk::{is_expired, DiskLookup, DiskTier};
use crate::key::{build_filename, build_key};
use crate::memory::MemoryTier;
use crate::params::ReportParams;
use crate::types::{CacheConfig, LookupCounters, LookupMetadata, LookupSource};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Cache of computed report payloads, grouped by category.
///
/// Construct one per process and share it (`Arc<ReportCache>`). A memory
/// hit is only served while the entry's file on disk still has the same
/// modification time, so overwrites and purges by other processes are seen
/// on the next lookup. Lookups and writes never fail: every problem degrades to a miss (`None`) or an
/// unsuccessful write (`false`), and the caller recomputes.
pub struct ReportCache {
    pub(crate) registry: CategoryRegistry,
    pub(crate) disk: DiskTier,
    pub(crate) memory: MemoryTier,
    last_lookup: RwLock<Option<LookupMetadata>>,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    write_failures: AtomicU64,
}

impl ReportCache {
    pub fn new(config: CacheConfig) -> Self {
        info!(
            cache_dir = ?config.cache_dir,
            categories = config.registry.len(),
            "Report cache initialized"
        );
        Self {
            registry: config.registry,
            disk: DiskTier::new(config.cache_dir),
            memory: MemoryTier::new(),
            last_lookup: RwLock::new(None),
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        self.disk.base_dir()
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    /// TTL in seconds, or `None` if the category is not enabled
    pub fn get_category_ttl(&self, category: CacheCategory) -> Option<u64> {
        self.registry.ttl_secs(category)
    }

    /// Cached payload for `(category, params)`, or `None` if it must be
    /// recomputed.
    pub async fn get(&self, category: CacheCategory, params: &ReportParams) -> Option<Value> {
        self.lookup(category, params).await.0
    }

    /// Like [`get`](Self::get), also returning the lookup diagnostics
    pub async fn lookup(
        &self,
        category: CacheCategory,
        params: &ReportParams,
    ) -> (Option<Value>, LookupMetadata) {
        let (value, meta) = self.lookup_inner(category, params).await;
        match meta.source {
            LookupSource::Memory => self.memory_hits.fetch_add(1, Ordering::Relaxed),
            LookupSource::Disk => self.disk_hits.fetch_add(1, Ordering::Relaxed),
            _ => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        *self.last_lookup.write().await = Some(meta.clone());
        (value, meta)
    }

    async fn lookup_inner(
        &self,
        category: CacheCategory,
        params: &ReportParams,
    ) -> (Option<Value>, LookupMetadata) {
        let Some(spec) = self.registry.get(category) else {
            warn!(category = %category, "Lookup for unregistered cache category");
            return (None, unknown_category(category));
        };

        let key = build_key(category, params);
        let file_name = build_filename(category, params);
        let now = SystemTime::now();

        if let Some(entry) = self.memory.get(&key).await {
            if is_expired(entry.stored_at, spec.ttl_secs, now) {
                self.memory.evict_if_stale(&key, spec.ttl_secs, now).await;
                debug!(key = %key, "Memory entry expired");
            } else if self.disk.modified(spec, &file_name).await.ok().flatten()
                == Some(entry.stored_at)
            {
                debug!(key = %key, "Cache hit (memory)");
                let meta = metadata(spec, LookupSource::Memory, Some(entry.stored_at));
                return (Some(entry.data), meta);
            } else {
                // Rewritten or removed on disk, possibly by another process.
                self.memory.remove(&key).await;
                debug!(key = %key, "Memory entry no longer matches disk");
            }
        }

        let (bytes, modified) = match self.disk.load(spec, &file_name, now).await {
            Ok(DiskLookup::Fresh { bytes, modified }) => (bytes, modified),
            Ok(DiskLookup::Missing) => {
                debug!(key = %key, "Cache miss");
                return (None, metadata(spec, LookupSource::Miss, None));
            }
            Ok(DiskLookup::Expired) => {
                return (None, metadata(spec, LookupSource::Expired, None));
            }
            Err(e) => {
                warn!(category = %category, file = %file_name, error = %e, "Failed to read cache file");
                return (None, metadata(spec, LookupSource::ReadError, None));
            }
        };

        // A malformed file is left in place; it is overwritten by the next
        // successful set or removed once it expires.
        let data = match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Null) => {
                warn!(category = %category, file = %file_name, "Cache file holds null");
                return (None, metadata(spec, LookupSource::DecodeError, None));
            }
            Ok(data) => data,
            Err(e) => {
                warn!(category = %category, file = %file_name, error = %e, "Failed to decode cache file");
                return (None, metadata(spec, LookupSource::DecodeError, None));
            }
        };

        self.memory.put(key.clone(), data.clone(), modified).await;
        debug!(key = %key, "Cache hit (disk)");
        (Some(data), metadata(spec, LookupSource::Disk, Some(modified)))
    }

    /// Store a payload. Returns `false` if nothing was stored.
    pub async fn set(&self, category: CacheCategory, params: &ReportParams, data: &Value) -> bool {
        let meta = self.store(category, params, data).await;
        let stored = meta.source == LookupSource::Write;
        if stored {
            self.writes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
        *self.last_lookup.write().await = Some(meta);
        stored
    }

    async fn store(
        &self,
        category: CacheCategory,
        params: &ReportParams,
        data: &Value,
    ) -> LookupMetadata {
        let Some(spec) = self.registry.get(category) else {
            warn!(category = %category, "Write to unregistered cache category");
            return unknown_category(category);
        };
        if data.is_null() {
            debug!(category = %category, "Refusing to cache a null payload");
            return metadata(spec, LookupSource::WriteError, None);
        }

        let bytes = match serde_json::to_vec_pretty(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(category = %category, error = %e, "Failed to encode cache payload");
                return metadata(spec, LookupSource::WriteError, None);
            }
        };

        let file_name = build_filename(category, params);
        let modified = match self.disk.write(spec, &file_name, &bytes).await {
            Ok(modified) => modified,
            Err(e) => {
                warn!(category = %category, file = %file_name, error = %e, "Failed to write cache file");
                self.memory.remove(&build_key(category, params)).await;
                return metadata(spec, LookupSource::WriteError, None);
            }
        };

        self.memory
            .put(build_key(category, params), data.clone(), modified)
            .await;
        debug!(category = %category, file = %file_name, size = bytes.len(), "Cached report");
        metadata(spec, LookupSource::Write, Some(modified))
    }

    /// Diagnostics of the most recent `get`/`lookup`/`set` on this instance
    pub async fn last_lookup(&self) -> Option<LookupMetadata> {
        self.last_lookup.read().await.clone()
    }

    pub fn counters(&self) -> LookupCounters {
        LookupCounters {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

fn metadata(
    spec: &CategorySpec,
    source: LookupSource,
    stored_at: Option<SystemTime>,
) -> LookupMetadata {
    let hit = matches!(source, LookupSource::Memory | LookupSource::Disk);
    let expires_at = stored_at
        .map(|t| DateTime::<Utc>::from(t + Duration::from_secs(spec.ttl_secs)));
    LookupMetadata {
        category: spec.category.name().to_string(),
        hit,
        source,
        ttl: spec.ttl_secs,
        expires_at,
    }
}

fn unknown_category(category: CacheCategory) -> LookupMetadata {
    LookupMetadata {
        category: category.name().to_string(),
        hit: false,
        source: LookupSource::UnknownCategory,
        ttl: 0,
        expires_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use serde_json::json;
    use tempfile::tempdir;

    fn cantal_params() -> ReportParams {
        ReportParams::new()
            .with("zone", "CANTAL")
            .with("annee", 2024)
            .with("periode", "hiver")
            .with("limit", 15)
    }

    fn cache_in(dir: &Path) -> ReportCache {
        ReportCache::new(CacheConfig::new(dir))
    }

    fn age_file(path: &Path, age_secs: u64) {
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        filetime::set_file_mtime(path, FileTime::from_system_time(mtime)).unwrap();
    }

    fn entry_path(cache: &ReportCache, category: CacheCategory, params: &ReportParams) -> std::path::PathBuf {
        let spec = cache.registry.get(category).unwrap();
        cache.disk.file_path(spec, &build_filename(category, params))
    }

    #[tokio::test]
    async fn test_set_then_get_round_trip() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        let data = json!({"rows": [{"departement": "Puy-de-Dôme", "nuitees": 1523}]});

        assert!(cache.set(CacheCategory::TdbDepartementsTouristes, &cantal_params(), &data).await);
        let got = cache.get(CacheCategory::TdbDepartementsTouristes, &cantal_params()).await;
        assert_eq!(got, Some(data));

        let meta = cache.last_lookup().await.unwrap();
        assert!(meta.hit);
        assert_eq!(meta.source, LookupSource::Memory);
        assert_eq!(meta.ttl, 3600);
        assert!(meta.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_file_is_pretty_and_unescaped() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        let data = json!({"zone": "Puy-de-Dôme"});
        assert!(cache.set(CacheCategory::TdbComparison, &cantal_params(), &data).await);

        let text =
            std::fs::read_to_string(entry_path(&cache, CacheCategory::TdbComparison, &cantal_params()))
                .unwrap();
        assert!(text.contains("Puy-de-Dôme"));
        assert!(text.contains('\n'));
    }

    #[tokio::test]
    async fn test_disk_hit_populates_memory() {
        let dir = tempdir().unwrap();
        let data = json!({"total": 42});
        {
            let writer = cache_in(dir.path());
            assert!(writer.set(CacheCategory::TdbFilters, &cantal_params(), &data).await);
        }

        // A fresh instance has an empty memory tier.
        let cache = cache_in(dir.path());
        let (value, meta) = cache.lookup(CacheCategory::TdbFilters, &cantal_params()).await;
        assert_eq!(value, Some(data.clone()));
        assert_eq!(meta.source, LookupSource::Disk);

        let (value, meta) = cache.lookup(CacheCategory::TdbFilters, &cantal_params()).await;
        assert_eq!(value, Some(data));
        assert_eq!(meta.source, LookupSource::Memory);

        let counters = cache.counters();
        assert_eq!(counters.disk_hits, 1);
        assert_eq!(counters.memory_hits, 1);
    }

    #[tokio::test]
    async fn test_miss_on_different_params() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        assert!(cache.set(CacheCategory::TdbDepartementsTouristes, &cantal_params(), &json!([1])).await);

        let other = cantal_params().with("limit", 16);
        let (value, meta) = cache.lookup(CacheCategory::TdbDepartementsTouristes, &other).await;
        assert_eq!(value, None);
        assert!(!meta.hit);
        assert_eq!(meta.source, LookupSource::Miss);
        assert_eq!(cache.counters().misses, 1);
    }

    #[tokio::test]
    async fn test_expired_file_is_deleted_on_get() {
        let dir = tempdir().unwrap();
        let data = json!({"rows": []});
        {
            let writer = cache_in(dir.path());
            assert!(writer.set(CacheCategory::TdbComparison, &cantal_params(), &data).await);
        }
        let cache = cache_in(dir.path());
        let path = entry_path(&cache, CacheCategory::TdbComparison, &cantal_params());
        age_file(&path, 1801);

        let (value, meta) = cache.lookup(CacheCategory::TdbComparison, &cantal_params()).await;
        assert_eq!(value, None);
        assert_eq!(meta.source, LookupSource::Expired);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stale_memory_entry_is_not_served() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        let params = cantal_params();
        let key = build_key(CacheCategory::TdbComparison, &params);
        cache
            .memory
            .put(key.clone(), json!("stale"), SystemTime::now() - Duration::from_secs(4000))
            .await;

        let (value, meta) = cache.lookup(CacheCategory::TdbComparison, &params).await;
        assert_eq!(value, None);
        assert_eq!(meta.source, LookupSource::Miss);
        assert!(cache.memory.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_decode_error_keeps_file() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        let path = entry_path(&cache, CacheCategory::TdbFilters, &cantal_params());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{\"rows\": [").unwrap();

        let (value, meta) = cache.lookup(CacheCategory::TdbFilters, &cantal_params()).await;
        assert_eq!(value, None);
        assert_eq!(meta.source, LookupSource::DecodeError);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unknown_category_is_rejected() {
        let dir = tempdir().unwrap();
        let config = CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            registry: CategoryRegistry::standard().only(&[CacheCategory::TdbComparison]),
        };
        let cache = ReportCache::new(config);

        assert!(!cache.set(CacheCategory::TdbFilters, &cantal_params(), &json!(1)).await);
        assert_eq!(
            cache.last_lookup().await.unwrap().source,
            LookupSource::UnknownCategory
        );
        let (value, meta) = cache.lookup(CacheCategory::TdbFilters, &cantal_params()).await;
        assert_eq!(value, None);
        assert!(!meta.hit);
        assert_eq!(meta.source, LookupSource::UnknownCategory);
        assert_eq!(cache.get_category_ttl(CacheCategory::TdbFilters), None);
        assert_eq!(cache.get_category_ttl(CacheCategory::TdbComparison), Some(1800));
        assert!(!dir.path().join("tableau_bord").exists());
    }

    #[tokio::test]
    async fn test_null_payload_is_rejected() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        assert!(!cache.set(CacheCategory::TdbFilters, &cantal_params(), &Value::Null).await);
        assert!(!entry_path(&cache, CacheCategory::TdbFilters, &cantal_params()).exists());
        assert_eq!(cache.counters().write_failures, 1);
    }

    #[tokio::test]
    async fn test_write_failure_returns_false() {
        let dir = tempdir().unwrap();
        // A regular file where the category directory should be.
        std::fs::write(dir.path().join("tableau_bord"), b"").unwrap();
        let cache = cache_in(dir.path());

        assert!(!cache.set(CacheCategory::TdbFilters, &cantal_params(), &json!({"a": 1})).await);
        let meta = cache.last_lookup().await.unwrap();
        assert_eq!(meta.source, LookupSource::WriteError);
        assert!(cache.get(CacheCategory::TdbFilters, &cantal_params()).await.is_none());
    }

    #[tokio::test]
    async fn test_memory_follows_writes_and_purges_from_another_instance() {
        let dir = tempdir().unwrap();
        let server = cache_in(dir.path());
        let admin = cache_in(dir.path());
        let category = CacheCategory::TdbFilters;

        assert!(server.set(category, &cantal_params(), &json!({"v": 1})).await);
        // Give the rewrite a distinct mtime even on coarse-grained filesystems.
        let path = entry_path(&server, category, &cantal_params());
        age_file(&path, 10);
        assert_eq!(server.get(category, &cantal_params()).await, Some(json!({"v": 1})));
        assert_eq!(
            server.last_lookup().await.unwrap().source,
            LookupSource::Disk
        );

        assert!(admin.set(category, &cantal_params(), &json!({"v": 2})).await);
        let (value, meta) = server.lookup(category, &cantal_params()).await;
        assert_eq!(value, Some(json!({"v": 2})));
        assert_eq!(meta.source, LookupSource::Disk);

        assert_eq!(admin.daily_purge(Some(2024)).await, 1);
        let (value, meta) = server.lookup(category, &cantal_params()).await;
        assert_eq!(value, None);
        assert_eq!(meta.source, LookupSource::Miss);
        assert!(server.memory.is_empty().await);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_a_read_error() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        // A directory where the entry file should be.
        let path = entry_path(&cache, CacheCategory::TdbComparison, &cantal_params());
        std::fs::create_dir_all(&path).unwrap();

        let (value, meta) = cache.lookup(CacheCategory::TdbComparison, &cantal_params()).await;
        assert_eq!(value, None);
        assert!(!meta.hit);
        assert_eq!(meta.source, LookupSource::ReadError);
        assert!(path.is_dir());
        assert_eq!(cache.counters().misses, 1);
    }

    #[tokio::test]
    async fn test_set_overwrites_previous_entry() {
        let dir = tempdir().unwrap();
        let cache = cache_in(dir.path());
        assert!(cache.set(CacheCategory::TdbFilters, &cantal_params(), &json!({"v": 1})).await);
        assert!(cache.set(CacheCategory::TdbFilters, &cantal_params(), &json!({"v": 2})).await);

        let spec = cache.registry.get(CacheCategory::TdbFilters).unwrap();
        assert_eq!(cache.disk.list(spec).await.unwrap().len(), 1);
        assert_eq!(
            cache.get(CacheCategory::TdbFilters, &cantal_params()).await,
            Some(json!({"v": 2}))
        );
    }
}
