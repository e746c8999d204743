//! Bulk maintenance: TTL sweeps, invalidation and year/zone purges
//!
//! None of these run on their own; they are meant for scheduled jobs and
//! operator actions. They are not transactional across categories: a failure
//! in one category is logged and the sweep moves on, so returned counts are
//! the files actually removed.

use crate::cache::ReportCache;
use crate::category::{CacheCategory, CategorySpec};
use crate::disk::{remove_file, DiskFile};
use crate::error::Result;
use crate::key::{clean_zone, FileSlug};
use chrono::Datelike;
use regex::Regex;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, warn};

/// Compile a filename glob (`*`, `?`) matched against the file stem
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Ok(Regex::new(&expr)?)
}

fn file_stem(file: &DiskFile) -> &str {
    file.file_name
        .strip_suffix(".json")
        .unwrap_or(&file.file_name)
}

impl ReportCache {
    async fn list_or_warn(&self, spec: &CategorySpec) -> Vec<DiskFile> {
        match self.disk.list(spec).await {
            Ok(files) => files,
            Err(e) => {
                warn!(category = %spec.category, error = %e, "Failed to list cache directory");
                Vec::new()
            }
        }
    }

    /// Delete cached entries.
    ///
    /// With a category, removes that category's files (only those whose
    /// name without `.json` matches `pattern`, if given) and its memory
    /// entries. Without one, clears the memory tier and does the same for
    /// every enabled category. Returns the number of files deleted.
    pub async fn invalidate(
        &self,
        category: Option<CacheCategory>,
        pattern: Option<&str>,
    ) -> usize {
        let matcher = match pattern.map(glob_to_regex).transpose() {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!(pattern = ?pattern, error = %e, "Invalid invalidation pattern");
                return 0;
            }
        };

        let specs: Vec<&CategorySpec> = match category {
            Some(category) => match self.registry.get(category) {
                Some(spec) => vec![spec],
                None => {
                    warn!(category = %category, "Invalidate on unregistered cache category");
                    return 0;
                }
            },
            None => {
                self.memory.clear().await;
                self.registry.iter().collect()
            }
        };

        let mut deleted = 0;
        for spec in specs {
            self.memory.evict_prefix(&spec.category.key_prefix()).await;
            for file in self.list_or_warn(spec).await {
                let matches = matcher
                    .as_ref()
                    .map(|re| re.is_match(file_stem(&file)))
                    .unwrap_or(true);
                if matches && remove_file(&file.path).await {
                    deleted += 1;
                }
            }
        }

        info!(category = ?category.map(|c| c.name()), pattern = ?pattern, deleted, "Cache invalidated");
        deleted
    }

    /// Delete every file older than its category's TTL and drop the matching
    /// stale memory entries. Returns the number of files deleted.
    pub async fn cleanup(&self) -> usize {
        let now = SystemTime::now();
        let mut deleted = 0;

        for spec in self.registry.iter() {
            for file in self.list_or_warn(spec).await {
                if file.is_expired(spec.ttl_secs, now) && remove_file(&file.path).await {
                    debug!(category = %spec.category, file = %file.file_name, "Removed expired cache file");
                    deleted += 1;
                }
            }
            self.memory
                .evict_stale_with_prefix(&spec.category.key_prefix(), spec.ttl_secs, now)
                .await;
        }

        info!(deleted, "Cache cleanup complete");
        deleted
    }

    /// Delete every file, in every category, built for `year` (default: the
    /// current year), then clear the memory tier.
    pub async fn daily_purge(&self, year: Option<i32>) -> usize {
        self.purge_by_year_and_zone(year, None).await
    }

    /// Delete every file built for `year` (default: the current year) and, if
    /// given, for `zone`; then clear the memory tier. A zone that is empty
    /// once cleaned does not filter.
    pub async fn purge_by_year_and_zone(&self, year: Option<i32>, zone: Option<&str>) -> usize {
        let year = year
            .unwrap_or_else(|| chrono::Local::now().year())
            .to_string();
        let zone = zone.map(clean_zone).filter(|z| !z.is_empty());

        let mut deleted = 0;
        for spec in self.registry.iter() {
            for file in self.list_or_warn(spec).await {
                let Some(slug) = FileSlug::parse(spec.category, &file.file_name) else {
                    continue;
                };
                let year_match = slug.year == year;
                let zone_match = zone.as_ref().map(|z| &slug.zone == z).unwrap_or(true);
                if year_match && zone_match && remove_file(&file.path).await {
                    deleted += 1;
                }
            }
        }

        self.memory.clear().await;
        info!(year = %year, zone = ?zone, deleted, "Cache purge complete");
        deleted
    }

    /// Remove empty directories below the cache root, deepest first.
    /// The root itself is kept. Returns the number of directories removed.
    pub async fn remove_empty_dirs(&self) -> usize {
        let root = self.disk.base_dir().to_path_buf();
        let mut dirs: Vec<PathBuf> = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = ?dir, error = %e, "Failed to read cache directory");
                    continue;
                }
            };
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                            let path = entry.path();
                            pending.push(path.clone());
                            dirs.push(path);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(path = ?dir, error = %e, "Failed to read cache directory");
                        break;
                    }
                }
            }
        }

        // Children always have more components than their parents.
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));

        let mut removed = 0;
        for dir in dirs {
            // Fails on non-empty directories, which is what we want.
            if fs::remove_dir(&dir).await.is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Removed empty cache directories");
        }
        removed
    }
}
