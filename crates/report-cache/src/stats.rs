//! Read-only cache usage report

use crate::cache::ReportCache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;
use tracing::warn;

/// Usage of one category's directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub files: u64,
    pub size: u64,
    /// Files past their TTL that have not been swept yet
    pub expired: u64,
    pub ttl: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub total_files: u64,
    pub total_size: u64,
    pub categories: BTreeMap<String, CategoryStats>,
    pub memory_entries: usize,
}

impl StatsReport {
    pub fn expired_files(&self) -> u64 {
        self.categories.values().map(|c| c.expired).sum()
    }
}

impl ReportCache {
    /// Count files, bytes and expired files per enabled category.
    /// Nothing is deleted.
    pub async fn get_stats(&self) -> StatsReport {
        let now = SystemTime::now();
        let mut report = StatsReport::default();

        for spec in self.registry.iter() {
            let mut stats = CategoryStats {
                ttl: spec.ttl_secs,
                ..Default::default()
            };

            match self.disk.list(spec).await {
                Ok(files) => {
                    for file in files {
                        stats.files += 1;
                        stats.size += file.size;
                        if file.is_expired(spec.ttl_secs, now) {
                            stats.expired += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(category = %spec.category, error = %e, "Failed to list cache directory");
                }
            }

            report.total_files += stats.files;
            report.total_size += stats.size;
            report
                .categories
                .insert(spec.category.name().to_string(), stats);
        }

        report.memory_entries = self.memory.len().await;
        report
    }
}
