//! Maintenance commands run from cron or by an operator

use crate::error::Result;
use crate::format::{format_bytes, format_duration};
use chrono::Local;
use clap::Subcommand;
use report_cache::{CacheCategory, ReportCache, StatsReport};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show files, size and expired files per category
    Stats {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove expired files, then empty directories (scheduled job)
    Maintain,
    /// Delete cached entries of one category, or of all categories
    Invalidate {
        /// Category name, e.g. tdb_departements_touristes
        #[arg(long)]
        category: Option<String>,
        /// Filename glob without the .json extension, e.g. "touristes_cantal_*"
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Delete every entry built for a year (midnight job)
    PurgeDaily {
        /// Defaults to the current year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Delete entries built for a year and, optionally, a zone
    Purge {
        /// Defaults to the current year
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        zone: Option<String>,
    },
}

pub async fn run(cache: &ReportCache, command: Command) -> Result<()> {
    match command {
        Command::Stats { json } => {
            let stats = cache.get_stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
        Command::Maintain => maintain(cache).await,
        Command::Invalidate { category, pattern } => {
            let category = category
                .as_deref()
                .map(str::parse::<CacheCategory>)
                .transpose()?;
            let deleted = cache.invalidate(category, pattern.as_deref()).await;
            println!("{} files deleted", deleted);
        }
        Command::PurgeDaily { year } => {
            let started = Instant::now();
            let before = cache.get_stats().await;
            let deleted = cache.daily_purge(year).await;
            let after = cache.get_stats().await;
            println!(
                "{} files purged, {} freed in {} ms",
                deleted,
                format_bytes(before.total_size.saturating_sub(after.total_size)),
                started.elapsed().as_millis()
            );
        }
        Command::Purge { year, zone } => {
            let deleted = cache.purge_by_year_and_zone(year, zone.as_deref()).await;
            println!("{} files purged", deleted);
        }
    }
    Ok(())
}

async fn maintain(cache: &ReportCache) {
    let started = Instant::now();
    println!("Cache maintenance started {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    let before = cache.get_stats().await;
    println!(
        "Before: {} files, {}, {} expired",
        before.total_files,
        format_bytes(before.total_size),
        before.expired_files()
    );

    if before.expired_files() == 0 {
        println!("No expired files, cache is clean ({} ms)", started.elapsed().as_millis());
        return;
    }

    let cleaned = cache.cleanup().await;
    let after = cache.get_stats().await;
    let freed = before.total_size.saturating_sub(after.total_size);
    let dirs_removed = cache.remove_empty_dirs().await;

    println!(
        "After: {} files, {} ({} deleted, {} freed)",
        after.total_files,
        format_bytes(after.total_size),
        cleaned,
        format_bytes(freed)
    );
    for (name, stats) in after.categories.iter().filter(|(_, s)| s.files > 0) {
        println!(
            "  {}: {} files, TTL {}",
            name,
            stats.files,
            format_duration(stats.ttl)
        );
    }
    if dirs_removed > 0 {
        println!("{} empty directories removed", dirs_removed);
    }

    info!(
        cleaned,
        bytes_freed = freed,
        dirs_removed,
        duration_ms = started.elapsed().as_millis() as u64,
        "Cache maintenance complete"
    );
}

fn print_stats(stats: &StatsReport) {
    println!(
        "{:<34} {:>7} {:>12} {:>8} {:>6}",
        "CATEGORY", "FILES", "SIZE", "EXPIRED", "TTL"
    );
    for (name, c) in &stats.categories {
        println!(
            "{:<34} {:>7} {:>12} {:>8} {:>6}",
            name,
            c.files,
            format_bytes(c.size),
            c.expired,
            format_duration(c.ttl)
        );
    }
    println!(
        "{:<34} {:>7} {:>12} {:>8}",
        "TOTAL",
        stats.total_files,
        format_bytes(stats.total_size),
        stats.expired_files()
    );
}
