//! Report cache admin - maintenance tool for the tourism report cache
//!
//! Runs the cache's TTL sweep, purges and statistics from cron jobs or an
//! operator shell.

mod commands;
mod error;
mod format;

use crate::commands::Command;
use crate::error::Result;
use clap::Parser;
use report_cache::{CacheConfig, CategoryRegistry, ReportCache};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "report-cache-admin")]
#[command(about = "Inspect and maintain the tourism report cache", long_about = None)]
struct Args {
    /// Cache root directory (overrides CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("report_cache=info".parse()?)
        .add_directive("report_cache_admin=info".parse()?);

    // Use JSON format for Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let args = Args::parse();

    let mut config = load_config(
        std::env::var("CACHE_DIR").ok(),
        std::env::var("CACHE_TTL_OVERRIDES").ok(),
    )?;
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }
    info!("Cache dir: {:?}", config.cache_dir);

    let cache = ReportCache::new(config);
    commands::run(&cache, args.command).await
}

fn load_config(cache_dir: Option<String>, ttl_overrides: Option<String>) -> Result<CacheConfig> {
    let cache_dir = cache_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./cache"));

    let registry = match ttl_overrides {
        Some(overrides) => CategoryRegistry::standard().with_overrides(&overrides)?,
        None => CategoryRegistry::standard(),
    };

    Ok(CacheConfig {
        cache_dir,
        registry,
    })
}
