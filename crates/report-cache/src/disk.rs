//! Durable file-per-entry storage, one subdirectory per category

use crate::category::CategorySpec;
use crate::error::Result;
use crate::key::CACHE_FILE_EXTENSION;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[cfg(unix)]
const CATEGORY_DIR_MODE: u32 = 0o750;

/// A cache file found on disk
#[derive(Debug, Clone)]
pub struct DiskFile {
    pub file_name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl DiskFile {
    pub fn is_expired(&self, ttl_secs: u64, now: SystemTime) -> bool {
        is_expired(self.modified, ttl_secs, now)
    }
}

/// Result of a freshness-checked read
#[derive(Debug)]
pub enum DiskLookup {
    Missing,
    /// The file was older than the TTL and has been removed
    Expired,
    Fresh { bytes: Vec<u8>, modified: SystemTime },
}

/// `true` once an entry is strictly older than its TTL.
///
/// A modification time in the future counts as age zero.
pub fn is_expired(modified: SystemTime, ttl_secs: u64, now: SystemTime) -> bool {
    now.duration_since(modified).unwrap_or_default() > Duration::from_secs(ttl_secs)
}

/// File-backed tier. Writes go through a temporary file and an atomic
/// rename, so readers never observe a partially written entry.
pub struct DiskTier {
    base_dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskTier {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn category_dir(&self, spec: &CategorySpec) -> PathBuf {
        self.base_dir.join(spec.subdirectory())
    }

    pub fn file_path(&self, spec: &CategorySpec, file_name: &str) -> PathBuf {
        self.category_dir(spec).join(file_name)
    }

    pub async fn exists(&self, spec: &CategorySpec, file_name: &str) -> bool {
        fs::metadata(self.file_path(spec, file_name))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Modification time of an entry; `Ok(None)` if there is no such file
    pub async fn modified(
        &self,
        spec: &CategorySpec,
        file_name: &str,
    ) -> Result<Option<SystemTime>> {
        match fs::metadata(self.file_path(spec, file_name)).await {
            Ok(m) if m.is_file() => Ok(Some(m.modified()?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Raw read with the file's modification time; `Ok(None)` if absent
    pub async fn read(
        &self,
        spec: &CategorySpec,
        file_name: &str,
    ) -> Result<Option<(Vec<u8>, SystemTime)>> {
        let path = self.file_path(spec, file_name);
        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let modified = metadata.modified()?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some((bytes, modified))),
            // Removed between the stat and the read.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read an entry if it is still within its category's TTL, deleting it
    /// when it is not.
    pub async fn load(
        &self,
        spec: &CategorySpec,
        file_name: &str,
        now: SystemTime,
    ) -> Result<DiskLookup> {
        let Some((bytes, modified)) = self.read(spec, file_name).await? else {
            return Ok(DiskLookup::Missing);
        };

        if is_expired(modified, spec.ttl_secs, now) {
            debug!(
                category = %spec.category,
                file = %file_name,
                ttl_secs = spec.ttl_secs,
                "Cache file expired"
            );
            self.delete(spec, file_name).await;
            return Ok(DiskLookup::Expired);
        }

        Ok(DiskLookup::Fresh { bytes, modified })
    }

    /// Create the category directory if needed
    pub async fn ensure_dir(&self, spec: &CategorySpec) -> Result<PathBuf> {
        let dir = self.category_dir(spec);
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(CATEGORY_DIR_MODE);
        builder.create(&dir).await?;
        Ok(dir)
    }

    /// Write (or overwrite) an entry atomically. Returns the new file's
    /// modification time.
    pub async fn write(
        &self,
        spec: &CategorySpec,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<SystemTime> {
        let dir = self.ensure_dir(spec).await?;
        let final_path = dir.join(file_name);
        let tmp_path = dir.join(format!(
            ".{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = write_then_rename(&tmp_path, &final_path, bytes).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        debug!(path = ?final_path, size = bytes.len(), "Wrote cache file");
        Ok(fs::metadata(&final_path).await?.modified()?)
    }

    /// Remove an entry. Returns `true` if a file was deleted.
    pub async fn delete(&self, spec: &CategorySpec, file_name: &str) -> bool {
        remove_file(&self.file_path(spec, file_name)).await
    }

    /// All cache files of a category; empty if the directory does not exist
    pub async fn list(&self, spec: &CategorySpec) -> Result<Vec<DiskFile>> {
        let dir = self.category_dir(spec);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if file_name.starts_with('.') || !is_cache_file_name(&file_name) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            files.push(DiskFile {
                file_name,
                path: entry.path(),
                size: metadata.len(),
                modified: metadata.modified()?,
            });
        }

        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }
}

fn is_cache_file_name(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        == Some(CACHE_FILE_EXTENSION)
}

async fn write_then_rename(tmp_path: &Path, final_path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp_path, final_path).await?;
    Ok(())
}

/// Delete a file, treating "already gone" as not deleted and logging other
/// failures.
pub(crate) async fn remove_file(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = ?path, error = %e, "Failed to delete cache file");
            false
        }
    }
}
