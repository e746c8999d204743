//! Cache key and filename derivation
//!
//! A cache key identifies a (category, parameter set) pair; the filename is a
//! readable slug of the main report parameters followed by a short digest of
//! the full parameter set, so two requests sharing the slug fields but
//! differing elsewhere still land in different files.

use crate::category::CacheCategory;
use crate::params::ReportParams;
use chrono::Datelike;
use sha2::{Digest, Sha256};

/// Length of the digest suffix in filenames
pub const FILENAME_HASH_LEN: usize = 8;

pub const CACHE_FILE_EXTENSION: &str = "json";

const DEFAULT_ZONE: &str = "cantal";
const DEFAULT_PERIOD: &str = "annee";

fn params_digest(params: &ReportParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(params.canonical_json().as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic key: `<category>:<sha256 of the canonical parameters>`
pub fn build_key(category: CacheCategory, params: &ReportParams) -> String {
    format!("{}:{}", category.name(), params_digest(params))
}

/// Readable filename for a cache entry, e.g.
/// `touristes_cantal_2024_hiver_limit15_e23b0160.json`
pub fn build_filename(category: CacheCategory, params: &ReportParams) -> String {
    build_filename_in_year(category, params, chrono::Local::now().year())
}

/// Same as [`build_filename`], with the year used when `annee` is missing
pub fn build_filename_in_year(
    category: CacheCategory,
    params: &ReportParams,
    current_year: i32,
) -> String {
    let zone = params
        .non_null("zone")
        .map(|v| clean_zone(&v.to_string()))
        .filter(|z| !z.is_empty())
        .unwrap_or_else(|| DEFAULT_ZONE.to_string());

    let year = params
        .non_null("annee")
        .map(|v| keep_alphanumeric(&v.to_string()))
        .filter(|y| !y.is_empty())
        .unwrap_or_else(|| current_year.to_string());

    let period = params
        .non_null("periode")
        .map(|v| clean_period(&v.to_string()))
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PERIOD.to_string());

    let limit = params
        .non_null("limit")
        .map(|v| format!("limit{}", keep_alphanumeric(&v.to_string())));

    let digest = params_digest(params);
    let slug = FileSlug {
        classification: category.classification().map(str::to_string),
        zone,
        year,
        period,
        limit,
        hash: digest[..FILENAME_HASH_LEN].to_string(),
    };
    slug.file_name()
}

/// Zone token as it appears in filenames: alphanumerics only, lowercased
pub fn clean_zone(zone: &str) -> String {
    keep_alphanumeric(zone).to_lowercase()
}

fn keep_alphanumeric(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

fn clean_period(period: &str) -> String {
    let cleaned: String = period
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    // A period made only of separators carries no information.
    if cleaned.chars().all(|c| c == '_') {
        String::new()
    } else {
        cleaned
    }
}

/// Structured view of a cache filename.
///
/// Tokens sit at fixed positions for a given category (the category decides
/// whether a classification prefix is present), and the digest is always the
/// last token, so year and zone are compared as whole tokens and never found
/// by accident inside the digest or inside a longer zone name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlug {
    pub classification: Option<String>,
    pub zone: String,
    pub year: String,
    pub period: String,
    pub limit: Option<String>,
    pub hash: String,
}

impl FileSlug {
    pub fn file_name(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(6);
        if let Some(classification) = &self.classification {
            parts.push(classification);
        }
        parts.push(&self.zone);
        parts.push(&self.year);
        parts.push(&self.period);
        if let Some(limit) = &self.limit {
            parts.push(limit);
        }
        parts.push(&self.hash);
        format!("{}.{}", parts.join("_"), CACHE_FILE_EXTENSION)
    }

    /// Parse a filename written for `category`; `None` for foreign files
    pub fn parse(category: CacheCategory, file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".json")?;
        let mut tokens: Vec<&str> = stem.split('_').collect();

        let hash = tokens.pop()?;
        if hash.len() != FILENAME_HASH_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let classification = match category.classification() {
            Some(expected) => {
                if tokens.first() != Some(&expected) {
                    return None;
                }
                tokens.remove(0);
                Some(expected.to_string())
            }
            None => None,
        };

        if tokens.len() < 3 {
            return None;
        }
        let zone = tokens[0];
        let year = tokens[1];
        if zone.is_empty() || year.is_empty() {
            return None;
        }

        let rest = &tokens[2..];
        let has_limit = rest.len() > 1 && is_limit_token(rest[rest.len() - 1]);
        let (period, limit) = if has_limit {
            let (period, limit) = rest.split_at(rest.len() - 1);
            (period.join("_"), Some(limit[0].to_string()))
        } else {
            (rest.join("_"), None)
        };

        Some(Self {
            classification,
            zone: zone.to_string(),
            year: year.to_string(),
            period,
            limit,
            hash: hash.to_string(),
        })
    }
}

fn is_limit_token(token: &str) -> bool {
    token
        .strip_prefix("limit")
        .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(false)
}
