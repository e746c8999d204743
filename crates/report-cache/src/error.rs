//! Error types for the report cache

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    UnknownCategory(String),
    InvalidTtl { category: String, ttl_secs: u64 },
    Config(String),
    Io(Box<std::io::Error>),
    Pattern(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::UnknownCategory(name) => write!(f, "Unknown cache category: {}", name),
            CacheError::InvalidTtl { category, ttl_secs } => {
                write!(f, "Invalid TTL for {}: {} seconds", category, ttl_secs)
            }
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Pattern(msg) => write!(f, "Invalid pattern: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<regex::Error> for CacheError {
    fn from(err: regex::Error) -> Self {
        CacheError::Pattern(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_category_display() {
        let err = CacheError::UnknownCategory("tdb_meteo".to_string());
        assert_eq!(format!("{}", err), "Unknown cache category: tdb_meteo");
    }

    #[test]
    fn test_invalid_ttl_display() {
        let err = CacheError::InvalidTtl {
            category: "tdb_comparison".to_string(),
            ttl_secs: 0,
        };
        assert_eq!(format!("{}", err), "Invalid TTL for tdb_comparison: 0 seconds");
    }

    #[test]
    fn test_io_error_has_source() {
        let err = CacheError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        ));
        assert!(std::error::Error::source(&err).is_some());
        assert!(format!("{}", err).contains("read-only filesystem"));
    }
}
