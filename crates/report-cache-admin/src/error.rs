//! Error types for the report cache admin tool

use std::fmt;

#[derive(Debug)]
pub enum AdminError {
    Cache(report_cache::CacheError),
    Json(String),
    Config(String),
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminError::Cache(err) => write!(f, "Cache error: {}", err),
            AdminError::Json(msg) => write!(f, "JSON error: {}", msg),
            AdminError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AdminError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AdminError::Cache(err) => Some(err),
            _ => None,
        }
    }
}

impl From<report_cache::CacheError> for AdminError {
    fn from(err: report_cache::CacheError) -> Self {
        AdminError::Cache(err)
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        AdminError::Json(err.to_string())
    }
}

impl From<tracing_subscriber::filter::ParseError> for AdminError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        AdminError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display() {
        let err = AdminError::from(report_cache::CacheError::UnknownCategory(
            "tdb_meteo".to_string(),
        ));
        assert_eq!(
            format!("{}", err),
            "Cache error: Unknown cache category: tdb_meteo"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_display() {
        let err = AdminError::Config("bad CACHE_TTL_OVERRIDES".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: bad CACHE_TTL_OVERRIDES"
        );
    }
}
