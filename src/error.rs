use std::fmt;

/// Error type shared by the tracker core
#[derive(Debug)]
pub enum TrackerError {
    /// Input rejected before any network access
    Validation(String),
    /// Transport, timeout, HTTP status or body problems
    Network(String),
    /// History store read/write error
    Persistence(String),
    /// Export file could not be written
    Export(String),
    /// Configuration error
    Config(String),
    /// IO error
    Io(std::io::Error),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Validation(msg) => write!(f, "Validation error: {}", msg),
            TrackerError::Network(msg) => write!(f, "Network error: {}", msg),
            TrackerError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            TrackerError::Export(msg) => write!(f, "Export error: {}", msg),
            TrackerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TrackerError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackerError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TrackerError {
    fn from(err: std::io::Error) -> Self {
        TrackerError::Io(err)
    }
}

impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        TrackerError::Persistence(err.to_string())
    }
}

impl From<csv::Error> for TrackerError {
    fn from(err: csv::Error) -> Self {
        TrackerError::Export(err.to_string())
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        TrackerError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for TrackerError {
    fn from(err: toml::de::Error) -> Self {
        TrackerError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for TrackerError {
    fn from(err: toml::ser::Error) -> Self {
        TrackerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let err = TrackerError::Export("disk full".to_string());
        assert_eq!(err.to_string(), "Export error: disk full");

        let err: TrackerError = std::io::Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(err.to_string().starts_with("IO error:"));
    }

    #[test]
    fn test_sqlite_error_is_persistence() {
        let err: TrackerError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, TrackerError::Persistence(_)));
    }
}
