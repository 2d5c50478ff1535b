//! Error types for the `service` layer.
use std::error::Error as StdError;
use std::fmt;

/// Top-level service error type.
/// `error_kind` tells the `web` layer which HTTP status to answer with, while
/// `source` keeps the original error for logging.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// Reading or writing the state file failed.
    Storage,
    /// A value could not be converted to or from JSON.
    Serialization,
}

impl Error {
    pub fn new(error_kind: ErrorKind, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: Some(source.into()),
            error_kind,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Service Error ({:?}): {source}", self.error_kind),
            None => write!(f, "Service Error ({:?})", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Storage, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Serialization, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_storage_errors() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(err.error_kind, ErrorKind::Storage);
        assert!(err.to_string().contains("nope"));
        assert!(err.source().is_some());
    }

    #[test]
    fn json_errors_are_serialization_errors() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert_eq!(err.error_kind, ErrorKind::Serialization);
    }
}
