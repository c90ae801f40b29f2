use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum DocCmdError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Custom error: {0}")]
    Custom(String),
    #[error("Engine error: {0}")]
    Engine(String),
    #[error("Host document error: {0}")]
    Host(String),
    #[error("Invalid Command: {0}")]
    InvalidCommand(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl DocCmdError {
    /// True when the error means the addressed marker or range no longer exists in the host.
    pub fn is_gone(&self) -> bool {
        matches!(self, DocCmdError::NotFound(_))
    }
}

impl From<toml::de::Error> for DocCmdError {
    fn from(src: toml::de::Error) -> DocCmdError {
        DocCmdError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for DocCmdError {
    fn from(src: toml::ser::Error) -> DocCmdError {
        DocCmdError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<JsonError> for DocCmdError {
    fn from(src: JsonError) -> DocCmdError {
        DocCmdError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<io::Error> for DocCmdError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => DocCmdError::NotFound(format!("{x}")),
            _ => DocCmdError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_means_gone() {
        let err = DocCmdError::from(io::Error::new(io::ErrorKind::NotFound, "config.toml"));
        assert!(err.is_gone());
        let err = DocCmdError::from(io::Error::new(io::ErrorKind::PermissionDenied, "x"));
        assert!(matches!(err, DocCmdError::Io(_)));
        assert!(!err.is_gone());
    }
}
