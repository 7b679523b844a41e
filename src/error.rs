//! Error types for the geomap index.

use thiserror::Error;

/// Errors returned by the writer, the reader and the file codec.
#[derive(Error, Debug)]
pub enum GeoMapError {
    /// Empty or malformed covering, bad bucket width, oversized key, invalid config.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted after the owning object reached a terminal state.
    #[error("Invalid state: cannot {operation} a {state} {object}")]
    InvalidState {
        operation: &'static str,
        object: &'static str,
        state: &'static str,
    },

    /// File create/read/write failure.
    #[error("IO error during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Structurally invalid index file.
    #[error("Corrupt index file: {0}")]
    Corruption(String),
}

impl GeoMapError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }
}

impl From<std::io::Error> for GeoMapError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            operation: "io",
            source,
        }
    }
}

/// Result type for geomap operations.
pub type Result<T> = std::result::Result<T, GeoMapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_keeps_operation() {
        let err = GeoMapError::io(
            "build",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_io());
        assert!(err.to_string().contains("build"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = GeoMapError::InvalidState {
            operation: "write",
            object: "writer",
            state: "built",
        };
        assert!(err.is_invalid_state());
        assert_eq!(err.to_string(), "Invalid state: cannot write a built writer");
    }
}
