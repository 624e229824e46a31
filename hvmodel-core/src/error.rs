//! Error types for model operations.

use thiserror::Error;

/// Errors that can occur while reading or reconciling a resource.
#[derive(Debug, Error)]
pub enum Error {
    /// Required attributes are missing; no remote call was issued.
    #[error("{kind} is missing required attributes: {}", .missing.join(", "))]
    Precondition {
        kind: &'static str,
        missing: Vec<&'static str>,
    },

    /// The remote command could not be issued or its reply could not be decoded.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote side rejected the operation.
    #[error("{operation} failed ({code}): {message}")]
    RemoteOperation {
        operation: String,
        code: i32,
        message: String,
    },

    /// A lookup that must yield exactly one resource found none.
    #[error("{kind} not found ({filters})")]
    NotFound { kind: &'static str, filters: String },

    /// The resource kind cannot perform this lifecycle operation.
    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        kind: &'static str,
        operation: &'static str,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Transport(format!("invalid payload: {}", e))
    }
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_lists_missing_attributes() {
        let err = Error::Precondition {
            kind: "network adapter",
            missing: vec!["vm_name", "computer_name"],
        };
        assert_eq!(
            err.to_string(),
            "network adapter is missing required attributes: vm_name, computer_name"
        );
    }

    #[test]
    fn serde_errors_become_transport_errors() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!err.is_not_found());
    }
}
