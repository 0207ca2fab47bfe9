//! Error types for the collaborator seams (data source, preference store).

/// Errors produced by a remote data source or detected in its response.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The data source reported a failure.
    #[error("{message}")]
    Failed {
        /// Human-readable description, shown in place of row content.
        message: String,
        /// Whether re-issuing the same request may succeed.
        retryable: bool,
    },

    /// The request was superseded or torn down. Never surfaced as an error state.
    #[error("request cancelled")]
    Cancelled,

    /// The response violated the data-source contract.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// A failure that may succeed on retry (network blips, timeouts, 5xx).
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that will not go away on retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { retryable: true, .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors from a [`crate::PreferenceStore`].
#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error("preference store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("preference serialization failed: {0}")]
    Serialization(String),

    #[error("preference store unavailable: {0}")]
    Backend(String),
}
