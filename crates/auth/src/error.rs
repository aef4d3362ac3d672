//! Error types for identity operations.

use thiserror::Error;

/// An error reported by the identity provider or one of its user handles.
///
/// The identity layer never interprets these; it stores them on the owning
/// [`Operation`](crate::Operation) and hands them back to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// Machine-readable error code (e.g. `wrong-password`).
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ProviderError {
    /// Create a provider error from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether this error carries `code`.
    #[must_use]
    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

/// Errors surfaced by [`Operation`](crate::Operation), the user snapshot and
/// the session.
///
/// `Clone` because the last error of an operation stays observable on the
/// operation while the same error is returned to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentityError {
    /// Another operation is already running on the same owner.
    #[error("operation {running} is still in progress")]
    ConcurrentOperation {
        /// Name of the operation that is running.
        running: String,
    },

    /// A progress value outside `[0, 1]` or not a number.
    #[error("invalid progress {progress} (should be a number between 0 and 1)")]
    InvalidProgress {
        /// The rejected value.
        progress: f64,
    },

    /// Progress reported outside the run it belongs to.
    #[error("cannot update progress when no operation is in progress ({name}, progress: {progress})")]
    NoOperationInProgress {
        /// Name of the operation the reporter was created for.
        name: String,
        /// The rejected value.
        progress: f64,
    },

    /// The run was dropped or panicked before it settled.
    #[error("operation {name} was interrupted before it completed")]
    Interrupted {
        /// Name of the interrupted operation.
        name: String,
    },

    /// Failure reported by the identity provider.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl IdentityError {
    /// The provider error, if this is one.
    #[must_use]
    pub const fn as_provider(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(err) => Some(err),
            _ => None,
        }
    }
}

/// Result alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;
