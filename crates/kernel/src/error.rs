//! Admin operation error types.

use thiserror::Error;

/// Errors returned by the admin operations.
///
/// Permission and argument problems are detected before anything is
/// mutated. Persistence and filesystem failures carry their source.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("persistence failure")]
    Persistence(#[from] anyhow::Error),

    #[error("filesystem failure")]
    Filesystem(#[from] std::io::Error),

    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

impl AdminError {
    /// Build an `InvalidArguments` error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    /// Build a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// The message shown to the administrator for this error.
    ///
    /// Persistence and filesystem details go to the log, not to the user.
    pub fn user_message(&self) -> String {
        match self {
            AdminError::PermissionDenied => {
                "Sorry! You have not been granted access to this page.".to_string()
            }
            AdminError::InvalidArguments(msg) => format!("Error! {msg}"),
            AdminError::NotFound(_) => "Sorry! No such item found.".to_string(),
            AdminError::Persistence(e) => {
                tracing::error!(error = %e, "persistence failure");
                format!("Error! {e}")
            }
            AdminError::Filesystem(e) => {
                tracing::error!(error = %e, "filesystem failure");
                "Error! A file system operation failed.".to_string()
            }
            AdminError::Delivery(msg) => format!("Error! {msg}"),
        }
    }
}

/// Result type alias using AdminError.
pub type AdminResult<T> = Result<T, AdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_is_vague() {
        let err = AdminError::not_found("theme 'Andreas08'");
        assert_eq!(err.user_message(), "Sorry! No such item found.");
        assert!(err.to_string().contains("Andreas08"));
    }

    #[test]
    fn persistence_wraps_anyhow() {
        let err: AdminError = anyhow::anyhow!("could not save your changes").into();
        assert!(matches!(err, AdminError::Persistence(_)));
        assert!(err.user_message().contains("could not save"));
    }
}
