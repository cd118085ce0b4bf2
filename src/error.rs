//! Error taxonomy shared by the viewer and publisher.
//!
//! Geocoding and routing failures are absorbed at the resolver boundary and
//! never reach callers as errors; only store reads/writes, the PIN gate and
//! configuration loading surface a [`TrackerError`].

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors surfaced by the tracking pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackerError {
    /// Missing or unusable input (empty search query, no fix yet, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A collaborator (store, geocoder, router, device) could not be reached
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Wrong publisher PIN
    #[error("Incorrect PIN")]
    AuthFailure,

    /// The store rejected a write
    #[error("{}", persistence_message(.message, .permission_denied))]
    PersistenceFailure {
        message: String,
        permission_denied: bool,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Build a persistence failure, flagging permission problems from the message.
    pub fn persistence(message: impl Into<String>) -> Self {
        let message = message.into();
        let permission_denied = message.to_lowercase().contains("permission");
        TrackerError::PersistenceFailure {
            message,
            permission_denied,
        }
    }
}

fn persistence_message(message: &str, permission_denied: &bool) -> String {
    if *permission_denied {
        format!(
            "{}: store security rules may not be deployed, check write permissions",
            message
        )
    } else {
        format!("Error: {}", message)
    }
}
