//! Typed errors that callers may need to branch on
//!
//! Everything else flows through `anyhow::Error`; use `downcast_ref` to
//! recover one of these.

/// No authenticated user is available for an action that requires one
#[derive(Debug, thiserror::Error)]
#[error("User not authenticated")]
pub struct AuthRequiredError;

/// The backend rejected a request (constraint violation, permission denial,
/// not-found, or a transport failure surfaced by the gateway)
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A single-row lookup found nothing
#[derive(Debug, thiserror::Error)]
#[error("Not found: {resource}")]
pub struct NotFoundError {
    pub resource: String,
}

/// Local validation failed before any backend call was made
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct InvalidInputError {
    pub message: String,
}

impl InvalidInputError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Returns true if the error chain contains an [`AuthRequiredError`]
pub fn is_auth_required(err: &anyhow::Error) -> bool {
    err.downcast_ref::<AuthRequiredError>().is_some()
}
