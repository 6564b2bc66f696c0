use async_trait::async_trait;
use serde_json::Value;

use super::domain::{RegistrationRow, RegistrationStatus};

/// Handle to the hosted backend: the registrations table plus its serverless functions.
///
/// One instance is shared by every orchestrator and verifier in the process, so
/// implementations must be cheap to call concurrently.
#[async_trait]
pub trait RegistrationBackend: Send + Sync {
    /// Insert one registration. The backend assigns `status = pending`.
    async fn insert(&self, row: RegistrationRow) -> Result<(), BackendError>;

    /// Set `status` on every registration whose email equals `email`.
    /// Returns how many rows matched.
    async fn update_status(
        &self,
        email: &str,
        status: RegistrationStatus,
    ) -> Result<u64, BackendError>;

    /// Invoke a named serverless function with a JSON body.
    async fn invoke(&self, function: &str, payload: Value) -> Result<Value, BackendError>;
}

/// Structured failure reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("{message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("function {function} failed: {message}")]
    Function { function: String, message: String },
}

impl BackendError {
    pub fn rejected(message: impl Into<String>) -> Self {
        BackendError::Rejected {
            code: None,
            message: message.into(),
        }
    }

    /// The collaborator's own message, if it supplied a non-empty one.
    pub fn user_message(&self) -> Option<&str> {
        let message = match self {
            BackendError::Rejected { message, .. } => message,
            BackendError::Unavailable(message) => message,
            BackendError::Function { message, .. } => message,
        };
        let trimmed = message.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}
