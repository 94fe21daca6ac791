//! Remote control-plane seam: the engine's only network-bound collaborator.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::types::{Resource, TaskHandle};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Control plane unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {ms} ms")]
    Timeout { ms: u64 },

    /// The request was refused locally and never sent.
    #[error("precondition failed: {0}")]
    Precondition(String),
}

impl ControlError {
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::Http(_) => "HTTP_ERROR",
            ControlError::Api { .. } => "API_ERROR",
            ControlError::Parse(_) => "PARSE_ERROR",
            ControlError::Unavailable(_) => "UNAVAILABLE",
            ControlError::Timeout { .. } => "TIMEOUT",
            ControlError::Precondition(_) => "PRECONDITION_FAILED",
        }
    }
}

/// Remote task state as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    /// Finished; `exit_status` is `"OK"` on success.
    Stopped { exit_status: String },
}

/// Power operations against a cluster. Each call returns once the remote side
/// has *accepted* the request, not when the guest has reached its new state.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &str;

    async fn start(&self, resource: &Resource) -> Result<TaskHandle, ControlError>;

    async fn stop(&self, resource: &Resource) -> Result<TaskHandle, ControlError>;

    async fn reboot(&self, resource: &Resource) -> Result<TaskHandle, ControlError>;

    async fn shutdown(&self, resource: &Resource) -> Result<TaskHandle, ControlError>;

    /// Hard reset. Implementations must refuse non-qemu guests with
    /// [`ControlError::Precondition`] before calling out.
    async fn reset(&self, resource: &Resource) -> Result<TaskHandle, ControlError>;

    async fn task_status(&self, node: &str, handle: &TaskHandle)
        -> Result<TaskStatus, ControlError>;
}
