//! Runtime error types.

use thiserror::Error;
use tower::BoxError;

use switchboard_core::RegistryError;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Routes and collaborators are fixed once the runtime starts.
    #[error("Runtime is already started")]
    AlreadyStarted,

    #[error("Runtime is not running")]
    NotRunning,

    /// Every dispatch slot is taken; returned by `try_submit` only.
    #[error("All {0} dispatch slots are busy")]
    Saturated(usize),

    #[error("No delivery configured; call set_delivery before start")]
    DeliveryNotConfigured,

    #[error("Malformed update: {0}")]
    MalformedUpdate(#[from] serde_json::Error),

    #[error("Dispatch service failed: {0}")]
    Service(BoxError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
