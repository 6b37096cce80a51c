use thiserror::Error;

use crate::config::ConfigError;

/// Every failure the simulation can surface.
///
/// `MalformedInput` and `ResourceUnavailable` are raised before the first
/// tick. `Fault` means a handoff between actors broke mid-run; the run is
/// abandoned rather than retried.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
    #[error("Simulation fault: {0}")]
    Fault(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SimError {
    pub fn fault(message: impl Into<String>) -> Self {
        SimError::Fault(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        SimError::MalformedInput(message.into())
    }

    /// True for errors detected while validating input, before any actor runs.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            SimError::MalformedInput(_) | SimError::ResourceUnavailable(_) | SimError::Config(_)
        )
    }
}
