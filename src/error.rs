//! Error types for the replica refresh workflow

use thiserror::Error;

use crate::control_plane::ControlPlaneError;

/// Main error type for refresh operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller is about to operate on the wrong data (production sentinel,
    /// ownership-tag mismatch, missing required parameter)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Control-plane call error
    #[error("control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    /// Replication-link termination error
    #[error("severance error: {0}")]
    Severance(String),

    /// Database deletion error
    #[error("teardown error: {0}")]
    Teardown(String),

    /// Secondary recreation error
    #[error("recreation error: {0}")]
    Recreation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (deployment artifact handling)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a severance error with the given message
    pub fn severance(msg: impl Into<String>) -> Self {
        Self::Severance(msg.into())
    }

    /// Create a teardown error with the given message
    pub fn teardown(msg: impl Into<String>) -> Self {
        Self::Teardown(msg.into())
    }

    /// Create a recreation error with the given message
    pub fn recreation(msg: impl Into<String>) -> Self {
        Self::Recreation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// True when this error must terminate the whole run rather than a single
    /// database's lifecycle
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::ControlPlane(_) | Self::Severance(_)
        )
    }
}
