//! Control-plane client abstraction
//!
//! Every mutation and query this subsystem performs goes through the
//! [`ControlPlane`] trait, so the orchestration logic is identical whether it
//! is driving the vendor CLI, an SDK client, or a test double. The production
//! implementation is [`AzCli`], which shells out to the `az` CLI.

mod azcli;

pub use azcli::AzCli;

use std::path::Path;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::model::{DeploymentState, ReplicaDatabase, ReplicaServer, ReplicationLink};

/// Errors surfaced by a control-plane client
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControlPlaneError {
    /// The underlying command ran and reported failure
    #[error("command failed: {command}: {message}")]
    CommandFailed {
        /// The command that failed
        command: String,
        /// What the command printed on stderr
        message: String,
    },

    /// The command succeeded but its response could not be interpreted
    #[error("malformed response from {command}: {message}")]
    Parse {
        /// The command whose output was malformed
        command: String,
        /// Parse diagnostic
        message: String,
    },

    /// The command did not complete within the caller's deadline
    #[error("command timed out: {command}")]
    Timeout {
        /// The command that timed out
        command: String,
    },

    /// The control-plane session could not be established or renewed
    #[error("session error: {0}")]
    Session(String),

    /// The command could not be spawned at all
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControlPlaneError {
    /// Whether retrying the same call may reasonably succeed.
    ///
    /// Authoritative answers (command ran, control plane said no) are not
    /// transient; spawn failures, timeouts, and transport-looking stderr are.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout { .. } => true,
            Self::CommandFailed { message, .. } => {
                let message = message.to_lowercase();
                message.contains("connection") || message.contains("timed out")
            }
            Self::Parse { .. } | Self::Session(_) => false,
        }
    }
}

/// Result alias for control-plane calls
pub type CpResult<T> = std::result::Result<T, ControlPlaneError>;

/// Operations this subsystem needs from the cloud control plane.
///
/// Mirrors the shape of the underlying resource APIs rather than the
/// orchestration: callers compose these into the lifecycle phases.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// List the servers tagged as secondary servers for the given
    /// destination environment, across all visible subscriptions.
    ///
    /// An empty list is a valid answer, distinct from a query failure.
    async fn list_servers(&self, destination_environment: &str) -> CpResult<Vec<ReplicaServer>>;

    /// List all databases hosted on a server, system databases included
    async fn list_databases(&self, server: &ReplicaServer) -> CpResult<Vec<ReplicaDatabase>>;

    /// Look up a single database; `Ok(None)` means the control plane
    /// authoritatively reported it absent
    async fn get_database(
        &self,
        subscription: &str,
        resource_group: &str,
        server: &str,
        database: &str,
    ) -> CpResult<Option<ReplicaDatabase>>;

    /// List the replication links of a database on the given server
    async fn list_replication_links(
        &self,
        server: &ReplicaServer,
        database: &str,
    ) -> CpResult<Vec<ReplicationLink>>;

    /// Terminate one replication link, issued from the secondary side and
    /// targeting the specific partner recorded in the descriptor
    async fn delete_replication_link(
        &self,
        server: &ReplicaServer,
        database: &str,
        link: &ReplicationLink,
    ) -> CpResult<()>;

    /// Delete a database object. Servers are never deleted through this trait.
    async fn delete_database(&self, server: &ReplicaServer, database: &str) -> CpResult<()>;

    /// Submit a declarative deployment from a template file, without waiting
    /// for it to reach a terminal state
    async fn submit_deployment(
        &self,
        subscription: &str,
        resource_group: &str,
        deployment_name: &str,
        template_path: &Path,
    ) -> CpResult<()>;

    /// Current provisioning state of a previously submitted deployment
    async fn get_deployment_status(
        &self,
        subscription: &str,
        resource_group: &str,
        deployment_name: &str,
    ) -> CpResult<DeploymentState>;

    /// Re-establish the control-plane session.
    ///
    /// Used exactly once per run, when discovery suspects session staleness.
    async fn renew_session(&self) -> CpResult<()>;
}
