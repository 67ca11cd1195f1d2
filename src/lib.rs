//! Replica Refresh - replica lifecycle management for environment data refreshes
//!
//! As part of refreshing a non-production environment from a source environment,
//! the secondary (read-replica) databases attached to the destination must be
//! torn down and reconstructed against the freshly restored primaries. This crate
//! implements that lifecycle as a strict two-phase operation: every matched
//! replica is snapshotted, unlinked, and deleted before any recreation begins,
//! so a partial rebuild never races an in-flight delete on the same server.
//!
//! # Modules
//!
//! - [`control_plane`] - Control-plane client abstraction (`az` CLI implementation)
//! - [`discovery`] - Secondary-server and candidate-database discovery
//! - [`matcher`] - Naming-convention matching and ownership safety gates
//! - [`snapshot`] - Point-in-time configuration capture before teardown
//! - [`severance`] - Replication-link termination
//! - [`teardown`] - Database deletion (servers are never deleted)
//! - [`template`] - Typed declarative deployment documents
//! - [`recreate`] - Secondary recreation via declarative deployment
//! - [`verify`] - Post-creation replication-link verification
//! - [`manager`] - Two-phase orchestration of a full refresh run
//! - [`report`] - Per-database outcomes and the audit summary table
//! - [`model`] - Servers, databases, SKUs, links, and snapshots
//! - [`retry`] - Bounded retry for transient control-plane failures
//! - [`error`] - Error types for the refresh workflow

#![deny(missing_docs)]

pub mod control_plane;
pub mod discovery;
pub mod error;
pub mod manager;
pub mod matcher;
pub mod model;
pub mod recreate;
pub mod report;
pub mod retry;
pub mod severance;
pub mod snapshot;
pub mod teardown;
pub mod template;
pub mod verify;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// Centralized so the CLI defaults, orchestration, and test fixtures agree.

/// Namespace sentinel reserved for the production tenant.
///
/// A refresh must never run with this value as its destination namespace; the
/// orchestration aborts before issuing any control-plane call if it does.
pub const PRODUCTION_NAMESPACE: &str = "manufacturo";

/// Resource tag identifying which tenant/namespace a database belongs to.
///
/// Distinct from naming conventions: a database is only ever acted on when
/// this tag equals the destination namespace exactly.
pub const OWNERSHIP_TAG: &str = "ClientName";

/// Resource tag carrying a server's role within an environment
pub const SERVER_ROLE_TAG: &str = "ServerRole";

/// Tag value marking a server as hosting secondary replicas
pub const SECONDARY_ROLE: &str = "secondary";

/// Resource tag naming the environment a server serves
pub const ENVIRONMENT_TAG: &str = "Environment";

/// Default settling wait after a successful deployment, before the
/// replication link is re-queried (seconds)
pub const DEFAULT_SETTLE_SECS: u64 = 60;
