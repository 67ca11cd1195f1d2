//! Declarative recreation of torn-down secondaries
//!
//! Runs only after teardown has fully drained across every matched database.
//! The primary is derived from the captured link descriptor when one exists,
//! otherwise from the naming convention of the secondary's own server, and is
//! confirmed to exist immediately before the document is built. The document
//! is materialized to a disposable artifact that is removed whether the
//! deployment succeeds, fails, or panics.

use std::io::Write;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::control_plane::ControlPlane;
use crate::model::{DeploymentState, ReplicaSnapshot};
use crate::retry::{retry_transient, RetryConfig};
use crate::template::{database_resource_id, DeploymentTemplate};
use crate::{Error, Result};

/// Polling discipline for the asynchronous deployment
#[derive(Clone, Debug)]
pub struct RecreateConfig {
    /// Interval between deployment status polls
    pub poll_interval: Duration,
    /// Overall budget for one deployment to reach a terminal state
    pub deployment_timeout: Duration,
}

impl Default for RecreateConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            deployment_timeout: Duration::from_secs(1200),
        }
    }
}

/// Derive the primary server name from a secondary server name.
///
/// Secondary servers carry a `-secondary` token in the shared naming
/// convention; the primary is the same name without it. Returns `None` when
/// the name carries no such token and nothing can be safely inferred.
pub fn primary_server_name(secondary_server: &str) -> Option<String> {
    if secondary_server.contains("-secondary") {
        Some(secondary_server.replacen("-secondary", "", 1))
    } else {
        None
    }
}

/// The primary (server, resource group) a snapshot points at
fn infer_primary(snapshot: &ReplicaSnapshot) -> Result<(String, String)> {
    if let Some(link) = snapshot.partner_of_record() {
        let resource_group = link
            .partner_resource_group
            .clone()
            .unwrap_or_else(|| snapshot.server.resource_group.clone());
        return Ok((link.partner_server.clone(), resource_group));
    }

    // No link survived capture; fall back to the naming convention
    match primary_server_name(&snapshot.server.name) {
        Some(primary) => {
            warn!(
                database = %snapshot.database.name,
                primary_server = %primary,
                "no link descriptor captured, primary inferred from naming convention"
            );
            Ok((primary, snapshot.server.resource_group.clone()))
        }
        None => Err(Error::recreation(format!(
            "no link descriptor for {} and server name '{}' yields no primary by naming convention",
            snapshot.database.name, snapshot.server.name
        ))),
    }
}

/// Deployment name: unique per database and submission, within name limits
fn deployment_name(database: &str) -> String {
    let short: String = database.chars().take(32).collect();
    format!("replica-refresh-{}-{}", short, Utc::now().format("%Y%m%d%H%M%S"))
}

/// Recreate one database as a secondary of its (confirmed) primary.
///
/// Per-database failures are returned as [`Error::Recreation`] and do not
/// abort sibling recreations.
pub async fn recreate_database<C: ControlPlane + ?Sized>(
    client: &C,
    snapshot: &ReplicaSnapshot,
    config: &RecreateConfig,
) -> Result<()> {
    let database = &snapshot.database.name;
    let (primary_server, primary_resource_group) = infer_primary(snapshot)?;

    // The primary must exist right now, not at capture time
    let retry = RetryConfig::default();
    let primary = retry_transient(
        &retry,
        "get_database",
        || {
            client.get_database(
                &snapshot.server.subscription,
                &primary_resource_group,
                &primary_server,
                database,
            )
        },
        |e| e.is_transient(),
    )
    .await
    .map_err(|e| Error::recreation(format!("could not confirm primary for {}: {}", database, e)))?;

    if primary.is_none() {
        return Err(Error::recreation(format!(
            "primary database {} not found on inferred server {}",
            database, primary_server
        )));
    }

    let source_database_id = database_resource_id(
        &snapshot.server.subscription,
        &primary_resource_group,
        &primary_server,
        database,
    );
    let template = DeploymentTemplate::secondary_of(snapshot, &source_database_id);

    // Disposable artifact: deleted on drop no matter how this function exits
    let mut artifact = tempfile::Builder::new()
        .prefix(&format!("replica-refresh-{}-", database))
        .suffix(".json")
        .tempfile()?;
    artifact.write_all(template.to_json()?.as_bytes())?;
    artifact.flush()?;

    let name = deployment_name(database);
    info!(
        database = %database,
        primary_server = %primary_server,
        deployment = %name,
        artifact = %artifact.path().display(),
        "submitting secondary recreation deployment"
    );

    client
        .submit_deployment(
            &snapshot.server.subscription,
            &snapshot.server.resource_group,
            &name,
            artifact.path(),
        )
        .await
        .map_err(|e| Error::recreation(format!("deployment submission for {} failed: {}", database, e)))?;

    wait_for_deployment(client, snapshot, &name, config).await
}

/// Poll a submitted deployment until it succeeds, fails, or runs out of time
async fn wait_for_deployment<C: ControlPlane + ?Sized>(
    client: &C,
    snapshot: &ReplicaSnapshot,
    name: &str,
    config: &RecreateConfig,
) -> Result<()> {
    let database = &snapshot.database.name;
    let deadline = Instant::now() + config.deployment_timeout;

    loop {
        let state = client
            .get_deployment_status(
                &snapshot.server.subscription,
                &snapshot.server.resource_group,
                name,
            )
            .await
            .map_err(|e| {
                Error::recreation(format!("status poll for deployment {} failed: {}", name, e))
            })?;

        match state {
            DeploymentState::Succeeded => {
                info!(database = %database, deployment = %name, "deployment succeeded");
                return Ok(());
            }
            DeploymentState::Failed(reason) => {
                return Err(Error::recreation(format!(
                    "deployment {} for {} failed: {}",
                    name, database, reason
                )));
            }
            DeploymentState::Canceled => {
                return Err(Error::recreation(format!(
                    "deployment {} for {} was canceled",
                    name, database
                )));
            }
            DeploymentState::Running | DeploymentState::Other(_) => {
                if Instant::now() >= deadline {
                    return Err(Error::recreation(format!(
                        "deployment {} for {} did not reach a successful terminal state within {:?}",
                        name, database, config.deployment_timeout
                    )));
                }
                tokio::time::sleep(config.poll_interval).await;
            }
        }
    }
}
