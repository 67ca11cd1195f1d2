//! Post-creation verification
//!
//! Geo link establishment is eventually consistent: the control plane can
//! report no link for minutes after a successful deployment. Verification
//! therefore waits a fixed settling interval, re-queries once, and treats
//! absence as a warning, never a failure.

use std::time::Duration;

use tracing::{info, warn};

use crate::control_plane::ControlPlane;
use crate::model::ReplicaSnapshot;
use crate::DEFAULT_SETTLE_SECS;

/// Default settling wait before the link re-query
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(DEFAULT_SETTLE_SECS);

/// What the post-creation link query observed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// A replication link is visible on the new secondary
    Established {
        /// Partner (primary) server of the observed link
        partner_server: String,
        /// Replication state the link reported
        replication_state: String,
    },
    /// No link visible yet; establishment may take a few more minutes
    NotYetVisible,
}

/// Unconditional settling wait, isolated so it can be swapped for bounded
/// polling without touching the surrounding logic
pub async fn wait_for_settling(settle: Duration) {
    if !settle.is_zero() {
        info!(seconds = settle.as_secs(), "waiting for replication link to settle");
        tokio::time::sleep(settle).await;
    }
}

/// Re-query replication-link state for a freshly recreated secondary
pub async fn verify_replication<C: ControlPlane + ?Sized>(
    client: &C,
    snapshot: &ReplicaSnapshot,
) -> VerificationOutcome {
    let links = match client
        .list_replication_links(&snapshot.server, &snapshot.database.name)
        .await
    {
        Ok(links) => links,
        Err(e) => {
            // An advisory read; a failed query gets the same soft answer as
            // an empty one
            warn!(
                database = %snapshot.database.name,
                error = %e,
                "post-creation link query failed"
            );
            return VerificationOutcome::NotYetVisible;
        }
    };

    match links.first() {
        Some(link) => {
            info!(
                database = %snapshot.database.name,
                partner_server = %link.partner_server,
                replication_state = %link.replication_state,
                "replication link established"
            );
            VerificationOutcome::Established {
                partner_server: link.partner_server.clone(),
                replication_state: link.replication_state.clone(),
            }
        }
        None => {
            warn!(
                database = %snapshot.database.name,
                "no replication link visible yet; link establishment may take a few minutes"
            );
            VerificationOutcome::NotYetVisible
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{ControlPlaneError, MockControlPlane};
    use crate::model::{LinkType, ReplicaDatabase, ReplicaServer, ReplicationLink};
    use chrono::Utc;

    fn snapshot() -> ReplicaSnapshot {
        let database: ReplicaDatabase =
            serde_json::from_str(r#"{"name": "db-gateway-acme-qa2-eastus"}"#).unwrap();
        ReplicaSnapshot {
            server: ReplicaServer {
                name: "sql-acme-qa2-secondary-eastus".to_string(),
                resource_group: "rg-acme-qa2".to_string(),
                subscription: "0000-1111".to_string(),
                location: "eastus".to_string(),
            },
            database,
            links: vec![],
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn an_observed_link_verifies_as_established() {
        let mut client = MockControlPlane::new();
        client
            .expect_list_replication_links()
            .times(1)
            .returning(|_, _| {
                Ok(vec![ReplicationLink {
                    partner_server: "sql-acme-qa2-eastus".to_string(),
                    partner_database: "db-gateway-acme-qa2-eastus".to_string(),
                    partner_resource_group: None,
                    link_type: LinkType::Geo,
                    replication_mode: "ASYNC".to_string(),
                    replication_state: "SEEDING".to_string(),
                    role: "Secondary".to_string(),
                }])
            });

        let outcome = verify_replication(&client, &snapshot()).await;
        assert_eq!(
            outcome,
            VerificationOutcome::Established {
                partner_server: "sql-acme-qa2-eastus".to_string(),
                replication_state: "SEEDING".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn absence_is_a_warning_not_a_failure() {
        let mut client = MockControlPlane::new();
        client
            .expect_list_replication_links()
            .times(1)
            .returning(|_, _| Ok(vec![]));

        let outcome = verify_replication(&client, &snapshot()).await;
        assert_eq!(outcome, VerificationOutcome::NotYetVisible);
    }

    #[tokio::test]
    async fn a_failed_advisory_query_is_also_soft() {
        let mut client = MockControlPlane::new();
        client
            .expect_list_replication_links()
            .times(1)
            .returning(|_, _| {
                Err(ControlPlaneError::Timeout {
                    command: "az sql db replica list-links".into(),
                })
            });

        let outcome = verify_replication(&client, &snapshot()).await;
        assert_eq!(outcome, VerificationOutcome::NotYetVisible);
    }

    #[tokio::test]
    async fn zero_settling_wait_returns_immediately() {
        wait_for_settling(Duration::ZERO).await;
    }
}
