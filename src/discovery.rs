//! Secondary-server and candidate-database discovery
//!
//! Queries the cloud resource graph for servers tagged as secondary servers
//! of the destination environment. Zero rows on the first query is treated as
//! possible session staleness rather than an answer: the session is renewed
//! exactly once and the query repeated before "no secondary servers exist" is
//! believed. The caller decides what an empty result means.

use tracing::{debug, info, warn};

use crate::control_plane::ControlPlane;
use crate::model::{ReplicaDatabase, ReplicaServer};
use crate::retry::{retry_transient, RetryConfig};
use crate::{Error, Result};

/// Find every server hosting secondary replicas for the destination
/// environment.
///
/// An empty result after the single renew-and-retry is valid and is returned
/// as such; query failures are surfaced.
pub async fn discover_secondary_servers<C: ControlPlane + ?Sized>(
    client: &C,
    destination_environment: &str,
) -> Result<Vec<ReplicaServer>> {
    if destination_environment.is_empty() {
        return Err(Error::configuration(
            "destination environment must not be empty",
        ));
    }

    let retry = RetryConfig::default();
    let servers = retry_transient(
        &retry,
        "list_servers",
        || client.list_servers(destination_environment),
        |e| e.is_transient(),
    )
    .await?;

    if !servers.is_empty() {
        info!(
            environment = %destination_environment,
            count = servers.len(),
            "discovered secondary servers"
        );
        return Ok(servers);
    }

    // Zero rows often means the session went stale, not that nothing exists.
    warn!(
        environment = %destination_environment,
        "no secondary servers found; renewing control-plane session and retrying once"
    );
    client.renew_session().await?;

    let servers = client.list_servers(destination_environment).await?;
    if servers.is_empty() {
        warn!(
            environment = %destination_environment,
            "still no secondary servers after session renewal"
        );
    } else {
        info!(
            environment = %destination_environment,
            count = servers.len(),
            "discovered secondary servers after session renewal"
        );
    }
    Ok(servers)
}

/// List the non-system databases hosted on a server
pub async fn list_candidate_databases<C: ControlPlane + ?Sized>(
    client: &C,
    server: &ReplicaServer,
) -> Result<Vec<ReplicaDatabase>> {
    let retry = RetryConfig::default();
    let databases = retry_transient(
        &retry,
        "list_databases",
        || client.list_databases(server),
        |e| e.is_transient(),
    )
    .await?;

    let candidates: Vec<ReplicaDatabase> = databases
        .into_iter()
        .filter(|db| {
            if db.is_system() {
                debug!(server = %server.name, database = %db.name, "skipping system database");
                false
            } else {
                true
            }
        })
        .collect();

    debug!(
        server = %server.name,
        count = candidates.len(),
        "listed candidate databases"
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{ControlPlaneError, MockControlPlane};
    use mockall::predicate::*;

    fn server(name: &str) -> ReplicaServer {
        ReplicaServer {
            name: name.to_string(),
            resource_group: "rg-acme-qa2".to_string(),
            subscription: "0000-1111".to_string(),
            location: "eastus".to_string(),
        }
    }

    fn database(name: &str) -> ReplicaDatabase {
        serde_json::from_str(&format!(r#"{{"name": "{}"}}"#, name)).unwrap()
    }

    // ==========================================================================
    // Story: Zero servers triggers exactly one session renewal
    // ==========================================================================

    #[tokio::test]
    async fn when_servers_are_found_no_renewal_happens() {
        let mut client = MockControlPlane::new();
        client
            .expect_list_servers()
            .with(eq("qa2"))
            .times(1)
            .returning(|_| Ok(vec![server("sql-acme-qa2-secondary-eastus")]));
        client.expect_renew_session().times(0);

        let servers = discover_secondary_servers(&client, "qa2").await.unwrap();
        assert_eq!(servers.len(), 1);
    }

    #[tokio::test]
    async fn when_first_query_is_empty_session_is_renewed_and_query_repeated() {
        let mut client = MockControlPlane::new();
        let mut calls = 0u32;
        client.expect_list_servers().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(vec![])
            } else {
                Ok(vec![server("sql-acme-qa2-secondary-eastus")])
            }
        });
        client.expect_renew_session().times(1).returning(|| Ok(()));

        let servers = discover_secondary_servers(&client, "qa2").await.unwrap();
        assert_eq!(servers.len(), 1);
    }

    #[tokio::test]
    async fn when_both_queries_are_empty_the_empty_set_is_returned_not_an_error() {
        let mut client = MockControlPlane::new();
        client.expect_list_servers().times(2).returning(|_| Ok(vec![]));
        client.expect_renew_session().times(1).returning(|| Ok(()));

        let servers = discover_secondary_servers(&client, "qa2").await.unwrap();
        assert!(servers.is_empty());
    }

    #[tokio::test]
    async fn when_renewal_fails_the_error_is_surfaced() {
        let mut client = MockControlPlane::new();
        client.expect_list_servers().times(1).returning(|_| Ok(vec![]));
        client
            .expect_renew_session()
            .times(1)
            .returning(|| Err(ControlPlaneError::Session("login failed".into())));

        let err = discover_secondary_servers(&client, "qa2").await.unwrap_err();
        assert!(matches!(err, Error::ControlPlane(_)));
    }

    #[tokio::test]
    async fn empty_destination_environment_is_a_configuration_error() {
        let client = MockControlPlane::new();
        let err = discover_secondary_servers(&client, "").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    // ==========================================================================
    // Story: System databases never become candidates
    // ==========================================================================

    #[tokio::test]
    async fn system_databases_are_filtered_out() {
        let mut client = MockControlPlane::new();
        client.expect_list_databases().times(1).returning(|_| {
            Ok(vec![
                database("master"),
                database("db-gateway-acme-qa2-eastus"),
            ])
        });

        let candidates = list_candidate_databases(&client, &server("sql-x"))
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "db-gateway-acme-qa2-eastus");
    }

    #[tokio::test]
    async fn transient_listing_failures_are_retried() {
        let mut client = MockControlPlane::new();
        let mut calls = 0u32;
        client.expect_list_databases().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(ControlPlaneError::Timeout {
                    command: "az sql db list".into(),
                })
            } else {
                Ok(vec![database("db-gateway-acme-qa2-eastus")])
            }
        });

        let candidates = list_candidate_databases(&client, &server("sql-x"))
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
    }
}
