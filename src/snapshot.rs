//! Point-in-time configuration capture
//!
//! Everything needed to recreate a secondary is recorded here, immediately
//! before the database is unlinked and deleted. Capture never fails the run:
//! a failed link query degrades to an empty link list (the naming-convention
//! fallback infers the primary later), and missing tags are a data-quality
//! warning, not a blocker.

use chrono::Utc;
use tracing::{info, warn};

use crate::control_plane::ControlPlane;
use crate::model::{ReplicaDatabase, ReplicaServer, ReplicaSnapshot};

/// Capture a [`ReplicaSnapshot`] of one matched database.
///
/// Returns the snapshot plus any data-quality warnings for the audit report.
pub async fn capture<C: ControlPlane + ?Sized>(
    client: &C,
    server: &ReplicaServer,
    database: &ReplicaDatabase,
) -> (ReplicaSnapshot, Vec<String>) {
    let mut warnings = Vec::new();

    let links = match client.list_replication_links(server, &database.name).await {
        Ok(links) => {
            info!(
                server = %server.name,
                database = %database.name,
                links = links.len(),
                "captured replication links"
            );
            links
        }
        Err(e) => {
            let warning = format!(
                "could not list replication links for {}: {}; primary will be inferred from naming convention",
                database.name, e
            );
            warn!(server = %server.name, database = %database.name, error = %e,
                "link query failed, snapshotting with empty link list");
            warnings.push(warning);
            Vec::new()
        }
    };

    if database.tags.is_empty() {
        let warning = format!("database {} carries no resource tags", database.name);
        warn!(database = %database.name, "no resource tags on source database");
        warnings.push(warning);
    }

    let snapshot = ReplicaSnapshot {
        server: server.clone(),
        database: database.clone(),
        links,
        captured_at: Utc::now(),
    };

    info!(
        server = %snapshot.server.name,
        database = %snapshot.database.name,
        sku = %snapshot.database.sku,
        max_size_bytes = snapshot.database.max_size_bytes,
        "configuration snapshot captured"
    );

    (snapshot, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::{ControlPlaneError, MockControlPlane};
    use crate::model::{LinkType, ReplicationLink};

    fn server() -> ReplicaServer {
        ReplicaServer {
            name: "sql-acme-qa2-secondary-eastus".to_string(),
            resource_group: "rg-acme-qa2".to_string(),
            subscription: "0000-1111".to_string(),
            location: "eastus".to_string(),
        }
    }

    fn database(tags: bool) -> ReplicaDatabase {
        let json = if tags {
            r#"{"name": "db-gateway-acme-qa2-eastus", "tags": {"ClientName": "acme"}}"#
        } else {
            r#"{"name": "db-gateway-acme-qa2-eastus"}"#
        };
        serde_json::from_str(json).unwrap()
    }

    fn geo_link() -> ReplicationLink {
        ReplicationLink {
            partner_server: "sql-acme-qa2-eastus".to_string(),
            partner_database: "db-gateway-acme-qa2-eastus".to_string(),
            partner_resource_group: Some("rg-acme-qa2".to_string()),
            link_type: LinkType::Geo,
            replication_mode: "ASYNC".to_string(),
            replication_state: "CATCH_UP".to_string(),
            role: "Secondary".to_string(),
        }
    }

    #[tokio::test]
    async fn snapshot_records_links_and_configuration() {
        let mut client = MockControlPlane::new();
        client
            .expect_list_replication_links()
            .times(1)
            .returning(|_, _| Ok(vec![geo_link()]));

        let (snapshot, warnings) = capture(&client, &server(), &database(true)).await;
        assert_eq!(snapshot.links.len(), 1);
        assert_eq!(
            snapshot.partner_of_record().unwrap().partner_server,
            "sql-acme-qa2-eastus"
        );
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn link_query_failure_degrades_to_empty_links_with_warning() {
        let mut client = MockControlPlane::new();
        client
            .expect_list_replication_links()
            .times(1)
            .returning(|_, _| {
                Err(ControlPlaneError::Timeout {
                    command: "az sql db replica list-links".into(),
                })
            });

        let (snapshot, warnings) = capture(&client, &server(), &database(true)).await;
        assert!(snapshot.links.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("naming convention"));
    }

    #[tokio::test]
    async fn missing_tags_warn_but_do_not_block() {
        let mut client = MockControlPlane::new();
        client
            .expect_list_replication_links()
            .times(1)
            .returning(|_, _| Ok(vec![]));

        let (snapshot, warnings) = capture(&client, &server(), &database(false)).await;
        assert!(snapshot.database.tags.is_empty());
        assert!(warnings.iter().any(|w| w.contains("no resource tags")));
    }
}
