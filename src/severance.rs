//! Replication-link termination
//!
//! Links are severed from the secondary side, targeting the specific partner
//! recorded in each descriptor; a server can hold links to several partners
//! and a blanket "remove all links" would overreach. Only geo links are
//! terminable by this subsystem; other kinds are logged as not handled and
//! skipped. A termination failure is fatal to the run: deleting a
//! still-linked secondary risks an inconsistent operation against the
//! primary.

use tracing::{info, warn};

use crate::control_plane::ControlPlane;
use crate::model::ReplicaSnapshot;
use crate::{Error, Result};

/// Terminate every terminable link captured in the snapshot
pub async fn sever_links<C: ControlPlane + ?Sized>(
    client: &C,
    snapshot: &ReplicaSnapshot,
) -> Result<()> {
    for link in &snapshot.links {
        if !link.link_type.is_terminable() {
            warn!(
                database = %snapshot.database.name,
                partner_server = %link.partner_server,
                link_type = %link.link_type,
                "link type not handled by this subsystem, skipping termination"
            );
            continue;
        }

        client
            .delete_replication_link(&snapshot.server, &snapshot.database.name, link)
            .await
            .map_err(|e| {
                Error::severance(format!(
                    "failed to terminate link from {}/{} to {}/{}: {}",
                    snapshot.server.name,
                    snapshot.database.name,
                    link.partner_server,
                    link.partner_database,
                    e
                ))
            })?;

        info!(
            database = %snapshot.database.name,
            partner_server = %link.partner_server,
            partner_database = %link.partner_database,
            "replication link terminated"
        );
    }
    Ok(())
}
