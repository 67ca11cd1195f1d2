//! Destructive teardown
//!
//! Deletes the secondary database object. The hosting server resource is
//! never targeted for deletion under any code path in this subsystem.

use tracing::info;

use crate::control_plane::ControlPlane;
use crate::model::ReplicaSnapshot;
use crate::{Error, Result};

/// Delete the snapshotted database from its server
pub async fn delete_database<C: ControlPlane + ?Sized>(
    client: &C,
    snapshot: &ReplicaSnapshot,
) -> Result<()> {
    client
        .delete_database(&snapshot.server, &snapshot.database.name)
        .await
        .map_err(|e| {
            Error::teardown(format!(
                "failed to delete {} on {}: {}",
                snapshot.database.name, snapshot.server.name, e
            ))
        })?;

    info!(
        server = %snapshot.server.name,
        database = %snapshot.database.name,
        "secondary database deleted"
    );
    Ok(())
}
