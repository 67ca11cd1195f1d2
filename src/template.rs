//! Typed declarative deployment documents
//!
//! A recreation is submitted as a single declarative document describing the
//! desired secondary. The one semantic that must never be lost is the create
//! mode: the document means "create as a secondary replica of an existing
//! source database", not "create a blank database at this name". A blank
//! database at the same name is not a replica and must not pass for one.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{ReplicaSnapshot, Sku};
use crate::Result;

/// Deployment-template schema the control plane expects
pub const TEMPLATE_SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2019-04-01/deploymentTemplate.json#";

/// Resource API version used for database resources
pub const SQL_DATABASE_API_VERSION: &str = "2023-05-01-preview";

/// Fully qualified resource id of a database
pub fn database_resource_id(
    subscription: &str,
    resource_group: &str,
    server: &str,
    database: &str,
) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Sql/servers/{}/databases/{}",
        subscription, resource_group, server, database
    )
}

/// A declarative deployment document for exactly one database resource
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTemplate {
    #[serde(rename = "$schema")]
    schema: String,
    content_version: String,
    resources: Vec<DatabaseResource>,
}

/// The single database resource inside a [`DeploymentTemplate`]
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseResource {
    #[serde(rename = "type")]
    resource_type: String,
    api_version: String,
    /// "server/database" path form
    name: String,
    location: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
    sku: Sku,
    properties: serde_json::Value,
}

impl DeploymentTemplate {
    /// Build the document recreating a snapshotted database as a secondary
    /// sourced from the given primary database id.
    ///
    /// Tags, SKU, storage ceiling, redundancy, and read-scale are carried
    /// over from the snapshot unchanged.
    pub fn secondary_of(snapshot: &ReplicaSnapshot, source_database_id: &str) -> Self {
        let database = &snapshot.database;
        let mut properties = serde_json::json!({
            "createMode": "Secondary",
            "secondaryType": "Geo",
            "sourceDatabaseId": source_database_id,
            "maxSizeBytes": database.max_size_bytes,
            "zoneRedundant": database.zone_redundant,
            "readScale": database.read_scale.to_string(),
        });
        if let Some(ref pool) = database.elastic_pool_id {
            properties["elasticPoolId"] = serde_json::json!(pool);
        }

        Self {
            schema: TEMPLATE_SCHEMA.to_string(),
            content_version: "1.0.0.0".to_string(),
            resources: vec![DatabaseResource {
                resource_type: "Microsoft.Sql/servers/databases".to_string(),
                api_version: SQL_DATABASE_API_VERSION.to_string(),
                name: format!("{}/{}", snapshot.server.name, database.name),
                location: snapshot.server.location.clone(),
                tags: database.tags.clone(),
                sku: database.sku.clone(),
                properties,
            }],
        }
    }

    /// Serialize the document for submission
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::Error::serialization(e.to_string()))
    }
}
