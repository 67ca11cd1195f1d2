//! Data model: servers, databases, SKUs, replication links, and snapshots

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::OWNERSHIP_TAG;

/// Deserialize an explicit JSON `null` as the field's default value.
///
/// The control plane serializes absent tags and flags as `null`, not as a
/// missing key, so `#[serde(default)]` alone is not enough.
fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A compute host exposing one or more secondary databases.
///
/// Never created or deleted by this subsystem; only its child databases are
/// mutated. Discovered fresh on every run.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaServer {
    /// Server name
    pub name: String,
    /// Resource group containing the server
    pub resource_group: String,
    /// Subscription the server lives in
    #[serde(rename = "subscriptionId")]
    pub subscription: String,
    /// Region, as reported by the resource graph (e.g. "eastus")
    pub location: String,
}

impl ReplicaServer {
    /// Region token usable in database-name matching ("East US" -> "eastus")
    pub fn location_token(&self) -> String {
        self.location.to_lowercase().replace(' ', "")
    }
}

impl std::fmt::Display for ReplicaServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.resource_group)
    }
}

/// Compute tier of a database
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Sku {
    /// SKU name (e.g. "GP_Gen5_2")
    #[serde(default)]
    pub name: String,
    /// Service tier (e.g. "GeneralPurpose")
    #[serde(default)]
    pub tier: String,
    /// Hardware family, when the tier has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    /// Capacity in tier units (vCores or DTUs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
}

impl std::fmt::Display for Sku {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tier.is_empty() || self.tier == self.name {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.tier)
        }
    }
}

/// Read-scale setting of a database
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum ReadScale {
    /// Read-scale replicas enabled
    Enabled,
    /// Read-scale replicas disabled
    #[default]
    Disabled,
}

impl std::fmt::Display for ReadScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enabled => write!(f, "Enabled"),
            Self::Disabled => write!(f, "Disabled"),
        }
    }
}

/// A single secondary database instance as reported by the control plane
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaDatabase {
    /// Database name
    pub name: String,
    /// Compute tier
    #[serde(default)]
    pub sku: Sku,
    /// Storage ceiling in bytes
    #[serde(default, deserialize_with = "null_to_default")]
    pub max_size_bytes: i64,
    /// Whether the database is spread across availability zones
    #[serde(default, deserialize_with = "null_to_default")]
    pub zone_redundant: bool,
    /// Read-scale flag
    #[serde(default, deserialize_with = "null_to_default")]
    pub read_scale: ReadScale,
    /// Elastic pool the database belongs to, if any
    #[serde(default)]
    pub elastic_pool_id: Option<String>,
    /// Resource tags; must include the ownership tag for the database to be
    /// eligible for the lifecycle
    #[serde(default, deserialize_with = "null_to_default")]
    pub tags: BTreeMap<String, String>,
}

impl ReplicaDatabase {
    /// The tenant/namespace this database belongs to, per its ownership tag
    pub fn ownership(&self) -> Option<&str> {
        self.tags.get(OWNERSHIP_TAG).map(String::as_str)
    }

    /// System databases are never lifecycle candidates
    pub fn is_system(&self) -> bool {
        self.name.eq_ignore_ascii_case("master")
    }
}

/// Kind of replication link between a secondary and its partner
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkType {
    /// Cross-server geo-replication link; the only kind this subsystem severs
    Geo,
    /// Named replica link
    Named,
    /// Standby replica link
    Standby,
    /// Any link type this subsystem does not recognize
    #[serde(other)]
    Other,
}

impl Default for LinkType {
    // API versions that predate the linkType field only ever reported geo links
    fn default() -> Self {
        Self::Geo
    }
}

impl LinkType {
    /// Whether this subsystem is able to terminate links of this type
    pub fn is_terminable(&self) -> bool {
        matches!(self, Self::Geo)
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Geo => write!(f, "GEO"),
            Self::Named => write!(f, "NAMED"),
            Self::Standby => write!(f, "STANDBY"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

/// One replication link between a secondary database and its partner
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationLink {
    /// Server hosting the partner (primary) database
    pub partner_server: String,
    /// Partner database name
    pub partner_database: String,
    /// Resource group of the partner server, when the control plane reports it
    #[serde(default)]
    pub partner_resource_group: Option<String>,
    /// Link kind; only geo links are terminable
    #[serde(default)]
    pub link_type: LinkType,
    /// Replication mode (e.g. "ASYNC")
    #[serde(default)]
    pub replication_mode: String,
    /// Current replication state (e.g. "CATCH_UP")
    #[serde(default)]
    pub replication_state: String,
    /// Role of the local database in this link (e.g. "Secondary")
    #[serde(default)]
    pub role: String,
}

/// Point-in-time description of a secondary database, captured immediately
/// before severance and consumed once during recreation.
///
/// Owned by a single orchestration run and discarded at process exit; never
/// persisted to external storage.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicaSnapshot {
    /// The hosting server
    pub server: ReplicaServer,
    /// Full database description at capture time
    pub database: ReplicaDatabase,
    /// Replication links at capture time; empty when the link query failed
    /// and the naming-convention fallback will infer the primary
    pub links: Vec<ReplicationLink>,
    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
}

impl ReplicaSnapshot {
    /// The link descriptor identifying the current primary, if one was captured
    pub fn partner_of_record(&self) -> Option<&ReplicationLink> {
        self.links.first()
    }
}

/// Terminal and in-flight states of an asynchronous declarative deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeploymentState {
    /// The control plane is still processing the deployment
    Running,
    /// The deployment reached its successful terminal state
    Succeeded,
    /// The deployment failed, with whatever diagnostic the control plane gave
    Failed(String),
    /// The deployment was canceled out from under us
    Canceled,
    /// A state string this subsystem does not recognize
    Other(String),
}

impl DeploymentState {
    /// Whether the deployment has stopped moving
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running | Self::Other(_))
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed(reason) => write!(f, "Failed: {}", reason),
            Self::Canceled => write!(f, "Canceled"),
            Self::Other(state) => write!(f, "{}", state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database_json() -> &'static str {
        r#"{
            "name": "db-gateway-acme-qa2-eastus",
            "sku": {"name": "GP_Gen5_2", "tier": "GeneralPurpose", "family": "Gen5", "capacity": 2},
            "maxSizeBytes": 34359738368,
            "zoneRedundant": false,
            "readScale": "Disabled",
            "elasticPoolId": null,
            "tags": {"ClientName": "acme", "Environment": "qa2"}
        }"#
    }

    #[test]
    fn database_deserializes_from_control_plane_json() {
        let db: ReplicaDatabase = serde_json::from_str(database_json()).unwrap();
        assert_eq!(db.name, "db-gateway-acme-qa2-eastus");
        assert_eq!(db.sku.name, "GP_Gen5_2");
        assert_eq!(db.max_size_bytes, 34_359_738_368);
        assert_eq!(db.read_scale, ReadScale::Disabled);
        assert_eq!(db.ownership(), Some("acme"));
        assert!(!db.is_system());
    }

    #[test]
    fn null_tags_deserialize_as_empty() {
        let db: ReplicaDatabase =
            serde_json::from_str(r#"{"name": "db-x", "tags": null, "maxSizeBytes": null}"#).unwrap();
        assert!(db.tags.is_empty());
        assert_eq!(db.ownership(), None);
        assert_eq!(db.max_size_bytes, 0);
    }

    #[test]
    fn master_is_a_system_database() {
        let db: ReplicaDatabase = serde_json::from_str(r#"{"name": "master"}"#).unwrap();
        assert!(db.is_system());
    }

    #[test]
    fn link_type_defaults_to_geo_when_absent() {
        let link: ReplicationLink = serde_json::from_str(
            r#"{"partnerServer": "sql-acme-qa2-eastus", "partnerDatabase": "db-gateway-acme-qa2-eastus"}"#,
        )
        .unwrap();
        assert_eq!(link.link_type, LinkType::Geo);
        assert!(link.link_type.is_terminable());
    }

    #[test]
    fn unrecognized_link_types_are_not_terminable() {
        let link: ReplicationLink = serde_json::from_str(
            r#"{"partnerServer": "s", "partnerDatabase": "d", "linkType": "CHAOS"}"#,
        )
        .unwrap();
        assert_eq!(link.link_type, LinkType::Other);
        assert!(!link.link_type.is_terminable());

        let named: ReplicationLink = serde_json::from_str(
            r#"{"partnerServer": "s", "partnerDatabase": "d", "linkType": "NAMED"}"#,
        )
        .unwrap();
        assert!(!named.link_type.is_terminable());
    }

    #[test]
    fn server_location_token_strips_display_formatting() {
        let server = ReplicaServer {
            name: "sql-acme-qa2-secondary-eastus".to_string(),
            resource_group: "rg-acme-qa2".to_string(),
            subscription: "0000".to_string(),
            location: "East US".to_string(),
        };
        assert_eq!(server.location_token(), "eastus");
    }

    #[test]
    fn deployment_state_terminality() {
        assert!(DeploymentState::Succeeded.is_terminal());
        assert!(DeploymentState::Failed("boom".into()).is_terminal());
        assert!(DeploymentState::Canceled.is_terminal());
        assert!(!DeploymentState::Running.is_terminal());
        assert!(!DeploymentState::Other("Accepted".into()).is_terminal());
    }
}
