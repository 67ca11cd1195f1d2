//! Naming-convention matching and ownership safety gates
//!
//! Secondary servers are shared: a server discovered for one environment can
//! host databases belonging to unrelated namespaces. Two independent gates
//! decide what this subsystem may touch. The name gate skips anything that
//! does not carry the expected composite token; skipping is silent and safe.
//! The ownership gate runs after a name match and is the opposite: a mismatch
//! there means the name heuristic produced a false positive, so it aborts the
//! whole run rather than risk mutating another tenant's data.

use crate::model::ReplicaDatabase;
use crate::{Error, Result, OWNERSHIP_TAG, PRODUCTION_NAMESPACE};

/// Refuse to run against the production namespace.
///
/// This is a hard safety invariant checked before any control-plane call.
pub fn ensure_not_production(destination_namespace: &str) -> Result<()> {
    if destination_namespace.eq_ignore_ascii_case(PRODUCTION_NAMESPACE) {
        return Err(Error::configuration(format!(
            "destination namespace '{}' is the production namespace; refusing to refresh replicas",
            destination_namespace
        )));
    }
    Ok(())
}

/// Build the composite token a candidate database name must contain.
///
/// Joins the non-empty identity components in naming-convention order,
/// lower-cased: `{product}-{service}-{namespace}-{environment}-{location}`.
pub fn expected_token(
    source_product: &str,
    source_service: &str,
    destination_namespace: &str,
    source_environment: &str,
    source_location: &str,
) -> String {
    [
        source_product,
        source_service,
        destination_namespace,
        source_environment,
        source_location,
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .map(|part| part.to_lowercase())
    .collect::<Vec<_>>()
    .join("-")
}

/// Decide whether a database name belongs to this refresh.
///
/// Returns the matched name, or `None` when the database should be skipped
/// (it belongs to an unrelated namespace on a shared server).
pub fn matches<'a>(
    database_name: &'a str,
    destination_namespace: &str,
    source_product: &str,
    source_service: &str,
    source_environment: &str,
    source_location: &str,
) -> Option<&'a str> {
    let token = expected_token(
        source_product,
        source_service,
        destination_namespace,
        source_environment,
        source_location,
    );
    if token.is_empty() {
        return None;
    }
    if database_name.to_lowercase().contains(&token) {
        Some(database_name)
    } else {
        None
    }
}

/// Verify the ownership tag of a name-matched database.
///
/// A missing or mismatching tag is a configuration error: the name heuristic
/// and the discovery query disagree about whose data this is, and no further
/// mutation can be trusted.
pub fn ensure_ownership(database: &ReplicaDatabase, destination_namespace: &str) -> Result<()> {
    match database.ownership() {
        Some(owner) if owner == destination_namespace => Ok(()),
        Some(owner) => Err(Error::configuration(format!(
            "database '{}' matched by name but its {} tag is '{}', not '{}'; aborting before any mutation",
            database.name, OWNERSHIP_TAG, owner, destination_namespace
        ))),
        None => Err(Error::configuration(format!(
            "database '{}' matched by name but carries no {} tag; aborting before any mutation",
            database.name, OWNERSHIP_TAG
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn database(name: &str, tags: &[(&str, &str)]) -> ReplicaDatabase {
        ReplicaDatabase {
            name: name.to_string(),
            sku: Default::default(),
            max_size_bytes: 0,
            zone_redundant: false,
            read_scale: Default::default(),
            elastic_pool_id: None,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn when_destination_is_production_sentinel_the_guard_throws() {
        let err = ensure_not_production("manufacturo").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        // Case variations are the same namespace
        assert!(ensure_not_production("Manufacturo").is_err());

        assert!(ensure_not_production("acme").is_ok());
    }

    #[test]
    fn token_joins_non_empty_components_in_order() {
        assert_eq!(
            expected_token("", "gateway", "acme", "qa2", "eastus"),
            "gateway-acme-qa2-eastus"
        );
        assert_eq!(
            expected_token("db", "gateway", "acme", "qa2", "eastus"),
            "db-gateway-acme-qa2-eastus"
        );
        assert_eq!(expected_token("", "", "acme", "qa2", ""), "acme-qa2");
    }

    #[test]
    fn when_name_contains_the_token_the_database_matches() {
        let matched = matches(
            "db-gateway-acme-qa2-eastus",
            "acme",
            "",
            "gateway",
            "qa2",
            "eastus",
        );
        assert_eq!(matched, Some("db-gateway-acme-qa2-eastus"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let matched = matches(
            "DB-Gateway-ACME-QA2-EastUS",
            "acme",
            "",
            "gateway",
            "qa2",
            "eastus",
        );
        assert!(matched.is_some());
    }

    #[test]
    fn when_name_lacks_the_token_the_database_is_skipped() {
        // Another tenant's database on the same shared server
        assert_eq!(
            matches(
                "db-gateway-other-qa2-eastus",
                "acme",
                "",
                "gateway",
                "qa2",
                "eastus"
            ),
            None
        );
        // Same tenant, different environment
        assert_eq!(
            matches(
                "db-gateway-acme-uat-eastus",
                "acme",
                "",
                "gateway",
                "qa2",
                "eastus"
            ),
            None
        );
    }

    #[test]
    fn an_all_empty_identity_never_matches() {
        assert_eq!(matches("anything", "", "", "", "", ""), None);
    }

    #[test]
    fn when_ownership_tag_matches_the_gate_passes() {
        let db = database("db-gateway-acme-qa2-eastus", &[("ClientName", "acme")]);
        assert!(ensure_ownership(&db, "acme").is_ok());
    }

    #[test]
    fn when_ownership_tag_mismatches_the_gate_throws() {
        let db = database("db-gateway-acme-qa2-eastus", &[("ClientName", "other-tenant")]);
        let err = ensure_ownership(&db, "acme").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("other-tenant"));
    }

    #[test]
    fn when_ownership_tag_is_missing_the_gate_throws() {
        let db = database("db-gateway-acme-qa2-eastus", &[("Environment", "qa2")]);
        assert!(ensure_ownership(&db, "acme").is_err());
    }

    #[test]
    fn ownership_comparison_is_exact_not_case_folded() {
        let db = database("db-gateway-acme-qa2-eastus", &[("ClientName", "Acme")]);
        assert!(ensure_ownership(&db, "acme").is_err());
    }
}
