//! Two-phase orchestration of a replica refresh
//!
//! Phase one drains: every matched database is snapshotted, unlinked, and
//! deleted before phase two begins. Phase two rebuilds from the accumulated
//! snapshots and verifies each new secondary. The drain must complete across
//! every database before the first rebuild: recreation on a server cannot be
//! allowed to race a delete of a sibling replica still in flight.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::control_plane::ControlPlane;
use crate::model::{ReplicaDatabase, ReplicaServer, ReplicaSnapshot};
use crate::recreate::RecreateConfig;
use crate::report::{DatabaseOutcome, ProcessedDatabase, RefreshReport};
use crate::verify::{VerificationOutcome, DEFAULT_SETTLE};
use crate::{discovery, matcher, recreate, severance, snapshot, teardown, verify};
use crate::{Error, Result};

/// Caller-supplied parameters for one refresh run
#[derive(Clone, Debug)]
pub struct RefreshOptions {
    /// Environment whose secondary servers are refreshed
    pub destination_environment: String,
    /// Environment the wider refresh sourced its data from (audit only here)
    pub source_environment: String,
    /// Namespace the data was sourced from (audit only here)
    pub source_namespace: String,
    /// Namespace whose databases may be touched; must never be the
    /// production sentinel
    pub destination_namespace: String,
    /// Product component of the database naming convention (may be empty)
    pub product: String,
    /// Service component of the database naming convention (may be empty)
    pub service: String,
    /// Report what would happen without severing, deleting, or deploying
    pub dry_run: bool,
    /// Settling wait between a successful deployment and link verification
    pub settle: Duration,
}

impl RefreshOptions {
    fn validate(&self) -> Result<()> {
        if self.destination_environment.is_empty() {
            return Err(Error::configuration(
                "destination environment must not be empty",
            ));
        }
        if self.destination_namespace.is_empty() {
            return Err(Error::configuration(
                "destination namespace must not be empty",
            ));
        }
        matcher::ensure_not_production(&self.destination_namespace)
    }
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            destination_environment: String::new(),
            source_environment: String::new(),
            source_namespace: String::new(),
            destination_namespace: String::new(),
            product: String::new(),
            service: String::new(),
            dry_run: false,
            settle: DEFAULT_SETTLE,
        }
    }
}

/// A database that finished phase one, successfully or not
struct Drained {
    snapshot: ReplicaSnapshot,
    warnings: Vec<String>,
    teardown_error: Option<String>,
}

/// Orchestrates the full replica lifecycle against a control-plane client
pub struct ReplicaLifecycleManager<C: ControlPlane> {
    client: C,
    options: RefreshOptions,
    recreate_config: RecreateConfig,
}

impl<C: ControlPlane> ReplicaLifecycleManager<C> {
    /// Create a manager for one run
    pub fn new(client: C, options: RefreshOptions) -> Self {
        Self {
            client,
            options,
            recreate_config: RecreateConfig::default(),
        }
    }

    /// Override the deployment polling discipline
    pub fn with_recreate_config(mut self, recreate_config: RecreateConfig) -> Self {
        self.recreate_config = recreate_config;
        self
    }

    /// Run the refresh and return the audit report.
    ///
    /// Configuration errors, severance failures, and surfaced discovery
    /// failures return `Err` immediately; per-database teardown and
    /// recreation failures are recorded in the report instead.
    pub async fn run(&self) -> Result<RefreshReport> {
        // Safety gate first: nothing may be queried, let alone mutated, for
        // the production namespace.
        self.options.validate()?;
        let opts = &self.options;

        info!(
            destination_environment = %opts.destination_environment,
            destination_namespace = %opts.destination_namespace,
            source_environment = %opts.source_environment,
            source_namespace = %opts.source_namespace,
            dry_run = opts.dry_run,
            "starting replica refresh"
        );
        let mut report =
            RefreshReport::new(&opts.destination_environment, &opts.source_environment);

        let servers =
            discovery::discover_secondary_servers(&self.client, &opts.destination_environment)
                .await?;
        if servers.is_empty() {
            warn!(
                environment = %opts.destination_environment,
                "no secondary servers exist for this environment; nothing to do"
            );
            println!("{}", report.render());
            return Ok(report);
        }

        let matched = self.match_candidates(&servers).await?;
        info!(count = matched.len(), "matched secondary databases");

        if opts.dry_run {
            info!("dry-run: severance, teardown, recreation, and verification are skipped");
            for (server, database) in matched {
                report.record(ProcessedDatabase {
                    database: database.name.clone(),
                    server: server.name.clone(),
                    sku: database.sku.clone(),
                    tags: database.tags.clone(),
                    outcome: DatabaseOutcome::DryRun,
                    warnings: Vec::new(),
                });
            }
            println!("{}", report.render());
            return Ok(report);
        }

        // Phase 1: drain every matched database before any recreation
        info!("[Phase 1] Teardown: snapshot, sever, delete");
        let mut drained = Vec::with_capacity(matched.len());
        for (server, database) in matched {
            let (snap, warnings) = snapshot::capture(&self.client, &server, &database).await;
            severance::sever_links(&self.client, &snap).await?;

            let teardown_error = match teardown::delete_database(&self.client, &snap).await {
                Ok(()) => None,
                Err(e) => {
                    error!(
                        database = %snap.database.name,
                        server = %snap.server.name,
                        error = %e,
                        "teardown failed; snapshot retained but recreation will be skipped, manual intervention required"
                    );
                    Some(e.to_string())
                }
            };
            drained.push(Drained {
                snapshot: snap,
                warnings,
                teardown_error,
            });
        }

        // Phase 2: rebuild from the accumulated snapshots
        info!("[Phase 2] Recreation: deploy, settle, verify");
        for item in drained {
            let snap = item.snapshot;
            let outcome = if let Some(reason) = item.teardown_error {
                DatabaseOutcome::TeardownFailed(reason)
            } else {
                self.rebuild_one(&snap).await
            };

            report.record(ProcessedDatabase {
                database: snap.database.name.clone(),
                server: snap.server.name.clone(),
                sku: snap.database.sku.clone(),
                tags: snap.database.tags.clone(),
                outcome,
                warnings: item.warnings,
            });
        }

        println!("{}", report.render());
        info!(
            processed = report.databases_processed(),
            follow_up_required = report.requires_follow_up(),
            "replica refresh complete"
        );
        Ok(report)
    }

    /// Apply the name gate and the ownership gate across all servers
    async fn match_candidates(
        &self,
        servers: &[ReplicaServer],
    ) -> Result<Vec<(ReplicaServer, ReplicaDatabase)>> {
        let opts = &self.options;
        let mut matched = Vec::new();
        for server in servers {
            let candidates = discovery::list_candidate_databases(&self.client, server).await?;
            let location = server.location_token();
            for database in candidates {
                if matcher::matches(
                    &database.name,
                    &opts.destination_namespace,
                    &opts.product,
                    &opts.service,
                    &opts.destination_environment,
                    &location,
                )
                .is_none()
                {
                    debug!(
                        server = %server.name,
                        database = %database.name,
                        "name does not match the refresh identity, skipping"
                    );
                    continue;
                }
                matcher::ensure_ownership(&database, &opts.destination_namespace)?;
                info!(
                    server = %server.name,
                    database = %database.name,
                    sku = %database.sku,
                    "matched secondary database"
                );
                matched.push((server.clone(), database));
            }
        }
        Ok(matched)
    }

    /// Recreate one drained database and verify its new link
    async fn rebuild_one(&self, snap: &ReplicaSnapshot) -> DatabaseOutcome {
        match recreate::recreate_database(&self.client, snap, &self.recreate_config).await {
            Err(e) => {
                error!(
                    database = %snap.database.name,
                    error = %e,
                    "recreation failed; manual follow-up required"
                );
                DatabaseOutcome::RecreationFailed(e.to_string())
            }
            Ok(()) => {
                verify::wait_for_settling(self.options.settle).await;
                match verify::verify_replication(&self.client, snap).await {
                    VerificationOutcome::Established { .. } => DatabaseOutcome::Recreated,
                    VerificationOutcome::NotYetVisible => DatabaseOutcome::RecreatedPendingLink,
                }
            }
        }
    }
}
