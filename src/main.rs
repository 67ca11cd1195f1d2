//! Replica Refresh - CLI for the replica lifecycle step of an environment refresh

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use replica_refresh::control_plane::AzCli;
use replica_refresh::manager::{RefreshOptions, ReplicaLifecycleManager};
use replica_refresh::DEFAULT_SETTLE_SECS;

/// Tear down and reconstruct the secondary database replicas of a destination
/// environment as part of a data refresh
#[derive(Parser, Debug)]
#[command(name = "replica-refresh", version, about, long_about = None)]
struct Cli {
    /// Destination environment whose secondary servers are refreshed
    #[arg(long, env = "REFRESH_DESTINATION_ENVIRONMENT")]
    destination_environment: String,

    /// Environment the wider refresh sourced its data from
    #[arg(long, env = "REFRESH_SOURCE_ENVIRONMENT")]
    source_environment: String,

    /// Namespace the data was sourced from
    #[arg(long, env = "REFRESH_SOURCE_NAMESPACE")]
    source_namespace: String,

    /// Namespace whose databases may be touched; refusing the production
    /// namespace is enforced before anything runs
    #[arg(long, env = "REFRESH_DESTINATION_NAMESPACE")]
    destination_namespace: String,

    /// Product component of the database naming convention
    #[arg(long, env = "REFRESH_PRODUCT")]
    product: Option<String>,

    /// Service component of the database naming convention
    #[arg(long, env = "REFRESH_SERVICE")]
    service: Option<String>,

    /// Settling wait between deployment success and link verification
    #[arg(long, default_value_t = DEFAULT_SETTLE_SECS)]
    settle_secs: u64,

    /// Report what would happen without severing, deleting, or deploying
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let options = RefreshOptions {
        destination_environment: cli.destination_environment,
        source_environment: cli.source_environment,
        source_namespace: cli.source_namespace,
        destination_namespace: cli.destination_namespace,
        product: cli.product.unwrap_or_default(),
        service: cli.service.unwrap_or_default(),
        dry_run: cli.dry_run,
        settle: Duration::from_secs(cli.settle_secs),
    };

    let manager = ReplicaLifecycleManager::new(AzCli::new(), options);
    let report = manager
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("replica refresh failed: {}", e))?;

    // Per-database follow-ups don't abort the run but must not exit clean
    let code = report.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
