//! `az` CLI control-plane client
//!
//! Shells out to the vendor CLI with a per-command timeout and parses the
//! JSON it prints. Authentication is a precondition: the process must already
//! hold a usable session, except for [`ControlPlane::renew_session`] which
//! re-logs-in non-interactively via the machine identity.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{ControlPlane, ControlPlaneError, CpResult};
use crate::model::{DeploymentState, ReplicaDatabase, ReplicaServer, ReplicationLink};
use crate::{ENVIRONMENT_TAG, SECONDARY_ROLE, SERVER_ROLE_TAG};

/// Default wall-clock budget for a single CLI invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Control-plane client backed by the `az` CLI
#[derive(Clone, Debug)]
pub struct AzCli {
    command_timeout: Duration,
}

impl AzCli {
    /// Create a client with the default per-command timeout
    pub fn new() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the per-command timeout
    pub fn with_timeout(command_timeout: Duration) -> Self {
        Self { command_timeout }
    }

    /// Short label for logs and errors: the subcommand, not the full argv
    fn label(args: &[&str]) -> String {
        let head: Vec<&str> = args.iter().take(3).copied().collect();
        format!("az {}", head.join(" "))
    }

    /// Run `az` with the given arguments and return stdout
    async fn run(&self, args: &[&str]) -> CpResult<String> {
        let label = Self::label(args);
        debug!(command = %label, "invoking control-plane CLI");

        let output = tokio::time::timeout(
            self.command_timeout,
            Command::new("az").args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| ControlPlaneError::Timeout {
            command: label.clone(),
        })??;

        if !output.status.success() {
            return Err(ControlPlaneError::CommandFailed {
                command: label,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run `az` and parse its stdout as JSON
    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> CpResult<T> {
        let label = Self::label(args);
        let stdout = self.run(args).await?;
        serde_json::from_str(&stdout).map_err(|e| ControlPlaneError::Parse {
            command: label,
            message: e.to_string(),
        })
    }
}

impl Default for AzCli {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource-graph query response envelope
#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    data: Vec<ReplicaServer>,
}

/// The `properties` object of a deployment, as printed by `deployment group show`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentProperties {
    #[serde(default)]
    provisioning_state: String,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Build the resource-graph query for secondary servers of one environment.
///
/// Tag values are injected into a quoted KQL literal, so embedded quotes must
/// be doubled.
fn secondary_server_query(destination_environment: &str) -> String {
    let environment = destination_environment.replace('\'', "''");
    format!(
        "resources \
         | where type =~ 'microsoft.sql/servers' \
         | where tags['{SERVER_ROLE_TAG}'] =~ '{SECONDARY_ROLE}' \
         | where tags['{ENVIRONMENT_TAG}'] =~ '{environment}' \
         | project name, resourceGroup, subscriptionId, location"
    )
}

/// Authoritative "the resource is not there" answers from the CLI
fn is_not_found(message: &str) -> bool {
    message.contains("ResourceNotFound")
        || message.contains("ResourceGroupNotFound")
        || message.contains("was not found")
        || message.contains("does not exist")
}

#[async_trait]
impl ControlPlane for AzCli {
    async fn list_servers(&self, destination_environment: &str) -> CpResult<Vec<ReplicaServer>> {
        let query = secondary_server_query(destination_environment);
        let response: GraphResponse = self
            .run_json(&[
                "graph",
                "query",
                "-q",
                &query,
                "--first",
                "1000",
                "--output",
                "json",
            ])
            .await?;
        Ok(response.data)
    }

    async fn list_databases(&self, server: &ReplicaServer) -> CpResult<Vec<ReplicaDatabase>> {
        self.run_json(&[
            "sql",
            "db",
            "list",
            "--subscription",
            &server.subscription,
            "--resource-group",
            &server.resource_group,
            "--server",
            &server.name,
            "--output",
            "json",
        ])
        .await
    }

    async fn get_database(
        &self,
        subscription: &str,
        resource_group: &str,
        server: &str,
        database: &str,
    ) -> CpResult<Option<ReplicaDatabase>> {
        let result = self
            .run_json(&[
                "sql",
                "db",
                "show",
                "--subscription",
                subscription,
                "--resource-group",
                resource_group,
                "--server",
                server,
                "--name",
                database,
                "--output",
                "json",
            ])
            .await;

        match result {
            Ok(db) => Ok(Some(db)),
            Err(ControlPlaneError::CommandFailed { ref message, .. }) if is_not_found(message) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn list_replication_links(
        &self,
        server: &ReplicaServer,
        database: &str,
    ) -> CpResult<Vec<ReplicationLink>> {
        self.run_json(&[
            "sql",
            "db",
            "replica",
            "list-links",
            "--subscription",
            &server.subscription,
            "--resource-group",
            &server.resource_group,
            "--server",
            &server.name,
            "--name",
            database,
            "--output",
            "json",
        ])
        .await
    }

    async fn delete_replication_link(
        &self,
        server: &ReplicaServer,
        database: &str,
        link: &ReplicationLink,
    ) -> CpResult<()> {
        let mut args: Vec<&str> = vec![
            "sql",
            "db",
            "replica",
            "delete-link",
            "--subscription",
            &server.subscription,
            "--resource-group",
            &server.resource_group,
            "--server",
            &server.name,
            "--name",
            database,
            "--partner-server",
            &link.partner_server,
            "--yes",
        ];
        if let Some(ref partner_rg) = link.partner_resource_group {
            args.push("--partner-resource-group");
            args.push(partner_rg);
        }
        self.run(&args).await.map(|_| ())
    }

    async fn delete_database(&self, server: &ReplicaServer, database: &str) -> CpResult<()> {
        self.run(&[
            "sql",
            "db",
            "delete",
            "--subscription",
            &server.subscription,
            "--resource-group",
            &server.resource_group,
            "--server",
            &server.name,
            "--name",
            database,
            "--yes",
        ])
        .await
        .map(|_| ())
    }

    async fn submit_deployment(
        &self,
        subscription: &str,
        resource_group: &str,
        deployment_name: &str,
        template_path: &Path,
    ) -> CpResult<()> {
        let template = template_path.to_string_lossy();
        self.run(&[
            "deployment",
            "group",
            "create",
            "--subscription",
            subscription,
            "--resource-group",
            resource_group,
            "--name",
            deployment_name,
            "--template-file",
            template.as_ref(),
            "--no-wait",
        ])
        .await
        .map(|_| ())
    }

    async fn get_deployment_status(
        &self,
        subscription: &str,
        resource_group: &str,
        deployment_name: &str,
    ) -> CpResult<DeploymentState> {
        let properties: DeploymentProperties = self
            .run_json(&[
                "deployment",
                "group",
                "show",
                "--subscription",
                subscription,
                "--resource-group",
                resource_group,
                "--name",
                deployment_name,
                "--query",
                "properties",
                "--output",
                "json",
            ])
            .await?;

        let state = match properties.provisioning_state.as_str() {
            "Succeeded" => DeploymentState::Succeeded,
            "Failed" => {
                let reason = properties
                    .error
                    .as_ref()
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("deployment reported Failed")
                    .to_string();
                DeploymentState::Failed(reason)
            }
            "Canceled" => DeploymentState::Canceled,
            "Accepted" | "Running" | "Creating" | "Deploying" => DeploymentState::Running,
            other => DeploymentState::Other(other.to_string()),
        };
        Ok(state)
    }

    async fn renew_session(&self) -> CpResult<()> {
        // Non-interactive renewal: the refresh runs under a machine identity
        self.run(&["login", "--identity", "--only-show-errors"])
            .await
            .map(|_| ())
            .map_err(|e| ControlPlaneError::Session(e.to_string()))
    }
}
