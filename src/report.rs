//! Run report
//!
//! Downstream operators audit a refresh through this report: every database
//! actually processed, the SKU and tags it was recreated with, and whether it
//! needs manual follow-up. Tooling downstream parses the rendered table, so
//! treat its shape as stable output, not debug logging.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::model::Sku;

/// Final state of one database's lifecycle within a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseOutcome {
    /// Dry-run: matched and reported, nothing touched
    DryRun,
    /// Recreated and the replication link was already visible
    Recreated,
    /// Recreated; the link was not visible yet at verification time
    RecreatedPendingLink,
    /// Deleted but not recreated: the delete itself failed mid-lifecycle
    TeardownFailed(String),
    /// Torn down but recreation failed; the database is gone until an
    /// operator intervenes
    RecreationFailed(String),
}

impl DatabaseOutcome {
    /// Whether an operator must act on this database
    pub fn requires_follow_up(&self) -> bool {
        matches!(self, Self::TeardownFailed(_) | Self::RecreationFailed(_))
    }
}

impl std::fmt::Display for DatabaseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DryRun => write!(f, "dry-run (not touched)"),
            Self::Recreated => write!(f, "recreated, link established"),
            Self::RecreatedPendingLink => write!(f, "recreated, link pending"),
            Self::TeardownFailed(reason) => {
                write!(f, "MANUAL FOLLOW-UP: teardown failed ({})", reason)
            }
            Self::RecreationFailed(reason) => {
                write!(f, "MANUAL FOLLOW-UP: recreation failed ({})", reason)
            }
        }
    }
}

/// One processed database with its preserved configuration
#[derive(Clone, Debug)]
pub struct ProcessedDatabase {
    /// Database name
    pub database: String,
    /// Hosting server name
    pub server: String,
    /// SKU preserved across the lifecycle
    pub sku: Sku,
    /// Tags preserved across the lifecycle
    pub tags: BTreeMap<String, String>,
    /// Final outcome
    pub outcome: DatabaseOutcome,
    /// Data-quality warnings gathered along the way
    pub warnings: Vec<String>,
}

/// The audit report for one orchestration run
#[derive(Clone, Debug)]
pub struct RefreshReport {
    /// Environment whose replicas were refreshed
    pub destination_environment: String,
    /// Environment the wider refresh sourced its data from
    pub source_environment: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    entries: Vec<ProcessedDatabase>,
}

impl RefreshReport {
    /// Start an empty report for a run
    pub fn new(destination_environment: &str, source_environment: &str) -> Self {
        Self {
            destination_environment: destination_environment.to_string(),
            source_environment: source_environment.to_string(),
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    /// Record one processed database
    pub fn record(&mut self, entry: ProcessedDatabase) {
        self.entries.push(entry);
    }

    /// Every database processed in this run
    pub fn entries(&self) -> &[ProcessedDatabase] {
        &self.entries
    }

    /// Number of databases processed
    pub fn databases_processed(&self) -> usize {
        self.entries.len()
    }

    /// Whether any database needs operator attention
    pub fn requires_follow_up(&self) -> bool {
        self.entries.iter().any(|e| e.outcome.requires_follow_up())
    }

    /// Process exit code this run should finish with
    pub fn exit_code(&self) -> i32 {
        if self.requires_follow_up() {
            1
        } else {
            0
        }
    }

    /// Render the human-readable audit summary
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("\n=== Replica refresh summary ===\n");
        out.push_str(&format!(
            "Destination environment: {} (source: {})\n",
            self.destination_environment, self.source_environment
        ));
        out.push_str(&format!(
            "Started: {}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!("Databases processed: {}\n\n", self.entries.len()));

        if self.entries.is_empty() {
            out.push_str("No secondary databases matched.\n");
            return out;
        }

        let headers = ["DATABASE", "SERVER", "SKU", "TAGS", "OUTCOME"];
        let rows: Vec<[String; 5]> = self
            .entries
            .iter()
            .map(|e| {
                [
                    e.database.clone(),
                    e.server.clone(),
                    e.sku.to_string(),
                    format_tags(&e.tags),
                    e.outcome.to_string(),
                ]
            })
            .collect();

        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }

        let render_row = |cells: &[String]| -> String {
            cells
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
                .collect::<Vec<_>>()
                .join("  ")
        };

        let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        out.push_str(&render_row(&header_cells));
        out.push('\n');
        out.push_str(&"-".repeat(widths.iter().sum::<usize>() + 2 * (widths.len() - 1)));
        out.push('\n');
        for row in &rows {
            out.push_str(&render_row(row));
            out.push('\n');
        }

        let warnings: Vec<(&str, &str)> = self
            .entries
            .iter()
            .flat_map(|e| {
                e.warnings
                    .iter()
                    .map(move |w| (e.database.as_str(), w.as_str()))
            })
            .collect();
        if !warnings.is_empty() {
            out.push_str("\nWarnings:\n");
            for (database, warning) in warnings {
                out.push_str(&format!("  {}: {}\n", database, warning));
            }
        }

        let follow_ups = self
            .entries
            .iter()
            .filter(|e| e.outcome.requires_follow_up())
            .count();
        if follow_ups > 0 {
            out.push_str(&format!(
                "\n{} database(s) require manual follow-up.\n",
                follow_ups
            ));
        }

        out
    }
}

fn format_tags(tags: &BTreeMap<String, String>) -> String {
    if tags.is_empty() {
        return "-".to_string();
    }
    tags.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}
