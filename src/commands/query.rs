//! Client subcommands: query and edit a fleet daemon via its REST API.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::FleetClient;
use crate::config;
use crate::domain::groups::StatusSnapshot;
use crate::domain::node::StatusKind;
use crate::domain::reconcile::{Batch, ReconciliationOutcome};
use crate::domain::update::NodeUpdate;

#[derive(Subcommand)]
pub enum QueryCommands {
    /// Per-node class and per-group counts
    Status,
    /// Fleet index, or the nodes carrying a role
    Nodes {
        #[arg(long)]
        role: Option<String>,

        /// Only print handles (with --role)
        #[arg(long)]
        names_only: bool,
    },
    /// Every node keyed by handle
    List,
    /// Nodes not yet allocated
    Unallocated,
    /// Nodes grouped by hardware family
    Families,
    /// Full node document
    Show {
        name: String,

        /// Only this top-level key
        #[arg(long)]
        key: Option<String>,
    },
    /// Resolve a slash-separated attribute path
    Attribute {
        name: String,
        #[arg(default_value = "")]
        path: String,
    },
    /// Network → interface → address view
    Network { name: String },
    /// Apply a batch of alias/public name edits from a YAML or JSON file
    Bulk {
        file: String,

        /// Only check the batch for naming conflicts
        #[arg(long)]
        check: bool,
    },
    /// Edit one node from a YAML or JSON file
    Update { name: String, file: String },
    /// Move a node into a group ("automatic" to reset)
    Group { node: String, group: String },
    /// Request a lifecycle action
    Hit { node: String, action: String },
}

pub fn run(
    url: Option<&str>,
    config_path: Option<&str>,
    format: &str,
    command: &QueryCommands,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_async(url, config_path, format, command))
}

async fn run_async(
    url: Option<&str>,
    config_path: Option<&str>,
    format: &str,
    command: &QueryCommands,
) -> Result<()> {
    let client = match url {
        Some(url) => FleetClient::new(url)?,
        None => FleetClient::new(&config::load(config_path)?.client.url)?,
    };

    match command {
        QueryCommands::Status => {
            let data = client.status().await?;
            if format == "json" {
                print_output(format, &data)
            } else {
                print_status(&data);
                Ok(())
            }
        }
        QueryCommands::Nodes { role, names_only } => {
            let data = client.index(role.as_deref(), *names_only).await?;
            print_output(format, &data)
        }
        QueryCommands::List => {
            let data = client.list().await?;
            print_output(format, &data)
        }
        QueryCommands::Unallocated => {
            let data = client.unallocated().await?;
            print_output(format, &data)
        }
        QueryCommands::Families => {
            let data = client.families().await?;
            print_output(format, &data)
        }
        QueryCommands::Show { name, key } => {
            let data = client.show(name, key.as_deref()).await?;
            print_output(format, &data)
        }
        QueryCommands::Attribute { name, path } => {
            let data = client.attribute(name, path).await?;
            print_output(format, &data)
        }
        QueryCommands::Network { name } => {
            let data = client.network(name).await?;
            print_output(format, &data)
        }
        QueryCommands::Bulk { file, check } => {
            let batch: Batch = load_document(Path::new(file))?;
            if *check {
                let data = client.bulk_check(&batch).await?;
                return print_output(format, &data);
            }
            let data = client.bulk(&batch).await?;
            if format != "json" {
                print_summary(&data.summary);
            }
            print_output(format, &data)
        }
        QueryCommands::Update { name, file } => {
            let update: NodeUpdate = load_document(Path::new(file))?;
            let data = client.update(name, &update).await?;
            print_output(format, &data)
        }
        QueryCommands::Group { node, group } => {
            let data = client.change_group(node, group).await?;
            print_output(format, &data)
        }
        QueryCommands::Hit { node, action } => {
            let data = client.hit(node, action).await?;
            print_output(format, &data)
        }
    }
}

/// Batch and update files are YAML; plain JSON parses as YAML too.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn paint(kind: StatusKind, text: &str) -> colored::ColoredString {
    match kind {
        StatusKind::Ready => text.green(),
        StatusKind::Failed => text.red(),
        StatusKind::Pending | StatusKind::Building | StatusKind::CrowbarUpgrade => text.yellow(),
        StatusKind::Unready => text.blue(),
        StatusKind::Unknown => text.dimmed(),
    }
}

fn print_status(snapshot: &StatusSnapshot) {
    println!("{}", "Groups".bold());
    for (name, group) in &snapshot.groups {
        let counts: Vec<String> = StatusKind::ALL
            .iter()
            .filter(|kind| group.status.get(**kind) > 0)
            .map(|kind| {
                let label = format!("{} {}", group.status.get(*kind), kind.as_str());
                paint(*kind, &label).to_string()
            })
            .collect();
        println!("  {:<24} {:>4}  {}", name.bold(), group.status.total(), counts.join(", "));
    }

    println!("{}", "Nodes".bold());
    for (handle, entry) in &snapshot.nodes {
        println!("  {:<32} {}", handle, paint(entry.class, &entry.status));
    }
}

fn print_summary(outcome: &ReconciliationOutcome) {
    match outcome {
        ReconciliationOutcome::Failed { reason, nodes } => println!(
            "{} {:?}: {}",
            "!!".red().bold(),
            reason,
            nodes.join(", ")
        ),
        ReconciliationOutcome::Updated { nodes } => {
            println!("{} updated: {}", "ok".green().bold(), nodes.join(", "))
        }
        ReconciliationOutcome::NoChange => println!("{} no changes", "::".blue().bold()),
    }
}

fn print_output<T: serde::Serialize>(format: &str, data: &T) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(data)?),
        "yaml" => print!("{}", serde_yaml::to_string(data)?),
        _ => {
            let rows = table_rows(&serde_json::to_value(data)?);
            let width = rows.iter().map(|(path, _)| path.len()).max().unwrap_or(0);
            for (path, cell) in rows {
                if path.is_empty() {
                    println!("{cell}");
                } else {
                    println!("{}  {}", format!("{path:<width$}").bold(), cell);
                }
            }
        }
    }
    Ok(())
}

/// One `(path, cell)` row per leaf. Paths use the same slash form as
/// `fleet attribute`, with `[i]` for list items that are not plain values.
fn table_rows(value: &Value) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    collect_rows(value, String::new(), &mut rows);
    rows
}

fn collect_rows(value: &Value, path: String, rows: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}/{key}")
                };
                collect_rows(child, child_path, rows);
            }
        }
        Value::Array(items) if items.iter().any(|item| item.is_object() || item.is_array()) => {
            for (i, item) in items.iter().enumerate() {
                collect_rows(item, format!("{path}[{i}]"), rows);
            }
        }
        leaf => rows.push((path, cell(leaf))),
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        Value::Object(_) => "{}".to_string(),
        Value::Array(items) if items.is_empty() => "[]".to_string(),
        Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}
