use anyhow::Result;
use clap::Args;
use serde::Serialize;

use console_share_core::Config;
use console_share_core::incus::{IncusClient, Instance};

/// Arguments for the `list` subcommand.
#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// One row of `console-share list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Subcommand to use for this instance, when it can be shared now.
    pub share: Option<&'static str>,
}

pub fn list_entries(instances: &[Instance]) -> Vec<ListEntry> {
    instances
        .iter()
        .map(|instance| ListEntry {
            name: instance.name.clone(),
            status: instance.status.clone(),
            kind: instance.kind.to_string(),
            share: instance.is_running().then_some(instance.preferred_mode()),
        })
        .collect()
}

fn render_table(entries: &[ListEntry]) -> String {
    let width = entries
        .iter()
        .map(|e| e.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let mut out = format!("{:<width$}  {:<8}  {:<15}  SHARE\n", "NAME", "STATUS", "TYPE");
    for entry in entries {
        out.push_str(&format!(
            "{:<width$}  {:<8}  {:<15}  {}\n",
            entry.name,
            entry.status,
            entry.kind,
            entry.share.unwrap_or("-"),
        ));
    }
    out
}

/// List instances and how each can be shared.
#[allow(clippy::print_stdout)]
pub async fn run_list(args: &ListArgs, config: &Config) -> Result<()> {
    let client = IncusClient::new(&config.incus.bin);
    let entries = list_entries(&client.list_instances().await?);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No instances found");
    } else {
        print!("{}", render_table(&entries));
    }
    Ok(())
}
