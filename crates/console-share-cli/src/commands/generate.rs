use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use console_share_core::Config;
use console_share_core::config;
use console_share_core::incus::IncusClient;

/// Arguments for the `generate` subcommand.
#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    /// Write here instead of the global config file
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Add every instance to the `[instances]` table of the config file.
///
/// Entries already present are kept as written. Environment overrides are
/// only used to reach `incus` and never end up in the file.
#[allow(clippy::print_stdout)]
pub async fn run_generate(args: &GenerateArgs, config: &Config) -> Result<()> {
    let path = match &args.output {
        Some(path) => path.clone(),
        None => config::global_config_path().context("Could not determine config directory")?,
    };
    let mut file_config = if path.exists() {
        config::load_config_file(&path)?
    } else {
        Config::default()
    };

    let client = IncusClient::new(&config.incus.bin);
    let instances = client.list_instances().await?;
    let added = file_config.add_instances(&instances);
    config::save_config_file(&path, &file_config)?;
    info!(path = %path.display(), added, "Wrote instance table");

    for (name, entry) in &file_config.instances {
        let label = match entry.share.as_str() {
            "vga" => "VGA console",
            "shell" => "Shell",
            other => other,
        };
        let port = entry
            .port
            .map_or_else(|| "auto".to_string(), |port| port.to_string());
        println!("{name}: {label} (port {port})");
    }
    println!("Configuration written to {}", path.display());
    Ok(())
}
