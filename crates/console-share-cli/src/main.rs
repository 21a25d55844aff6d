use anyhow::Result;
use clap::{Parser, Subcommand};

use console_share_cli::commands::{self, GenerateArgs, ListArgs, ShareArgs, ShellArgs};
use console_share_core::{config, tracing_init};

/// Share Incus instance consoles over TCP.
#[derive(Debug, Parser)]
#[command(name = "console-share", version, about)]
struct Cli {
    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long, global = true, default_value = "info", env = "CONSOLE_SHARE_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true, env = "CONSOLE_SHARE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Share a virtual machine's graphical console (SPICE)
    Vga(ShareArgs),
    /// Share an interactive shell inside the instance
    Shell(ShellArgs),
    /// Share the instance's text console
    Console(ShareArgs),
    /// List instances and how each can be shared
    List(ListArgs),
    /// Write every instance into the config file's instance table
    Generate(GenerateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_init::init_tracing(
        &tracing_init::default_filter("console_share_cli", &cli.log_level),
        cli.log_json,
    );

    let config = config::load_config()?;

    match cli.command {
        Commands::Vga(ref args) => commands::run_vga(args, &config).await?,
        Commands::Shell(args) => commands::run_shell(args, &config).await?,
        Commands::Console(ref args) => commands::run_console(args, &config).await?,
        Commands::List(ref args) => commands::run_list(args, &config).await?,
        Commands::Generate(ref args) => commands::run_generate(args, &config).await?,
    }

    Ok(())
}
