// Copyright 2026 Billburner Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use billburner_runtime::cli;
use billburner_runtime::cli::run::RunArgs;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "billburner",
    about = "Billburner: log in to utility portals and collect what you owe",
    version,
    after_help = "Credentials are read from the environment (or a .env file).\nRun 'billburner' with no command to fetch every bill."
)]
struct Cli {
    /// Run the browser without a window
    #[arg(long)]
    headless: bool,

    /// Reuse the existing browser profile instead of starting fresh
    #[arg(long)]
    keep_profile: bool,

    /// Browser profile directory (defaults to the user config dir)
    #[arg(long)]
    profile_dir: Option<PathBuf>,

    /// Abort the whole run after this many seconds
    #[arg(long, default_value = "120")]
    watchdog_secs: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log points instead of writing them to InfluxDB
    #[arg(long)]
    dry_run: bool,

    /// Only run providers with this name or output. Can be repeated.
    #[arg(long)]
    only: Vec<String>,

    /// Save a screenshot here when a browser workflow fails
    #[arg(long)]
    screenshot_dir: Option<PathBuf>,

    /// Print the final ledger as JSON instead of the live table
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    if cli.json {
        std::env::set_var("BILLBURNER_JSON", "1");
    }
    if cli.no_color {
        std::env::set_var("BILLBURNER_NO_COLOR", "1");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match &dotenv {
        Ok(path) => debug!("loaded {}", path.display()),
        Err(e) => debug!("no .env loaded: {e}"),
    }

    let result = match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "billburner", &mut std::io::stdout());
            Ok(0)
        }
        None => {
            cli::run::run(RunArgs {
                headless: cli.headless,
                keep_profile: cli.keep_profile,
                watchdog_secs: cli.watchdog_secs,
                dry_run: cli.dry_run,
                only: cli.only,
                screenshot_dir: cli.screenshot_dir,
                profile_dir: cli.profile_dir,
            })
            .await
        }
    };

    // Exit codes: 0 success, 1 error or interrupt, 2 watchdog.
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if cli::output::is_json() {
                cli::output::print_json(&serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                }));
            } else {
                eprintln!("  Error: {e:#}");
            }
            std::process::exit(1);
        }
    }
}
