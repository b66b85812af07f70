mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "flux-sweeper",
    version,
    about = "Discovers Flux nodes and removes stuck workloads unattended"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the automation daemon (engine + REST API)
    Daemon {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,

        /// Enable debug journal entries
        #[arg(long)]
        debug: bool,

        /// Path to config file (default: ~/.config/flux-sweeper/config.yaml)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Scan for nodes once and print what answers
    Scan {
        /// IP to scan (repeatable; overrides config)
        #[arg(long = "ip")]
        ips: Vec<String>,

        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,

        /// Path to config file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the effective configuration and connectivity
    Check {
        /// Path to config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            http_addr,
            log_level,
            debug,
            config,
        } => commands::daemon::run(http_addr, log_level, debug, config),
        Commands::Scan {
            ips,
            format,
            config,
        } => commands::scan::run(config, ips, &format),
        Commands::Check { config } => commands::check::run(config),
    }
}
