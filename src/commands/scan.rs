//! `flux-sweeper scan` — one-shot discovery.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use colored::Colorize;

use flux_sweeper::client::FluxClient;
use flux_sweeper::config;
use flux_sweeper::domain::discovery;
use flux_sweeper::domain::node::Node;
use flux_sweeper::logging::Logger;

pub fn run(config_path: Option<PathBuf>, ips: Vec<String>, format: &str) -> Result<()> {
    let loaded = config::load(config_path.as_deref());
    let cfg = loaded.config;

    let targets = if ips.is_empty() {
        cfg.scan_targets()
    } else {
        let (valid, invalid) = config::parse_scan_ips(&ips);
        if !invalid.is_empty() {
            bail!("invalid IP address(es): {}", invalid.join(", "));
        }
        valid
    };

    if targets.is_empty() {
        println!("{} No scan IPs configured", "::".blue().bold());
        println!("   Set `scan_ips` in the config file or pass --ip.");
        return Ok(());
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    let logger = Arc::new(Logger::in_memory(cfg.max_log_history, cfg.debug));
    let client = Arc::new(FluxClient::new(cfg.request_timeout(), logger.clone())?);

    let rt = tokio::runtime::Runtime::new()?;
    let nodes = rt.block_on(discovery::discover_all(client, &targets, logger));

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&nodes)?),
        _ => print_table(&nodes, targets.len()),
    }
    Ok(())
}

fn print_table(nodes: &[Node], ip_count: usize) {
    println!("{}", "Discovered Nodes".bold());
    println!();

    if nodes.is_empty() {
        println!("  {} no nodes answered on {} IP(s)", "!!".red().bold(), ip_count);
        println!();
        return;
    }

    for node in nodes {
        println!(
            "  {} {}  api {}  ui {}",
            "ok".green().bold(),
            node.name.bold(),
            node.api_url,
            node.ui_url.dimmed()
        );
    }

    println!();
    println!("  {} node(s) on {} IP(s)", nodes.len(), ip_count);
}
