use std::path::PathBuf;

use colored::Colorize;

use flux_sweeper::config;
use flux_sweeper::logging::redact;
use flux_sweeper::net;

pub fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let loaded = config::load(config_path.as_deref());
    let cfg = &loaded.config;

    println!("{}", "flux-sweeper check".bold());
    match &loaded.source {
        Some(path) => println!("  config:   {}", path.display()),
        None => println!("  config:   {}", "defaults".dimmed()),
    }
    for warning in &loaded.warnings {
        println!("  {}  {}", "warn:".yellow(), warning);
    }

    let targets = cfg.scan_targets();
    println!("  scan:     {} IP(s), {} static node(s)", targets.len(), cfg.nodes.len());
    println!("  interval: {}s", cfg.automation_interval().as_secs());
    println!("  log file: {}", cfg.log_path().display());

    let rt = tokio::runtime::Runtime::new()?;
    let online = rt.block_on(net::has_internet(cfg.request_timeout()));
    if online {
        println!("  internet: {}", "reachable".green());
    } else {
        println!("  internet: {}", "unreachable".red());
    }

    println!();
    println!("{}", "Effective settings".bold());
    let settings = redact::redact_serializable(cfg);
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
