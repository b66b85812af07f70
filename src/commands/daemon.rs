use std::path::PathBuf;

use anyhow::Result;

use flux_sweeper::config;

pub fn run(
    http_addr: Option<String>,
    log_level: Option<String>,
    debug: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut loaded = config::load(config_path.as_deref());

    // CLI flags override config values
    if let Some(addr) = http_addr {
        loaded.config.http_addr = addr;
    }
    if let Some(level) = log_level {
        loaded.config.log_level = level;
    }
    if debug {
        loaded.config.debug = true;
    }

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(flux_sweeper::server::run(loaded))
}
