pub mod call;
pub mod check;
pub mod explain;
pub mod resolve;

pub use call::*;
pub use check::*;
pub use explain::*;
pub use resolve::*;

use anyhow::Context;
use modhost::{ModhostConfig, logging};
use starbase::AppResult;
use std::path::PathBuf;

/// Find the configuration file: the explicit path, or `modhost.toml` in the
/// current directory or one of its parents.
pub fn config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let start_dir = std::env::current_dir().context("Failed to get current directory")?;
    ModhostConfig::discover(&start_dir)
        .ok_or_else(|| anyhow::anyhow!("No modhost.toml found; pass --config"))
}

/// Load configuration and install logging from its `[logging]` section.
pub fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<(PathBuf, ModhostConfig)> {
    let path = config_path(explicit)?;
    let config = ModhostConfig::load(&path)
        .with_context(|| format!("Failed to load configuration: {}", path.display()))?;
    logging::init(&config.logging).context("Failed to initialize logging")?;
    Ok((path, config))
}

/// The module to load: the one named on the command line, or the first
/// `[[modules]]` entry.
pub fn module_path(config: &ModhostConfig, explicit: Option<String>) -> anyhow::Result<String> {
    explicit
        .or_else(|| config.modules.first().map(|m| m.path.clone()))
        .ok_or_else(|| anyhow::anyhow!("No module given and none listed in configuration"))
}

/// Render a command failure as a diagnostic.
pub fn finish(result: anyhow::Result<Option<u8>>) -> AppResult {
    result.map_err(|e| miette::miette!("{:#}", e))
}
