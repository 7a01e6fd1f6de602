use super::{config_path, finish};
use anyhow::Context;
use modhost::ModhostConfig;
use starbase::AppResult;
use std::path::PathBuf;

/// Run the check command
pub fn run_check(config: Option<PathBuf>, bind: bool) -> AppResult {
    finish(check(config, bind))
}

fn check(config: Option<PathBuf>, bind: bool) -> anyhow::Result<Option<u8>> {
    let path = config_path(config)?;
    let config = match ModhostConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", path.display(), e);
            return Ok(Some(1));
        }
    };

    println!("config:  {}", path.display());
    println!("library: {}", config.host.library.display());
    println!("flavor:  {:?}", config.host.flavor);
    if let Some(runtime_config) = &config.host.runtime_config {
        println!("runtime: {}", runtime_config.display());
    }
    println!("modules: {}", config.modules.len());
    for module in &config.modules {
        println!("  - {}", module.path);
    }

    if bind {
        config
            .host
            .binding()
            .open(&config.host.library)
            .context("Failed to bind native hosting library")?;
        println!("bound:   all entry points resolved");
    }

    Ok(None)
}
