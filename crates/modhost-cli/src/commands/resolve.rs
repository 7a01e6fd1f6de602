use super::{finish, load_config, module_path};
use anyhow::Context;
use modhost::{Host, ResolvedFunction, SignatureTag};
use starbase::AppResult;
use std::path::PathBuf;

/// Run the resolve command
pub fn run_resolve(
    config: Option<PathBuf>,
    module: Option<String>,
    assembly: Option<String>,
    type_name: String,
    method: String,
    signature: String,
) -> AppResult {
    finish(resolve(config, module, assembly, &type_name, &method, &signature))
}

fn resolve(
    config: Option<PathBuf>,
    module: Option<String>,
    assembly: Option<String>,
    type_name: &str,
    method: &str,
    signature: &str,
) -> anyhow::Result<Option<u8>> {
    let signature: SignatureTag = signature
        .parse()
        .with_context(|| format!("Invalid signature: {}", signature))?;
    let (_, config) = load_config(config)?;
    let module_path = module_path(&config, module)?;
    let host = Host::from_config(&config.host).context("Failed to create host")?;

    let result = resolve_in_host(
        &host,
        &module_path,
        assembly.as_deref(),
        type_name,
        method,
        signature,
    );
    let disposed = host.dispose();
    let resolved = result?;
    disposed.context("Failed to dispose host")?;

    println!("key:     {}", resolved.key());
    println!("address: {:#x}", resolved.address().get());
    Ok(None)
}

fn resolve_in_host(
    host: &Host,
    module_path: &str,
    assembly: Option<&str>,
    type_name: &str,
    method: &str,
    signature: SignatureTag,
) -> anyhow::Result<ResolvedFunction> {
    let module = host
        .load(module_path)
        .with_context(|| format!("Failed to load {}", module_path))?;
    let resolved = match assembly {
        Some(assembly) => module.resolve_in(assembly, type_name, method, signature)?,
        None => module.resolve(type_name, method, signature)?,
    };
    module.dispose()?;
    Ok(resolved)
}
