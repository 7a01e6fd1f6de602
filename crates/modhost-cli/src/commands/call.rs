//! Call command: load a module, call one integer function, unload

use super::{finish, load_config, module_path};
use anyhow::Context;
use modhost::{Host, Module};
use starbase::AppResult;
use std::path::PathBuf;
use tracing::info;

/// Run the call command
pub fn run_call(
    config: Option<PathBuf>,
    module: Option<String>,
    type_name: String,
    method: String,
    args: Vec<i32>,
) -> AppResult {
    finish(call(config, module, &type_name, &method, &args))
}

fn call(
    config: Option<PathBuf>,
    module: Option<String>,
    type_name: &str,
    method: &str,
    args: &[i32],
) -> anyhow::Result<Option<u8>> {
    let (_, config) = load_config(config)?;
    let module_path = module_path(&config, module)?;
    let host = Host::from_config(&config.host).context("Failed to create host")?;

    let result = call_in(&host, &module_path, type_name, method, args);
    let disposed = host.dispose();
    let value = result?;
    disposed.context("Failed to dispose host")?;

    println!("{}", value);
    Ok(None)
}

fn call_in(
    host: &Host,
    module_path: &str,
    type_name: &str,
    method: &str,
    args: &[i32],
) -> anyhow::Result<i32> {
    let module = host
        .load(module_path)
        .with_context(|| format!("Failed to load {}", module_path))?;
    info!("Calling {}.{} with {:?}", type_name, method, args);
    let value = invoke(&module, type_name, method, args)?;
    module.dispose()?;
    Ok(value)
}

// SAFETY for every `get` below: the signature tag matches the pointer type
// by construction, and the module stays loaded until after the call.
fn invoke(module: &Module, type_name: &str, method: &str, args: &[i32]) -> anyhow::Result<i32> {
    let value = match *args {
        [] => {
            let f = module.resolve_typed::<extern "C" fn() -> i32>(type_name, method)?;
            (unsafe { f.get() })()
        }
        [a] => {
            let f = module.resolve_typed::<extern "C" fn(i32) -> i32>(type_name, method)?;
            (unsafe { f.get() })(a)
        }
        [a, b] => {
            let f = module.resolve_typed::<extern "C" fn(i32, i32) -> i32>(type_name, method)?;
            (unsafe { f.get() })(a, b)
        }
        [a, b, c] => {
            let f =
                module.resolve_typed::<extern "C" fn(i32, i32, i32) -> i32>(type_name, method)?;
            (unsafe { f.get() })(a, b, c)
        }
        [a, b, c, d] => {
            let f = module
                .resolve_typed::<extern "C" fn(i32, i32, i32, i32) -> i32>(type_name, method)?;
            (unsafe { f.get() })(a, b, c, d)
        }
        _ => anyhow::bail!(
            "at most four integer arguments are supported, got {}",
            args.len()
        ),
    };
    Ok(value)
}
