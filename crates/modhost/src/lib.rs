//! modhost
//!
//! Loads managed code modules into a long-lived native runtime host,
//! resolves functions inside them to callable pointers, and unloads them
//! again.
//!
//! ```no_run
//! use modhost::{Host, ModhostConfig};
//!
//! # fn main() -> modhost::Result<()> {
//! let config = ModhostConfig::load("modhost.toml")?;
//! let host = Host::from_config(&config.host)?;
//! let module = host.load("Calculator.dll")?;
//! let add = module.resolve_typed::<extern "C" fn(i32, i32) -> i32>("Demo.Calculator", "Add")?;
//! let sum = unsafe { add.get() }(5, 3);
//! assert_eq!(sum, 8);
//! host.dispose()?;
//! # Ok(())
//! # }
//! ```

pub mod aot;
pub mod config;
pub mod dylib;
pub mod error;
pub mod function;
pub mod host;
pub mod logging;
pub mod module;
pub mod testing;

// Re-export main types for convenience
pub use aot::{AotEntryPoints, AotRuntime};
pub use config::{Flavor, HostConfig, LogFormat, LoggingConfig, ModhostConfig, ModuleSpec};
pub use dylib::{Binding, DylibRuntime, EntryPoints, ResolverAbi};
pub use error::{ErrorKind, HostError, Result, check, translate};
pub use function::{CacheKey, ResolvedFunction, TypedFunction};
pub use host::{Host, HostBuilder};
pub use module::Module;

pub use modhost_abi::{
    FnSignature, FunctionRequest, HostHandle, ModuleHandle, NativeRuntime, SignatureTag,
    StatusBand, StatusCode, ValueType,
};
