//! The native runtime host ABI.
//!
//! [`NativeRuntime`] mirrors, one-to-one, the entry points exported by a
//! native hosting library. Implementations translate between Rust values and
//! the C calling convention and report failures as raw [`StatusCode`]s; the
//! host layer is responsible for turning those into typed errors.

use std::sync::Arc;

use crate::handle::{HostHandle, ModuleHandle, RawHandle};
use crate::signature::SignatureTag;
use crate::status::NativeResult;

/// Everything the native resolver may need to locate one function.
#[derive(Debug, Clone, Copy)]
pub struct FunctionRequest<'a> {
    /// Assembly or module path the function lives in
    pub source_path: &'a str,
    /// Fully qualified type name
    pub type_name: &'a str,
    /// Method name
    pub method_name: &'a str,
    /// Expected call shape
    pub signature: &'a SignatureTag,
}

/// A native runtime host library.
///
/// All calls are synchronous and blocking. Implementations must be safe to
/// call from several threads; the host serializes calls that touch the same
/// native host handle.
pub trait NativeRuntime: Send + Sync {
    /// Allocate a new native host instance.
    fn create(&self) -> NativeResult<RawHandle>;

    /// Destroy a native host instance and everything it still owns.
    fn destroy(&self, host: HostHandle) -> NativeResult<()>;

    /// Start the managed runtime inside a host instance.
    ///
    /// `runtime_config` is the runtime configuration file to start from.
    /// Libraries that locate their configuration themselves ignore it.
    fn initialize(&self, host: HostHandle, runtime_config: Option<&str>) -> NativeResult<()>;

    /// Load a module from `path` into the host.
    fn load(&self, host: HostHandle, path: &str) -> NativeResult<RawHandle>;

    /// Unload a previously loaded module.
    fn unload(&self, host: HostHandle, module: ModuleHandle) -> NativeResult<()>;

    /// Resolve a function inside a loaded module to its native address.
    fn get_function_pointer(
        &self,
        host: HostHandle,
        module: ModuleHandle,
        request: &FunctionRequest<'_>,
    ) -> NativeResult<usize>;
}

macro_rules! forward_runtime {
    ($($wrapper:ident),*) => {
        $(impl<R: NativeRuntime + ?Sized> NativeRuntime for $wrapper<R> {
            fn create(&self) -> NativeResult<RawHandle> {
                (**self).create()
            }

            fn destroy(&self, host: HostHandle) -> NativeResult<()> {
                (**self).destroy(host)
            }

            fn initialize(
                &self,
                host: HostHandle,
                runtime_config: Option<&str>,
            ) -> NativeResult<()> {
                (**self).initialize(host, runtime_config)
            }

            fn load(&self, host: HostHandle, path: &str) -> NativeResult<RawHandle> {
                (**self).load(host, path)
            }

            fn unload(&self, host: HostHandle, module: ModuleHandle) -> NativeResult<()> {
                (**self).unload(host, module)
            }

            fn get_function_pointer(
                &self,
                host: HostHandle,
                module: ModuleHandle,
                request: &FunctionRequest<'_>,
            ) -> NativeResult<usize> {
                (**self).get_function_pointer(host, module, request)
            }
        })*
    };
}

forward_runtime!(Arc, Box);
