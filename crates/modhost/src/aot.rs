//! Binding to a handle-less AOT plugin hosting library
//!
//! These libraries keep a single runtime per process and export three
//! functions: start the runtime from a runtime configuration file, resolve
//! a method from an assembly path, and close the runtime. [`AotRuntime`]
//! synthesizes the host and module handles the rest of the crate expects
//! and keeps them consistent with the library's one global runtime.

use std::collections::HashSet;
use std::ffi::{CString, c_char, c_void};
use std::path::{Path, PathBuf};

use libloading::Library;
use modhost_abi::{
    FunctionRequest, HostHandle, ModuleHandle, NativeResult, NativeRuntime, RawHandle, StatusCode,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::dylib::{UNMANAGED_CALLERS_ONLY, c_string, open_library, symbol};
use crate::error::{HostError, Result};

type InitializeRuntimeFn = unsafe extern "C" fn(*const c_char) -> bool;
type LoadAndGetFunctionPointerFn = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    *const c_char,
    *const c_char,
) -> *mut c_void;
type CloseRuntimeFn = unsafe extern "C" fn();

/// Exported symbol names of an AOT plugin hosting library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AotEntryPoints {
    pub initialize: String,
    pub resolve: String,
    pub close: String,
    /// Delegate type name passed with every resolution
    pub delegate_type: String,
}

impl AotEntryPoints {
    /// The `native_aot_plugin_host` library.
    pub fn native_aot_plugin_host() -> Self {
        Self {
            initialize: "initialize_runtime".to_string(),
            resolve: "load_assembly_and_get_function_pointer".to_string(),
            close: "close_runtime".to_string(),
            delegate_type: UNMANAGED_CALLERS_ONLY.to_string(),
        }
    }
}

#[derive(Default)]
struct AotState {
    host: Option<RawHandle>,
    initialized: bool,
    modules: HashSet<RawHandle>,
    last_handle: RawHandle,
}

impl AotState {
    fn allocate(&mut self) -> RawHandle {
        self.last_handle += 1;
        self.last_handle
    }

    fn check_host(&self, host: HostHandle) -> NativeResult<()> {
        match self.host {
            Some(raw) if raw == host.as_raw() => Ok(()),
            _ => Err(StatusCode::HOST_NOT_FOUND),
        }
    }
}

/// An AOT plugin hosting library opened with `libloading`.
///
/// Only one host may exist at a time. Loading a module records its
/// assembly path without a native call; the assembly is loaded on the
/// first resolution from it.
pub struct AotRuntime {
    path: PathBuf,
    initialize_runtime: InitializeRuntimeFn,
    resolve: LoadAndGetFunctionPointerFn,
    close: CloseRuntimeFn,
    delegate_type: CString,
    state: Mutex<AotState>,
    // Keeps every function pointer above valid; must outlive them.
    _library: Library,
}

impl AotRuntime {
    /// Open the library at `path` and bind every entry point up front.
    pub fn open(path: impl AsRef<Path>, entry_points: AotEntryPoints) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let library = open_library(&path)?;

        let initialize_runtime = symbol(&library, &path, &entry_points.initialize)?;
        let resolve = symbol(&library, &path, &entry_points.resolve)?;
        let close = symbol(&library, &path, &entry_points.close)?;
        let delegate_type = CString::new(entry_points.delegate_type.as_str()).map_err(|_| {
            HostError::Config(format!(
                "delegate type contains NUL: {:?}",
                entry_points.delegate_type
            ))
        })?;

        debug!("Bound AOT plugin hosting library {}", path.display());
        Ok(Self {
            path,
            initialize_runtime,
            resolve,
            close,
            delegate_type,
            state: Mutex::new(AotState::default()),
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NativeRuntime for AotRuntime {
    fn create(&self) -> NativeResult<RawHandle> {
        let mut state = self.state.lock();
        if state.host.is_some() {
            return Err(StatusCode::HOST_ALREADY_EXISTS);
        }
        let handle = state.allocate();
        state.host = Some(handle);
        Ok(handle)
    }

    fn destroy(&self, host: HostHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.check_host(host)?;
        if state.initialized {
            // SAFETY: the runtime was started by `initialize_runtime`.
            unsafe { (self.close)() };
        }
        state.host = None;
        state.initialized = false;
        state.modules.clear();
        Ok(())
    }

    fn initialize(&self, host: HostHandle, runtime_config: Option<&str>) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.check_host(host)?;
        let runtime_config = c_string(runtime_config.ok_or(StatusCode::INVALID_ARG)?)?;

        // SAFETY: `runtime_config` is NUL-terminated and outlives the call.
        if !unsafe { (self.initialize_runtime)(runtime_config.as_ptr()) } {
            return Err(StatusCode::RUNTIME_INIT);
        }
        state.initialized = true;
        Ok(())
    }

    fn load(&self, host: HostHandle, _path: &str) -> NativeResult<RawHandle> {
        let mut state = self.state.lock();
        state.check_host(host)?;
        let handle = state.allocate();
        state.modules.insert(handle);
        Ok(handle)
    }

    fn unload(&self, host: HostHandle, module: ModuleHandle) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.check_host(host)?;
        if !state.modules.remove(&module.as_raw()) {
            return Err(StatusCode::MODULE_NOT_FOUND);
        }
        Ok(())
    }

    fn get_function_pointer(
        &self,
        host: HostHandle,
        module: ModuleHandle,
        request: &FunctionRequest<'_>,
    ) -> NativeResult<usize> {
        let state = self.state.lock();
        state.check_host(host)?;
        if !state.modules.contains(&module.as_raw()) {
            return Err(StatusCode::MODULE_NOT_FOUND);
        }
        if !state.initialized {
            return Err(StatusCode::MODULE_NOT_INITIALIZED);
        }

        let assembly = c_string(request.source_path)?;
        let type_name = c_string(request.type_name)?;
        let method_name = c_string(request.method_name)?;
        // SAFETY: string arguments are NUL-terminated and outlive the call.
        let address = unsafe {
            (self.resolve)(
                assembly.as_ptr(),
                type_name.as_ptr(),
                method_name.as_ptr(),
                self.delegate_type.as_ptr(),
            )
        };
        if address.is_null() {
            return Err(StatusCode::METHOD_LOAD);
        }
        Ok(address as usize)
    }
}
