//! Binding to a native hosting library loaded at runtime
//!
//! [`DylibRuntime`] opens a shared library with `libloading` and implements
//! [`NativeRuntime`] over its exported entry points. The symbol names and the
//! shape of the resolver call are described by [`EntryPoints`], so both
//! handle-based hosting library flavors share one binding. [`Binding`]
//! selects between it and the handle-less [`AotRuntime`].

use std::ffi::{CString, c_char, c_void};
use std::path::{Path, PathBuf};
use std::ptr;

use libloading::Library;
use modhost_abi::{
    FunctionRequest, HostHandle, ModuleHandle, NativeResult, NativeRuntime, RawHandle, StatusCode,
};
use tracing::debug;

use crate::aot::{AotEntryPoints, AotRuntime};
use crate::error::{HostError, Result};

type Status = i32;
type NativeHandle = *mut c_void;

type CreateFn = unsafe extern "C" fn(*mut NativeHandle) -> Status;
type HandleFn = unsafe extern "C" fn(NativeHandle) -> Status;
type LoadFn = unsafe extern "C" fn(NativeHandle, *const c_char, *mut NativeHandle) -> Status;
type UnloadFn = unsafe extern "C" fn(NativeHandle, NativeHandle) -> Status;
type GetDelegateFn = unsafe extern "C" fn(
    NativeHandle,
    NativeHandle,
    *const c_char,
    *const c_char,
    *mut *mut c_void,
) -> Status;
type GetFunctionPointerFn = unsafe extern "C" fn(
    NativeHandle,
    NativeHandle,
    *const c_char,
    *const c_char,
    *const c_char,
    *const c_char,
    *mut *mut c_void,
) -> Status;

/// Delegate type name passed when methods are exported as unmanaged-callable.
pub const UNMANAGED_CALLERS_ONLY: &str = "UnmanagedCallersOnly";

/// How the library's resolver entry point is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverAbi {
    /// `(host, module, type, method, out)`
    Delegate,
    /// `(host, module, assembly, type, method, delegate_type, out)`
    FunctionPointer { delegate_type: String },
}

/// Exported symbol names of a native hosting library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoints {
    pub create: String,
    pub destroy: String,
    /// `None` when the library starts its runtime inside `create`
    pub initialize: Option<String>,
    pub load: String,
    pub unload: String,
    pub resolve: String,
    pub resolver: ResolverAbi,
}

impl EntryPoints {
    /// The `native_host_*` library.
    pub fn native_host() -> Self {
        Self {
            create: "native_host_create".to_string(),
            destroy: "native_host_destroy".to_string(),
            initialize: Some("native_host_initialize".to_string()),
            load: "native_host_load_assembly".to_string(),
            unload: "native_host_unload_assembly".to_string(),
            resolve: "native_host_get_delegate".to_string(),
            resolver: ResolverAbi::Delegate,
        }
    }

    /// The `native_plugin_host_*` library, which loads runtime configurations
    /// and resolves functions from separately named assemblies.
    pub fn native_plugin_host() -> Self {
        Self {
            create: "native_plugin_host_create".to_string(),
            destroy: "native_plugin_host_destroy".to_string(),
            initialize: None,
            load: "native_plugin_host_load".to_string(),
            unload: "native_plugin_host_unload".to_string(),
            resolve: "native_plugin_host_get_function_pointer".to_string(),
            resolver: ResolverAbi::FunctionPointer {
                delegate_type: UNMANAGED_CALLERS_ONLY.to_string(),
            },
        }
    }
}

/// Which runtime to bind a hosting library with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Libraries that hand out host and module handles
    Handles(EntryPoints),
    /// Libraries with one process-wide runtime and no handles
    Aot(AotEntryPoints),
}

impl Binding {
    /// Open `library` and bind every entry point.
    pub fn open(self, library: &Path) -> Result<Box<dyn NativeRuntime>> {
        let runtime: Box<dyn NativeRuntime> = match self {
            Binding::Handles(entry_points) => Box::new(DylibRuntime::open(library, entry_points)?),
            Binding::Aot(entry_points) => Box::new(AotRuntime::open(library, entry_points)?),
        };
        Ok(runtime)
    }
}

enum Resolver {
    Delegate(GetDelegateFn),
    FunctionPointer {
        call: GetFunctionPointerFn,
        delegate_type: CString,
    },
}

/// A native hosting library opened with `libloading`.
pub struct DylibRuntime {
    path: PathBuf,
    create: CreateFn,
    destroy: HandleFn,
    initialize: Option<HandleFn>,
    load: LoadFn,
    unload: UnloadFn,
    resolver: Resolver,
    // Keeps every function pointer above valid; must outlive them.
    _library: Library,
}

impl DylibRuntime {
    /// Open the library at `path` and bind every entry point up front.
    pub fn open(path: impl AsRef<Path>, entry_points: EntryPoints) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let library = open_library(&path)?;

        let create: CreateFn = symbol(&library, &path, &entry_points.create)?;
        let destroy: HandleFn = symbol(&library, &path, &entry_points.destroy)?;
        let initialize = match &entry_points.initialize {
            Some(name) => Some(symbol::<HandleFn>(&library, &path, name)?),
            None => None,
        };
        let load: LoadFn = symbol(&library, &path, &entry_points.load)?;
        let unload: UnloadFn = symbol(&library, &path, &entry_points.unload)?;
        let resolver = match &entry_points.resolver {
            ResolverAbi::Delegate => {
                Resolver::Delegate(symbol(&library, &path, &entry_points.resolve)?)
            }
            ResolverAbi::FunctionPointer { delegate_type } => Resolver::FunctionPointer {
                call: symbol(&library, &path, &entry_points.resolve)?,
                delegate_type: CString::new(delegate_type.as_str()).map_err(|_| {
                    HostError::Config(format!("delegate type contains NUL: {:?}", delegate_type))
                })?,
            },
        };

        debug!("Bound native hosting library {}", path.display());
        Ok(Self {
            path,
            create,
            destroy,
            initialize,
            load,
            unload,
            resolver,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) fn open_library(path: &Path) -> Result<Library> {
    // SAFETY: loading a library runs its initializers; the configured
    // path is trusted.
    unsafe { Library::new(path) }.map_err(|e| HostError::NativeLibraryMissing {
        context: format!("{}: {}", path.display(), e),
    })
}

pub(crate) fn symbol<T: Copy>(library: &Library, path: &Path, name: &str) -> Result<T> {
    // SAFETY: `T` is one of the entry point types above; the exported
    // symbol is trusted to have that shape.
    let sym = unsafe { library.get::<T>(name.as_bytes()) }.map_err(|e| {
        HostError::NativeLibraryMissing {
            context: format!("symbol '{}' in {}: {}", name, path.display(), e),
        }
    })?;
    Ok(*sym)
}

pub(crate) fn c_string(s: &str) -> NativeResult<CString> {
    CString::new(s).map_err(|_| StatusCode::INVALID_ARG)
}

fn raw(handle: RawHandle) -> NativeHandle {
    handle as NativeHandle
}

impl NativeRuntime for DylibRuntime {
    fn create(&self) -> NativeResult<RawHandle> {
        let mut out: NativeHandle = ptr::null_mut();
        // SAFETY: `out` is a valid out-pointer for the duration of the call.
        let status = unsafe { (self.create)(&mut out) };
        StatusCode(status).into_result(out as RawHandle)
    }

    fn destroy(&self, host: HostHandle) -> NativeResult<()> {
        // SAFETY: `host` came from `create` and has not been destroyed.
        let status = unsafe { (self.destroy)(raw(host.as_raw())) };
        StatusCode(status).into_result(())
    }

    fn initialize(&self, host: HostHandle, _runtime_config: Option<&str>) -> NativeResult<()> {
        let Some(initialize) = self.initialize else {
            return Ok(());
        };
        // SAFETY: `host` is a live handle from `create`.
        let status = unsafe { initialize(raw(host.as_raw())) };
        StatusCode(status).into_result(())
    }

    fn load(&self, host: HostHandle, path: &str) -> NativeResult<RawHandle> {
        let path = c_string(path)?;
        let mut out: NativeHandle = ptr::null_mut();
        // SAFETY: `path` is NUL-terminated and outlives the call.
        let status = unsafe { (self.load)(raw(host.as_raw()), path.as_ptr(), &mut out) };
        StatusCode(status).into_result(out as RawHandle)
    }

    fn unload(&self, host: HostHandle, module: ModuleHandle) -> NativeResult<()> {
        // SAFETY: both handles are live and belong together.
        let status = unsafe { (self.unload)(raw(host.as_raw()), raw(module.as_raw())) };
        StatusCode(status).into_result(())
    }

    fn get_function_pointer(
        &self,
        host: HostHandle,
        module: ModuleHandle,
        request: &FunctionRequest<'_>,
    ) -> NativeResult<usize> {
        let type_name = c_string(request.type_name)?;
        let method_name = c_string(request.method_name)?;
        let mut out: *mut c_void = ptr::null_mut();

        let status = match &self.resolver {
            // SAFETY: string arguments are NUL-terminated and outlive the
            // call; `out` is a valid out-pointer.
            Resolver::Delegate(call) => unsafe {
                call(
                    raw(host.as_raw()),
                    raw(module.as_raw()),
                    type_name.as_ptr(),
                    method_name.as_ptr(),
                    &mut out,
                )
            },
            Resolver::FunctionPointer {
                call,
                delegate_type,
            } => {
                let assembly = c_string(request.source_path)?;
                // SAFETY: as above.
                unsafe {
                    call(
                        raw(host.as_raw()),
                        raw(module.as_raw()),
                        assembly.as_ptr(),
                        type_name.as_ptr(),
                        method_name.as_ptr(),
                        delegate_type.as_ptr(),
                        &mut out,
                    )
                }
            }
        };
        StatusCode(status).into_result(out as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_presets() {
        let host = EntryPoints::native_host();
        assert_eq!(host.initialize.as_deref(), Some("native_host_initialize"));
        assert_eq!(host.resolver, ResolverAbi::Delegate);

        let plugin = EntryPoints::native_plugin_host();
        assert!(plugin.initialize.is_none());
        assert!(matches!(plugin.resolver, ResolverAbi::FunctionPointer { .. }));
    }

    #[test]
    fn test_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("libdoes_not_exist.so");
        let err = DylibRuntime::open(&missing, EntryPoints::native_host())
            .err()
            .unwrap();
        assert!(matches!(err, HostError::NativeLibraryMissing { .. }));
        assert!(err.to_string().contains("libdoes_not_exist"));
    }

    #[test]
    fn test_interior_nul_is_invalid_arg() {
        assert_eq!(c_string("a\0b").unwrap_err(), StatusCode::INVALID_ARG);
        assert!(c_string("Calculator.dll").is_ok());
    }

    #[test]
    fn test_binding_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("libdoes_not_exist.so");
        let err = Binding::Handles(EntryPoints::native_plugin_host())
            .open(&missing)
            .err()
            .unwrap();
        assert!(matches!(err, HostError::NativeLibraryMissing { .. }));
    }

    #[cfg(target_os = "linux")]
    mod present_library {
        use super::*;
        use modhost_abi::SignatureTag;

        const LIBC: &str = "libc.so.6";

        // Real libc exports standing in for the entry points. None of them
        // is ever called by these tests.
        fn stand_in(resolver: ResolverAbi) -> EntryPoints {
            EntryPoints {
                create: "malloc".to_string(),
                destroy: "free".to_string(),
                initialize: None,
                load: "strlen".to_string(),
                unload: "strcmp".to_string(),
                resolve: "strncmp".to_string(),
                resolver,
            }
        }

        fn handles() -> (HostHandle, ModuleHandle) {
            (
                HostHandle::from_raw(0x10).unwrap(),
                ModuleHandle::from_raw(0x20).unwrap(),
            )
        }

        #[test]
        fn test_missing_symbol_is_native_library_missing() {
            let err = DylibRuntime::open(LIBC, EntryPoints::native_host())
                .err()
                .unwrap();
            assert!(matches!(err, HostError::NativeLibraryMissing { .. }));
            assert!(err.to_string().contains("native_host_create"));
        }

        #[test]
        fn test_binds_present_symbols() {
            let runtime = DylibRuntime::open(LIBC, stand_in(ResolverAbi::Delegate)).unwrap();
            assert_eq!(runtime.path(), Path::new(LIBC));

            let (host, _) = handles();
            assert_eq!(runtime.initialize(host, Some("app.json")), Ok(()));
        }

        #[test]
        fn test_load_with_nul_never_calls_native() {
            let runtime = DylibRuntime::open(LIBC, stand_in(ResolverAbi::Delegate)).unwrap();
            let (host, _) = handles();
            assert_eq!(
                runtime.load(host, "Calc\0ulator.dll"),
                Err(StatusCode::INVALID_ARG)
            );
        }

        #[test]
        fn test_resolve_with_nul_never_calls_native() {
            let signature = SignatureTag::unit();
            let (host, module) = handles();

            let runtime = DylibRuntime::open(LIBC, stand_in(ResolverAbi::Delegate)).unwrap();
            let request = FunctionRequest {
                source_path: "Calc.dll",
                type_name: "Demo\0Calc",
                method_name: "Add",
                signature: &signature,
            };
            assert_eq!(
                runtime.get_function_pointer(host, module, &request),
                Err(StatusCode::INVALID_ARG)
            );

            let runtime = DylibRuntime::open(
                LIBC,
                stand_in(ResolverAbi::FunctionPointer {
                    delegate_type: UNMANAGED_CALLERS_ONLY.to_string(),
                }),
            )
            .unwrap();
            let request = FunctionRequest {
                source_path: "Calc\0.dll",
                type_name: "Demo.Calc",
                method_name: "Add",
                signature: &signature,
            };
            assert_eq!(
                runtime.get_function_pointer(host, module, &request),
                Err(StatusCode::INVALID_ARG)
            );
        }

        #[test]
        fn test_delegate_type_with_nul_is_config_error() {
            let err = DylibRuntime::open(
                LIBC,
                stand_in(ResolverAbi::FunctionPointer {
                    delegate_type: "Bad\0Delegate".to_string(),
                }),
            )
            .err()
            .unwrap();
            assert!(matches!(err, HostError::Config(_)));
        }
    }
}
