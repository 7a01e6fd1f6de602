//! The module host
//!
//! A [`Host`] owns exactly one native runtime handle and the registry of
//! modules currently loaded into it. It is the only place that creates or
//! destroys the native handle, and every native call made on behalf of a
//! [`Module`] is forwarded through it.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use indexmap::IndexMap;
use modhost_abi::{
    FunctionRequest, HostHandle, ModuleHandle, NativeRuntime, StatusBand, StatusCode,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::error::{HostError, Result, from_status};
use crate::module::{Module, ModuleShared};

pub(crate) struct HostShared {
    name: String,
    /// Passed to the native initialize by [`Host::initialize`]
    runtime_config: Option<String>,
    runtime: Box<dyn NativeRuntime>,
    state: Mutex<HostState>,
}

struct HostState {
    /// Present until the host is destroyed
    handle: Option<HostHandle>,
    initialized: bool,
    /// Set by a fatal initialization failure; the host only accepts dispose
    faulted: bool,
    disposed: bool,
    /// Live modules in load order
    modules: IndexMap<ModuleHandle, Arc<ModuleShared>>,
}

impl HostState {
    fn live_handle(&self) -> Result<HostHandle> {
        if self.disposed {
            return Err(HostError::use_after_dispose("Host"));
        }
        self.handle.ok_or_else(|| HostError::use_after_dispose("Host"))
    }

    fn usable_handle(&self, name: &str) -> Result<HostHandle> {
        let handle = self.live_handle()?;
        if self.faulted {
            return Err(HostError::RuntimeInitFailure {
                context: format!("host '{}' failed to start and must be disposed", name),
            });
        }
        Ok(handle)
    }
}

/// Owner of one native runtime host instance and its loaded modules.
///
/// `Host` is a cheap handle; clones refer to the same native instance.
/// Dropping the last clone disposes the host if the caller has not, but
/// callers should dispose explicitly to observe failures.
#[derive(Clone)]
pub struct Host {
    shared: Arc<HostShared>,
}

/// Builder for [`Host`].
pub struct HostBuilder {
    runtime: Box<dyn NativeRuntime>,
    name: String,
    runtime_config: Option<String>,
    auto_initialize: bool,
}

impl HostBuilder {
    pub fn new(runtime: impl NativeRuntime + 'static) -> Self {
        Self {
            runtime: Box::new(runtime),
            name: "default".to_string(),
            runtime_config: None,
            auto_initialize: false,
        }
    }

    /// Name used in log output and error context.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Runtime configuration file handed to the native initialize.
    pub fn runtime_config(mut self, path: impl Into<String>) -> Self {
        self.runtime_config = Some(path.into());
        self
    }

    /// Initialize the runtime as part of [`build`](Self::build).
    pub fn auto_initialize(mut self, enabled: bool) -> Self {
        self.auto_initialize = enabled;
        self
    }

    /// Create the native host, and initialize it if requested.
    ///
    /// If initialization fails the native handle is destroyed again before
    /// the error is returned.
    pub fn build(self) -> Result<Host> {
        let handle = create_native(self.runtime.as_ref(), &self.name)?;
        info!("Host created: {} ({})", self.name, handle);

        let host = Host {
            shared: Arc::new(HostShared {
                name: self.name,
                runtime_config: self.runtime_config,
                runtime: self.runtime,
                state: Mutex::new(HostState {
                    handle: Some(handle),
                    initialized: false,
                    faulted: false,
                    disposed: false,
                    modules: IndexMap::new(),
                }),
            }),
        };

        if self.auto_initialize {
            if let Err(e) = host.initialize() {
                if let Err(dispose_err) = host.dispose() {
                    warn!("Failed to destroy host after init failure: {}", dispose_err);
                }
                return Err(e);
            }
        }

        Ok(host)
    }
}

fn create_native(runtime: &dyn NativeRuntime, name: &str) -> Result<HostHandle> {
    debug!("native create (host '{}')", name);
    let raw = runtime.create().map_err(|status| match status.band() {
        Some(StatusBand::Host) => HostError::HostCreationFailure {
            code: status.code(),
            context: name.to_string(),
        },
        _ => from_status(status, name),
    })?;

    HostHandle::from_raw(raw).ok_or_else(|| HostError::HostCreationFailure {
        code: StatusCode::SUCCESS.code(),
        context: format!("{}: native layer returned a null host handle", name),
    })
}

impl Host {
    /// Create a native host without starting the runtime.
    pub fn create(runtime: impl NativeRuntime + 'static) -> Result<Host> {
        HostBuilder::new(runtime).build()
    }

    pub fn builder(runtime: impl NativeRuntime + 'static) -> HostBuilder {
        HostBuilder::new(runtime)
    }

    /// Bind the native library named in `config` and create a host on it.
    pub fn from_config(config: &HostConfig) -> Result<Host> {
        let runtime = config.binding().open(&config.library)?;
        let mut builder = HostBuilder::new(runtime)
            .name(config.name.clone())
            .auto_initialize(config.auto_initialize);
        if let Some(path) = &config.runtime_config {
            builder = builder.runtime_config(path.to_string_lossy());
        }
        builder.build()
    }

    /// Start the managed runtime with the runtime configuration given to
    /// the builder, if any.
    ///
    /// A second call fails with [`HostError::AlreadyInitialized`] without
    /// reaching the native layer. A failed initialization is not retried:
    /// after a [`HostError::RuntimeInitFailure`] every later `initialize` or
    /// `load` fails locally until the host is disposed.
    pub fn initialize(&self) -> Result<()> {
        self.start(self.shared.runtime_config.as_deref())
    }

    /// Start the managed runtime from the runtime configuration file at
    /// `runtime_config`.
    pub fn initialize_with(&self, runtime_config: &str) -> Result<()> {
        if runtime_config.is_empty() {
            return Err(HostError::invalid_argument(
                "runtime configuration path cannot be empty",
            ));
        }
        self.start(Some(runtime_config))
    }

    fn start(&self, runtime_config: Option<&str>) -> Result<()> {
        let mut state = self.shared.state.lock();
        let handle = state.usable_handle(&self.shared.name)?;
        if state.initialized {
            return Err(HostError::AlreadyInitialized);
        }

        debug!("native initialize (host {}, config {:?})", handle, runtime_config);
        let result = self
            .shared
            .runtime
            .initialize(handle, runtime_config)
            .map_err(|status| from_status(status, &self.shared.name));
        if let Err(e) = result {
            if e.is_fatal() {
                state.faulted = true;
            }
            return Err(e);
        }

        state.initialized = true;
        info!("Runtime initialized: {}", self.shared.name);
        Ok(())
    }

    /// Load a module and register it with this host.
    pub fn load(&self, path: &str) -> Result<Module> {
        if path.is_empty() {
            return Err(HostError::invalid_argument("module path cannot be empty"));
        }

        let mut state = self.shared.state.lock();
        let host = state.usable_handle(&self.shared.name)?;

        debug!("native load '{}' (host {})", path, host);
        let raw = self
            .shared
            .runtime
            .load(host, path)
            .map_err(|status| load_error(status, path))?;

        let handle = ModuleHandle::from_raw(raw).ok_or_else(|| HostError::ModuleLoadFailure {
            code: StatusCode::SUCCESS.code(),
            context: format!("{}: native layer returned a null module handle", path),
        })?;

        if state.modules.contains_key(&handle) {
            return Err(HostError::DuplicateHandle { handle });
        }

        let module = Arc::new(ModuleShared::new(
            handle,
            path.to_string(),
            Arc::downgrade(&self.shared),
        ));
        state.modules.insert(handle, Arc::clone(&module));

        info!("Module loaded: {} ({})", path, handle);
        Ok(Module::from_shared(module))
    }

    /// Remove a module from the registry and unload it natively.
    ///
    /// The registry entry is removed whether or not the native unload
    /// succeeds; a native failure is still returned. If the host has already
    /// been disposed the cascade owned the unload and this is a no-op.
    pub(crate) fn unload(&self, handle: ModuleHandle) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.disposed {
            return Ok(());
        }
        let host = state.live_handle()?;

        if state.modules.shift_remove(&handle).is_none() {
            return Err(HostError::ModuleNotFound {
                context: handle.to_string(),
            });
        }

        debug!("native unload {} (host {})", handle, host);
        match self.shared.runtime.unload(host, handle) {
            Ok(()) => {
                info!("Module unloaded: {}", handle);
                Ok(())
            }
            Err(status) => {
                warn!("Native unload of {} failed with status {}", handle, status);
                Err(from_status(status, format!("unload {}", handle)))
            }
        }
    }

    /// Resolve a function on behalf of a registered module.
    pub(crate) fn get_function_pointer(
        &self,
        module: ModuleHandle,
        request: &FunctionRequest<'_>,
    ) -> Result<NonZeroUsize> {
        let state = self.shared.state.lock();
        let host = state.live_handle()?;
        if !state.modules.contains_key(&module) {
            return Err(HostError::ModuleNotFound {
                context: module.to_string(),
            });
        }

        let context = format!(
            "{}:{}.{}",
            request.source_path, request.type_name, request.method_name
        );
        debug!("native get_function_pointer {} (module {})", context, module);
        let address = self
            .shared
            .runtime
            .get_function_pointer(host, module, request)
            .map_err(|status| from_status(status, &context))?;

        NonZeroUsize::new(address).ok_or_else(|| HostError::MethodResolutionFailure {
            context: format!("{} resolved to a null function pointer", context),
        })
    }

    /// Dispose every registered module, then destroy the native handle.
    ///
    /// Modules are unloaded in load order. Disposal continues past
    /// individual failures; the first one is returned and the rest are
    /// logged. Only the first call does anything.
    pub fn dispose(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        dispose_state(self.shared.runtime.as_ref(), &self.shared.name, &mut state)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The native handle, until the host is disposed.
    pub fn handle(&self) -> Option<HostHandle> {
        self.shared.state.lock().handle
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().initialized
    }

    /// Whether a fatal initialization failure has put the host out of use.
    pub fn is_faulted(&self) -> bool {
        self.shared.state.lock().faulted
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().disposed
    }

    pub fn module_count(&self) -> usize {
        self.shared.state.lock().modules.len()
    }

    /// Handles of live modules, in load order.
    pub fn module_handles(&self) -> Vec<ModuleHandle> {
        self.shared.state.lock().modules.keys().copied().collect()
    }

    /// Look up a live module by handle.
    pub fn module(&self, handle: ModuleHandle) -> Option<Module> {
        self.shared
            .state
            .lock()
            .modules
            .get(&handle)
            .map(|shared| Module::from_shared(Arc::clone(shared)))
    }

    pub(crate) fn from_shared(shared: Arc<HostShared>) -> Self {
        Self { shared }
    }
}

fn load_error(status: StatusCode, path: &str) -> HostError {
    match status.band() {
        Some(StatusBand::Module) | Some(StatusBand::Resolution) => HostError::ModuleLoadFailure {
            code: status.code(),
            context: path.to_string(),
        },
        _ => from_status(status, path),
    }
}

fn dispose_state(runtime: &dyn NativeRuntime, name: &str, state: &mut HostState) -> Result<()> {
    if state.disposed {
        return Ok(());
    }
    state.disposed = true;

    let modules = std::mem::take(&mut state.modules);
    let mut first_error = None;
    let mut record = |error: HostError| {
        warn!("Host '{}' disposal: {}", name, error);
        if first_error.is_none() {
            first_error = Some(error);
        }
    };

    if let Some(host) = state.handle.take() {
        for (handle, module) in modules {
            module.mark_disposed();
            debug!("native unload {} (host {}, cascade)", handle, host);
            if let Err(status) = runtime.unload(host, handle) {
                record(from_status(status, format!("unload {}", handle)));
            }
        }

        debug!("native destroy {}", host);
        if let Err(status) = runtime.destroy(host) {
            record(from_status(status, format!("destroy {}", host)));
        }
    }
    state.initialized = false;
    info!("Host disposed: {}", name);

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

impl Drop for HostShared {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.disposed {
            return;
        }
        warn!("Host '{}' dropped without dispose; disposing now", self.name);
        if let Err(e) = dispose_state(self.runtime.as_ref(), &self.name, state) {
            warn!("Host '{}' disposal on drop failed: {}", self.name, e);
        }
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Host")
            .field("name", &self.shared.name)
            .field("handle", &state.handle)
            .field("initialized", &state.initialized)
            .field("faulted", &state.faulted)
            .field("disposed", &state.disposed)
            .field("modules", &state.modules.len())
            .finish()
    }
}
