//! In-process substitute for a native hosting library
//!
//! [`FakeRuntime`] implements [`NativeRuntime`] without loading anything.
//! It hands out handles, resolves functions from a table the test fills in,
//! counts every entry point call, and can be told to fail any entry point
//! with a chosen status.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use indexmap::IndexMap;
use modhost_abi::{
    FunctionRequest, HostHandle, ModuleHandle, NativeResult, NativeRuntime, RawHandle, StatusCode,
};
use parking_lot::{Mutex, RwLock};

/// Number of calls made to each entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: usize,
    pub destroy: usize,
    pub initialize: usize,
    pub load: usize,
    pub unload: usize,
    pub get_function_pointer: usize,
}

#[derive(Default)]
struct Counters {
    create: AtomicUsize,
    destroy: AtomicUsize,
    initialize: AtomicUsize,
    load: AtomicUsize,
    unload: AtomicUsize,
    get_function_pointer: AtomicUsize,
}

#[derive(Debug, Default, Clone)]
struct Failures {
    create: Option<StatusCode>,
    destroy: Option<StatusCode>,
    initialize: Option<StatusCode>,
    load: Option<StatusCode>,
    unload: Option<StatusCode>,
    get_function_pointer: Option<StatusCode>,
    /// Report success but hand back null handles
    null_handles: bool,
}

#[derive(Default)]
struct NativeState {
    hosts: HashSet<RawHandle>,
    /// Live modules and the paths they were loaded from
    modules: IndexMap<RawHandle, String>,
    unloaded: Vec<ModuleHandle>,
    loaded_paths: Vec<String>,
    runtime_configs: Vec<Option<String>>,
}

/// A scripted native runtime for tests.
#[derive(Default)]
pub struct FakeRuntime {
    counters: Counters,
    functions: RwLock<HashMap<(String, String), usize>>,
    failures: Mutex<Failures>,
    state: Mutex<NativeState>,
    next_handle: AtomicUsize,
    /// Every load returns this handle instead of a fresh one
    fixed_module_handle: Mutex<Option<RawHandle>>,
    resolve_delay: Mutex<Option<Duration>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `type_name.method_name` resolve to `address`.
    pub fn register_function(&self, type_name: &str, method_name: &str, address: usize) {
        self.functions
            .write()
            .insert((type_name.to_string(), method_name.to_string()), address);
    }

    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            create: c.create.load(Ordering::SeqCst),
            destroy: c.destroy.load(Ordering::SeqCst),
            initialize: c.initialize.load(Ordering::SeqCst),
            load: c.load.load(Ordering::SeqCst),
            unload: c.unload.load(Ordering::SeqCst),
            get_function_pointer: c.get_function_pointer.load(Ordering::SeqCst),
        }
    }

    pub fn fail_create(&self, status: StatusCode) {
        self.failures.lock().create = Some(status);
    }

    pub fn fail_destroy(&self, status: StatusCode) {
        self.failures.lock().destroy = Some(status);
    }

    pub fn fail_initialize(&self, status: StatusCode) {
        self.failures.lock().initialize = Some(status);
    }

    pub fn fail_load(&self, status: StatusCode) {
        self.failures.lock().load = Some(status);
    }

    pub fn fail_unload(&self, status: StatusCode) {
        self.failures.lock().unload = Some(status);
    }

    pub fn fail_get_function_pointer(&self, status: StatusCode) {
        self.failures.lock().get_function_pointer = Some(status);
    }

    /// Successful `create` and `load` calls return a null handle.
    pub fn return_null_handles(&self) {
        self.failures.lock().null_handles = true;
    }

    pub fn clear_failures(&self) {
        *self.failures.lock() = Failures::default();
    }

    /// Every later `load` returns `raw` as the module handle.
    pub fn fix_module_handle(&self, raw: RawHandle) {
        *self.fixed_module_handle.lock() = Some(raw);
    }

    /// Sleep inside `get_function_pointer`, to widen race windows.
    pub fn delay_resolution(&self, delay: Duration) {
        *self.resolve_delay.lock() = Some(delay);
    }

    /// Modules unloaded so far, in call order.
    pub fn unloaded(&self) -> Vec<ModuleHandle> {
        self.state.lock().unloaded.clone()
    }

    /// Paths passed to `load`, in call order.
    pub fn loaded_paths(&self) -> Vec<String> {
        self.state.lock().loaded_paths.clone()
    }

    /// Runtime configuration paths passed to `initialize`, in call order.
    pub fn runtime_configs(&self) -> Vec<Option<String>> {
        self.state.lock().runtime_configs.clone()
    }

    /// Number of modules the native side still considers loaded.
    pub fn live_modules(&self) -> usize {
        self.state.lock().modules.len()
    }

    pub fn live_hosts(&self) -> usize {
        self.state.lock().hosts.len()
    }

    fn allocate(&self) -> RawHandle {
        0x1000 + self.next_handle.fetch_add(1, Ordering::SeqCst) * 0x10
    }

    fn failure(&self, pick: impl FnOnce(&Failures) -> Option<StatusCode>) -> NativeResult<()> {
        match pick(&*self.failures.lock()) {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    fn null_handles(&self) -> bool {
        self.failures.lock().null_handles
    }
}

impl NativeRuntime for FakeRuntime {
    fn create(&self) -> NativeResult<RawHandle> {
        self.counters.create.fetch_add(1, Ordering::SeqCst);
        self.failure(|f| f.create)?;
        if self.null_handles() {
            return Ok(0);
        }

        let handle = self.allocate();
        self.state.lock().hosts.insert(handle);
        Ok(handle)
    }

    fn destroy(&self, host: HostHandle) -> NativeResult<()> {
        self.counters.destroy.fetch_add(1, Ordering::SeqCst);
        self.failure(|f| f.destroy)?;

        let mut state = self.state.lock();
        if !state.hosts.remove(&host.as_raw()) {
            return Err(StatusCode::HOST_NOT_FOUND);
        }
        state.modules.clear();
        Ok(())
    }

    fn initialize(&self, host: HostHandle, runtime_config: Option<&str>) -> NativeResult<()> {
        self.counters.initialize.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.runtime_configs.push(runtime_config.map(str::to_string));
        self.failure(|f| f.initialize)?;

        if !state.hosts.contains(&host.as_raw()) {
            return Err(StatusCode::HOST_NOT_FOUND);
        }
        Ok(())
    }

    fn load(&self, host: HostHandle, path: &str) -> NativeResult<RawHandle> {
        self.counters.load.fetch_add(1, Ordering::SeqCst);
        self.failure(|f| f.load)?;
        if self.null_handles() {
            return Ok(0);
        }

        let handle = match *self.fixed_module_handle.lock() {
            Some(raw) => raw,
            None => self.allocate(),
        };
        let mut state = self.state.lock();
        if !state.hosts.contains(&host.as_raw()) {
            return Err(StatusCode::HOST_NOT_FOUND);
        }
        state.modules.insert(handle, path.to_string());
        state.loaded_paths.push(path.to_string());
        Ok(handle)
    }

    fn unload(&self, host: HostHandle, module: ModuleHandle) -> NativeResult<()> {
        self.counters.unload.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.unloaded.push(module);
        self.failure(|f| f.unload)?;

        if !state.hosts.contains(&host.as_raw()) {
            return Err(StatusCode::HOST_NOT_FOUND);
        }
        if state.modules.shift_remove(&module.as_raw()).is_none() {
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
        self.counters
            .get_function_pointer
            .fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = *self.resolve_delay.lock() {
            thread::sleep(delay);
        }
        self.failure(|f| f.get_function_pointer)?;

        {
            let state = self.state.lock();
            if !state.hosts.contains(&host.as_raw()) {
                return Err(StatusCode::HOST_NOT_FOUND);
            }
            if !state.modules.contains_key(&module.as_raw()) {
                return Err(StatusCode::MODULE_NOT_FOUND);
            }
        }

        let functions = self.functions.read();
        let key = (request.type_name.to_string(), request.method_name.to_string());
        match functions.get(&key) {
            Some(&address) => Ok(address),
            None if functions.keys().any(|(t, _)| t == request.type_name) => {
                Err(StatusCode::METHOD_LOAD)
            }
            None => Err(StatusCode::TYPE_LOAD),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modhost_abi::SignatureTag;

    #[test]
    fn test_handles_are_distinct_and_nonzero() {
        let runtime = FakeRuntime::new();
        let a = runtime.create().unwrap();
        let b = runtime.create().unwrap();
        assert_ne!(a, 0);
        assert_ne!(a, b);
        assert_eq!(runtime.live_hosts(), 2);
    }

    #[test]
    fn test_resolution_statuses() {
        let runtime = FakeRuntime::new();
        runtime.register_function("Calc", "Add", 0xbeef);
        let host = HostHandle::from_raw(runtime.create().unwrap()).unwrap();
        let module = ModuleHandle::from_raw(runtime.load(host, "Calc.dll").unwrap()).unwrap();
        let signature = SignatureTag::unit();
        let request = |type_name, method_name| FunctionRequest {
            source_path: "Calc.dll",
            type_name,
            method_name,
            signature: &signature,
        };

        assert_eq!(
            runtime.get_function_pointer(host, module, &request("Calc", "Add")),
            Ok(0xbeef)
        );
        assert_eq!(
            runtime.get_function_pointer(host, module, &request("Calc", "Mul")),
            Err(StatusCode::METHOD_LOAD)
        );
        assert_eq!(
            runtime.get_function_pointer(host, module, &request("Missing", "Add")),
            Err(StatusCode::TYPE_LOAD)
        );
    }

    #[test]
    fn test_injected_failure_still_counts() {
        let runtime = FakeRuntime::new();
        runtime.fail_create(StatusCode::HOST_ALREADY_EXISTS);
        assert_eq!(runtime.create(), Err(StatusCode::HOST_ALREADY_EXISTS));
        assert_eq!(runtime.calls().create, 1);
        assert_eq!(runtime.live_hosts(), 0);
    }
}
