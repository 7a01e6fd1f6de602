//! Loaded modules and their function caches
//!
//! A [`Module`] is created by [`Host::load`] and stays registered with its
//! host until it is disposed, either directly or by the host's disposal
//! cascade. Functions resolved through a module are cached by their full
//! composite key, so repeated lookups never reach the native layer.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use modhost_abi::{FnSignature, FunctionRequest, ModuleHandle, SignatureTag};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{HostError, Result};
use crate::function::{CacheKey, ResolvedFunction, TypedFunction};
use crate::host::{Host, HostShared};

pub(crate) struct ModuleShared {
    handle: ModuleHandle,
    source_path: String,
    host: Weak<HostShared>,
    cache: RwLock<HashMap<CacheKey, ResolvedFunction>>,
    /// Serializes first resolutions and disposal
    gate: Mutex<()>,
    disposed: AtomicBool,
}

impl ModuleShared {
    pub(crate) fn new(handle: ModuleHandle, source_path: String, host: Weak<HostShared>) -> Self {
        Self {
            handle,
            source_path,
            host,
            cache: RwLock::new(HashMap::new()),
            gate: Mutex::new(()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Called by the host cascade, which has already taken over the native
    /// unload.
    pub(crate) fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::Release);
        self.cache.write().clear();
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(HostError::use_after_dispose("Module"));
        }
        Ok(())
    }
}

/// A managed code module loaded into a [`Host`].
///
/// Clones refer to the same loaded module. Dropping a `Module` does not
/// unload it; call [`dispose`](Self::dispose), or dispose the host.
#[derive(Clone)]
pub struct Module {
    shared: Arc<ModuleShared>,
}

impl Module {
    pub(crate) fn from_shared(shared: Arc<ModuleShared>) -> Self {
        Self { shared }
    }

    pub fn handle(&self) -> ModuleHandle {
        self.shared.handle
    }

    /// The path this module was loaded from.
    pub fn source_path(&self) -> &str {
        &self.shared.source_path
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Number of cached functions.
    pub fn cached_len(&self) -> usize {
        self.shared.cache.read().len()
    }

    /// The owning host, while it is alive.
    pub fn host(&self) -> Option<Host> {
        self.shared.host.upgrade().map(Host::from_shared)
    }

    /// Resolve `type_name.method_name` in this module's own source path.
    pub fn resolve(
        &self,
        type_name: &str,
        method_name: &str,
        signature: SignatureTag,
    ) -> Result<ResolvedFunction> {
        let source_path = self.shared.source_path.clone();
        self.resolve_in(&source_path, type_name, method_name, signature)
    }

    /// Resolve a function from `source_path` through this module.
    ///
    /// Used when the loaded unit is a runtime configuration and functions
    /// live in separate assemblies. The first successful lookup of a key
    /// calls the native resolver; every later lookup, from any thread,
    /// returns the cached entry.
    pub fn resolve_in(
        &self,
        source_path: &str,
        type_name: &str,
        method_name: &str,
        signature: SignatureTag,
    ) -> Result<ResolvedFunction> {
        let shared = &self.shared;
        shared.ensure_live()?;
        if source_path.is_empty() || type_name.is_empty() || method_name.is_empty() {
            return Err(HostError::invalid_argument(
                "source path, type name and method name must be non-empty",
            ));
        }

        let key = CacheKey::new(source_path, type_name, method_name, signature);
        if let Some(hit) = shared.cache.read().get(&key) {
            return Ok(hit.clone());
        }

        let _gate = shared.gate.lock();
        shared.ensure_live()?;
        if let Some(hit) = shared.cache.read().get(&key) {
            return Ok(hit.clone());
        }

        let host = self
            .host()
            .ok_or_else(|| HostError::use_after_dispose("Host"))?;
        let request = FunctionRequest {
            source_path: &key.source_path,
            type_name: &key.type_name,
            method_name: &key.method_name,
            signature: &key.signature,
        };
        let address = host.get_function_pointer(shared.handle, &request)?;

        let mut cache = shared.cache.write();
        // A host cascade may have run while the native call was in flight
        shared.ensure_live()?;
        debug!("Resolved {} at {:#x}", key, address.get());
        let resolved = ResolvedFunction::new(key.clone(), address);
        cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Resolve a function and check it against the pointer type `F`.
    pub fn resolve_typed<F: FnSignature>(
        &self,
        type_name: &str,
        method_name: &str,
    ) -> Result<TypedFunction<F>> {
        let resolved = self.resolve(type_name, method_name, F::signature())?;
        resolved.typed::<F>()
    }

    pub fn clear_cache(&self) -> Result<()> {
        self.shared.ensure_live()?;
        self.shared.cache.write().clear();
        Ok(())
    }

    /// Unload the module from its host.
    ///
    /// Only the first call does anything. If the host has already been
    /// disposed, its cascade unloaded this module and this returns `Ok`.
    pub fn dispose(&self) -> Result<()> {
        let shared = &self.shared;
        let _gate = shared.gate.lock();
        if shared.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        shared.cache.write().clear();

        match self.host() {
            Some(host) => {
                let result = host.unload(shared.handle);
                info!("Module disposed: {}", shared.source_path);
                result
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("handle", &self.shared.handle)
            .field("source_path", &self.shared.source_path)
            .field("disposed", &self.is_disposed())
            .field("cached", &self.cached_len())
            .finish()
    }
}
