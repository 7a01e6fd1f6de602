//! Resolved functions and their cache keys.

use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::sync::Arc;

use modhost_abi::{FnSignature, SignatureTag};

use crate::error::{HostError, Result};

/// Composite identity of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_path: String,
    pub type_name: String,
    pub method_name: String,
    pub signature: SignatureTag,
}

impl CacheKey {
    pub fn new(
        source_path: impl Into<String>,
        type_name: impl Into<String>,
        method_name: impl Into<String>,
        signature: SignatureTag,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            type_name: type_name.into(),
            method_name: method_name.into(),
            signature,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}.{}[{}]",
            self.source_path, self.type_name, self.method_name, self.signature
        )
    }
}

/// A native function address together with the call shape it was resolved
/// for.
///
/// Clones share the same entry: two successful lookups of one key return
/// values for which [`same_entry`](Self::same_entry) is true.
#[derive(Debug, Clone)]
pub struct ResolvedFunction {
    key: Arc<CacheKey>,
    address: NonZeroUsize,
}

impl ResolvedFunction {
    pub(crate) fn new(key: CacheKey, address: NonZeroUsize) -> Self {
        Self {
            key: Arc::new(key),
            address,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn address(&self) -> NonZeroUsize {
        self.address
    }

    pub fn signature(&self) -> &SignatureTag {
        &self.key.signature
    }

    /// True if both values came from the same cache entry.
    pub fn same_entry(&self, other: &ResolvedFunction) -> bool {
        Arc::ptr_eq(&self.key, &other.key)
    }

    /// Checks the requested pointer type against the resolved signature.
    pub fn typed<F: FnSignature>(&self) -> Result<TypedFunction<F>> {
        let expected = F::signature();
        if !expected.is_compatible(self.signature()) {
            return Err(HostError::SignatureMismatch {
                expected,
                actual: self.signature().clone(),
            });
        }
        Ok(TypedFunction {
            inner: self.clone(),
            _marker: PhantomData,
        })
    }
}

/// A resolved function whose signature has been checked against `F`.
#[derive(Debug, Clone)]
pub struct TypedFunction<F> {
    inner: ResolvedFunction,
    _marker: PhantomData<F>,
}

impl<F: FnSignature> TypedFunction<F> {
    /// The callable pointer.
    ///
    /// # Safety
    ///
    /// The signature tag only records what the caller asked for; the native
    /// layer cannot verify it. The module this function came from must also
    /// stay loaded for as long as the pointer is called.
    pub unsafe fn get(&self) -> F {
        unsafe { F::from_address(self.inner.address) }
    }

    pub fn resolved(&self) -> &ResolvedFunction {
        &self.inner
    }
}
