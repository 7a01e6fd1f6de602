//! modhost ABI crate
//!
//! Types shared between the module host and the native hosting library it
//! drives: status codes and their bands, opaque handles, call-shape tags for
//! resolved functions, and the [`NativeRuntime`] trait describing the six
//! native entry points.

pub mod handle;
pub mod runtime;
pub mod signature;
pub mod status;

// Re-export main types for convenience
pub use handle::{HostHandle, ModuleHandle, RawHandle};
pub use runtime::{FunctionRequest, NativeRuntime};
pub use signature::{FnSignature, ParseSignatureError, SignatureTag, ValueType};
pub use status::{NativeResult, StatusBand, StatusCode};
