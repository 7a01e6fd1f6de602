//! Opaque native handles.
//!
//! The native layer identifies hosts and modules by pointer-sized values.
//! They are wrapped in non-zero newtypes so that a null handle can never be
//! stored as if it were live.

use std::fmt;
use std::num::NonZeroUsize;

/// A handle exactly as the native layer returned it, before validation.
pub type RawHandle = usize;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroUsize);

        impl $name {
            /// Wrap a raw native value. Returns `None` for a null handle.
            pub fn from_raw(raw: RawHandle) -> Option<Self> {
                NonZeroUsize::new(raw).map(Self)
            }

            /// The raw value to pass back across the ABI.
            pub fn as_raw(self) -> RawHandle {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0.get())
            }
        }
    };
}

opaque_handle!(
    /// Identifies one native runtime host instance.
    HostHandle
);

opaque_handle!(
    /// Identifies one module loaded into a host.
    ModuleHandle
);
