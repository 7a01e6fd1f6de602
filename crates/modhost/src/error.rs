//! Error types for the module host
//!
//! Native calls report failures as signed status codes. [`translate`] maps
//! them onto [`HostError`] variants, attaching the context of the call (a
//! path, a `Type.Method` pair, or a handle) for diagnostics.

use modhost_abi::{ModuleHandle, SignatureTag, StatusBand, StatusCode};
use thiserror::Error;

/// Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors that can occur while driving the native runtime host
#[derive(Debug, Error)]
pub enum HostError {
    /// A caller-supplied argument was rejected
    #[error("Invalid argument: {context}")]
    InvalidArgument { context: String },

    /// The native layer has no host for the given handle
    #[error("Host not found: {context}")]
    HostNotFound { context: String },

    /// A host already exists for this process or slot
    #[error("Host already exists: {context}")]
    HostAlreadyExists { context: String },

    /// The native host could not be created
    #[error("Failed to create host (status {code}): {context}")]
    HostCreationFailure { code: i32, context: String },

    /// `initialize` was called on an initialized host
    #[error("Runtime is already initialized")]
    AlreadyInitialized,

    /// The module handle is unknown to the host
    #[error("Module not found: {context}")]
    ModuleNotFound { context: String },

    /// The module exists but its runtime was never started
    #[error("Module not initialized: {context}")]
    ModuleNotInitialized { context: String },

    /// Starting the managed runtime failed. Never retried.
    #[error("Runtime initialization failed: {context}")]
    RuntimeInitFailure { context: String },

    /// The runtime loader library could not be found or opened
    #[error("Native library not found: {context}")]
    NativeLibraryMissing { context: String },

    /// A required runtime delegate could not be obtained
    #[error("Runtime delegate not found: {context}")]
    DelegateNotFound { context: String },

    /// The module could not be loaded
    #[error("Failed to load module (status {code}): {context}")]
    ModuleLoadFailure { code: i32, context: String },

    /// The type containing the requested method could not be loaded
    #[error("Failed to load type: {context}")]
    TypeResolutionFailure { context: String },

    /// The requested method could not be resolved
    #[error("Failed to resolve method: {context}")]
    MethodResolutionFailure { context: String },

    /// The object was used after `dispose`
    #[error("{object} used after dispose")]
    UseAfterDispose { object: &'static str },

    /// A failing status outside every enumerated code
    #[error("Unknown native error {code}: {context}")]
    UnknownNativeError { code: i32, context: String },

    /// A resolved function was requested with a different call shape
    #[error("Signature mismatch: resolved as {actual}, requested {expected}")]
    SignatureMismatch {
        expected: SignatureTag,
        actual: SignatureTag,
    },

    /// The native layer handed out a module handle that is still live
    #[error("Native layer returned module handle {handle} which is already registered")]
    DuplicateHandle { handle: ModuleHandle },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Field-free discriminant of [`HostError`], for matching and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    HostNotFound,
    HostAlreadyExists,
    HostCreationFailure,
    AlreadyInitialized,
    ModuleNotFound,
    ModuleNotInitialized,
    RuntimeInitFailure,
    NativeLibraryMissing,
    DelegateNotFound,
    ModuleLoadFailure,
    TypeResolutionFailure,
    MethodResolutionFailure,
    UseAfterDispose,
    UnknownNativeError(i32),
    SignatureMismatch,
    DuplicateHandle,
    Config,
    Io,
}

impl HostError {
    pub fn invalid_argument(context: impl Into<String>) -> Self {
        HostError::InvalidArgument {
            context: context.into(),
        }
    }

    pub fn use_after_dispose(object: &'static str) -> Self {
        HostError::UseAfterDispose { object }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HostError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            HostError::HostNotFound { .. } => ErrorKind::HostNotFound,
            HostError::HostAlreadyExists { .. } => ErrorKind::HostAlreadyExists,
            HostError::HostCreationFailure { .. } => ErrorKind::HostCreationFailure,
            HostError::AlreadyInitialized => ErrorKind::AlreadyInitialized,
            HostError::ModuleNotFound { .. } => ErrorKind::ModuleNotFound,
            HostError::ModuleNotInitialized { .. } => ErrorKind::ModuleNotInitialized,
            HostError::RuntimeInitFailure { .. } => ErrorKind::RuntimeInitFailure,
            HostError::NativeLibraryMissing { .. } => ErrorKind::NativeLibraryMissing,
            HostError::DelegateNotFound { .. } => ErrorKind::DelegateNotFound,
            HostError::ModuleLoadFailure { .. } => ErrorKind::ModuleLoadFailure,
            HostError::TypeResolutionFailure { .. } => ErrorKind::TypeResolutionFailure,
            HostError::MethodResolutionFailure { .. } => ErrorKind::MethodResolutionFailure,
            HostError::UseAfterDispose { .. } => ErrorKind::UseAfterDispose,
            HostError::UnknownNativeError { code, .. } => ErrorKind::UnknownNativeError(*code),
            HostError::SignatureMismatch { .. } => ErrorKind::SignatureMismatch,
            HostError::DuplicateHandle { .. } => ErrorKind::DuplicateHandle,
            HostError::Config(_) | HostError::Toml(_) => ErrorKind::Config,
            HostError::Io(_) => ErrorKind::Io,
        }
    }

    /// The native status code this error stands for, if any.
    pub fn code(&self) -> Option<i32> {
        let status = match self {
            HostError::InvalidArgument { .. } => StatusCode::INVALID_ARG,
            HostError::HostNotFound { .. } => StatusCode::HOST_NOT_FOUND,
            HostError::HostAlreadyExists { .. } => StatusCode::HOST_ALREADY_EXISTS,
            HostError::ModuleNotFound { .. } => StatusCode::MODULE_NOT_FOUND,
            HostError::ModuleNotInitialized { .. } => StatusCode::MODULE_NOT_INITIALIZED,
            HostError::RuntimeInitFailure { .. } => StatusCode::RUNTIME_INIT,
            HostError::NativeLibraryMissing { .. } => StatusCode::LOADER_NOT_FOUND,
            HostError::DelegateNotFound { .. } => StatusCode::DELEGATE_NOT_FOUND,
            HostError::TypeResolutionFailure { .. } => StatusCode::TYPE_LOAD,
            HostError::MethodResolutionFailure { .. } => StatusCode::METHOD_LOAD,
            HostError::HostCreationFailure { code, .. }
            | HostError::ModuleLoadFailure { code, .. }
            | HostError::UnknownNativeError { code, .. } => StatusCode(*code),
            _ => return None,
        };
        Some(status.code())
    }

    /// The status band of [`code`](Self::code).
    pub fn band(&self) -> Option<StatusBand> {
        self.code().and_then(StatusBand::of)
    }

    /// Fatal errors leave the host unusable; callers should dispose it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HostError::RuntimeInitFailure { .. })
    }

    /// True for errors the host detects itself rather than translating
    /// from a native status.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            HostError::AlreadyInitialized
                | HostError::UseAfterDispose { .. }
                | HostError::SignatureMismatch { .. }
                | HostError::DuplicateHandle { .. }
                | HostError::Config(_)
                | HostError::Io(_)
                | HostError::Toml(_)
        )
    }
}

/// Map a native status to a typed error.
///
/// Zero and positive codes are success and yield `None`. Every negative
/// code yields an error; codes that are not individually enumerated, even
/// inside a known band, become [`HostError::UnknownNativeError`] with the
/// raw code preserved.
pub fn translate(status: StatusCode, context: impl Into<String>) -> Option<HostError> {
    if status.is_success() {
        return None;
    }
    Some(from_status(status, context))
}

/// Map a status already known to be a failure.
pub(crate) fn from_status(status: StatusCode, context: impl Into<String>) -> HostError {
    let context = context.into();
    match status {
        StatusCode::HOST_NOT_FOUND => HostError::HostNotFound { context },
        StatusCode::HOST_ALREADY_EXISTS => HostError::HostAlreadyExists { context },
        StatusCode::MODULE_NOT_FOUND => HostError::ModuleNotFound { context },
        StatusCode::MODULE_NOT_INITIALIZED => HostError::ModuleNotInitialized { context },
        StatusCode::RUNTIME_INIT => HostError::RuntimeInitFailure { context },
        StatusCode::LOADER_NOT_FOUND => HostError::NativeLibraryMissing { context },
        StatusCode::DELEGATE_NOT_FOUND => HostError::DelegateNotFound { context },
        StatusCode::ASSEMBLY_LOAD => HostError::ModuleLoadFailure {
            code: status.code(),
            context,
        },
        StatusCode::TYPE_LOAD => HostError::TypeResolutionFailure { context },
        StatusCode::METHOD_LOAD => HostError::MethodResolutionFailure { context },
        StatusCode::INVALID_ARG => HostError::InvalidArgument { context },
        other => HostError::UnknownNativeError {
            code: other.code(),
            context,
        },
    }
}

/// [`translate`] as a `Result`.
pub fn check(status: StatusCode, context: impl Into<String>) -> Result<()> {
    match translate(status, context) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-100, ErrorKind::HostNotFound)]
    #[case(-101, ErrorKind::HostAlreadyExists)]
    #[case(-200, ErrorKind::ModuleNotFound)]
    #[case(-203, ErrorKind::ModuleNotInitialized)]
    #[case(-300, ErrorKind::RuntimeInitFailure)]
    #[case(-302, ErrorKind::NativeLibraryMissing)]
    #[case(-303, ErrorKind::DelegateNotFound)]
    #[case(-400, ErrorKind::ModuleLoadFailure)]
    #[case(-401, ErrorKind::TypeResolutionFailure)]
    #[case(-402, ErrorKind::MethodResolutionFailure)]
    #[case(-500, ErrorKind::InvalidArgument)]
    fn test_translate_enumerated(#[case] code: i32, #[case] kind: ErrorKind) {
        let error = translate(StatusCode(code), "ctx").unwrap();
        assert_eq!(error.kind(), kind);
        assert_eq!(error.code(), Some(code));
    }

    #[rstest]
    #[case(-12345)]
    #[case(-150)]
    #[case(-301)]
    #[case(-599)]
    #[case(-1)]
    fn test_translate_unknown_preserves_code(#[case] code: i32) {
        let error = translate(StatusCode(code), "Calc.Add").unwrap();
        assert_eq!(error.kind(), ErrorKind::UnknownNativeError(code));
        assert_eq!(error.code(), Some(code));
        assert!(error.to_string().contains(&code.to_string()));
        assert!(error.to_string().contains("Calc.Add"));
    }

    #[test]
    fn test_success_codes_translate_to_nothing() {
        assert!(translate(StatusCode(0), "ctx").is_none());
        assert!(translate(StatusCode(1), "ctx").is_none());
        assert!(translate(StatusCode(i32::MAX), "ctx").is_none());
        assert!(check(StatusCode::SUCCESS, "ctx").is_ok());
    }

    #[test]
    fn test_context_is_attached() {
        let error = translate(StatusCode::TYPE_LOAD, "lib.dll:Calc.Add").unwrap();
        assert_eq!(error.to_string(), "Failed to load type: lib.dll:Calc.Add");
    }

    #[test]
    fn test_band_and_fatality() {
        let error = translate(StatusCode::RUNTIME_INIT, "config.json").unwrap();
        assert!(error.is_fatal());
        assert_eq!(error.band(), Some(StatusBand::Runtime));

        let error = HostError::use_after_dispose("Module");
        assert!(!error.is_fatal());
        assert!(error.is_local());
        assert_eq!(error.code(), None);
        assert_eq!(error.band(), None);
    }
}
