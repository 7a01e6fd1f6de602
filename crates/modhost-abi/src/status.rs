//! Native status codes.
//!
//! Zero and every positive value mean success. Negative values are split
//! into five fixed bands of one hundred codes each:
//!
//! | Range          | Band       |
//! |----------------|------------|
//! | `-100..=-199`  | Host       |
//! | `-200..=-299`  | Module     |
//! | `-300..=-399`  | Runtime    |
//! | `-400..=-499`  | Resolution |
//! | `-500..=-599`  | Argument   |

use std::fmt;
use std::ops::RangeInclusive;

/// Result of a native call: the value on success, the raw status otherwise.
pub type NativeResult<T> = Result<T, StatusCode>;

/// A signed status code returned by the native hosting library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);

    // Host band
    pub const HOST_NOT_FOUND: StatusCode = StatusCode(-100);
    pub const HOST_ALREADY_EXISTS: StatusCode = StatusCode(-101);

    // Module band
    pub const MODULE_NOT_FOUND: StatusCode = StatusCode(-200);
    pub const MODULE_NOT_INITIALIZED: StatusCode = StatusCode(-203);

    // Runtime band
    pub const RUNTIME_INIT: StatusCode = StatusCode(-300);
    pub const LOADER_NOT_FOUND: StatusCode = StatusCode(-302);
    pub const DELEGATE_NOT_FOUND: StatusCode = StatusCode(-303);

    // Resolution band
    pub const ASSEMBLY_LOAD: StatusCode = StatusCode(-400);
    pub const TYPE_LOAD: StatusCode = StatusCode(-401);
    pub const METHOD_LOAD: StatusCode = StatusCode(-402);

    // Argument band
    pub const INVALID_ARG: StatusCode = StatusCode(-500);

    /// The raw integer.
    pub fn code(self) -> i32 {
        self.0
    }

    /// Zero and positive values are success.
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    /// The band this code falls into, if it is a failure inside one.
    pub fn band(self) -> Option<StatusBand> {
        StatusBand::of(self.0)
    }

    /// Turn a status into a result carrying `value` on success.
    pub fn into_result<T>(self, value: T) -> NativeResult<T> {
        if self.is_success() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> Self {
        StatusCode(code)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of a failing status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusBand {
    Host,
    Module,
    Runtime,
    Resolution,
    Argument,
}

impl StatusBand {
    pub const ALL: [StatusBand; 5] = [
        StatusBand::Host,
        StatusBand::Module,
        StatusBand::Runtime,
        StatusBand::Resolution,
        StatusBand::Argument,
    ];

    /// The inclusive range of codes belonging to this band.
    pub fn range(self) -> RangeInclusive<i32> {
        match self {
            StatusBand::Host => -199..=-100,
            StatusBand::Module => -299..=-200,
            StatusBand::Runtime => -399..=-300,
            StatusBand::Resolution => -499..=-400,
            StatusBand::Argument => -599..=-500,
        }
    }

    /// Classify a raw code. Success codes and codes outside every band
    /// return `None`.
    pub fn of(code: i32) -> Option<StatusBand> {
        Self::ALL.into_iter().find(|band| band.range().contains(&code))
    }
}

impl fmt::Display for StatusBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusBand::Host => "host",
            StatusBand::Module => "module",
            StatusBand::Runtime => "runtime",
            StatusBand::Resolution => "resolution",
            StatusBand::Argument => "argument",
        };
        f.write_str(name)
    }
}
