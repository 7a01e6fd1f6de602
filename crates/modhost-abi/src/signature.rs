//! Call-shape tags for resolved functions.
//!
//! A native function address is only safe to call through a function
//! pointer type whose parameters and return type match the managed method.
//! [`SignatureTag`] records that shape next to the address, and
//! [`FnSignature`] lets a Rust `extern "C" fn` type describe itself so the two
//! can be compared before a typed pointer is handed out.

use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;

use thiserror::Error;

/// Scalar types that may appear in a resolved function's signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Void,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// Untyped pointer (`void*`, `nint`)
    Ptr,
    /// Null-terminated UTF-8 string (`const char*`)
    CStr,
}

impl ValueType {
    /// Parse a type name. Accepts the Rust spellings used by [`Display`] as
    /// well as the common C spellings.
    ///
    /// [`Display`]: fmt::Display
    pub fn parse(s: &str) -> Option<Self> {
        let ty = match s.trim().to_ascii_lowercase().as_str() {
            "void" | "()" => ValueType::Void,
            "bool" => ValueType::Bool,
            "i8" | "int8" | "int8_t" | "sbyte" => ValueType::I8,
            "i16" | "int16" | "int16_t" | "short" => ValueType::I16,
            "i32" | "int32" | "int32_t" | "int" => ValueType::I32,
            "i64" | "int64" | "int64_t" | "long" => ValueType::I64,
            "u8" | "uint8" | "uint8_t" | "byte" => ValueType::U8,
            "u16" | "uint16" | "uint16_t" | "ushort" => ValueType::U16,
            "u32" | "uint32" | "uint32_t" | "uint" => ValueType::U32,
            "u64" | "uint64" | "uint64_t" | "ulong" => ValueType::U64,
            "f32" | "float" => ValueType::F32,
            "f64" | "double" => ValueType::F64,
            "ptr" | "void*" | "nint" | "intptr" => ValueType::Ptr,
            "cstr" | "char*" | "const char*" | "string" => ValueType::CStr,
            _ => return None,
        };
        Some(ty)
    }

    /// Whether a value of this type may be passed where `other` is declared.
    ///
    /// A string is passed as a plain pointer, so `CStr` and `Ptr` are
    /// interchangeable; every other type only matches itself.
    pub fn is_compatible(self, other: ValueType) -> bool {
        match (self, other) {
            (ValueType::Ptr, ValueType::CStr) | (ValueType::CStr, ValueType::Ptr) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Void => "void",
            ValueType::Bool => "bool",
            ValueType::I8 => "i8",
            ValueType::I16 => "i16",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::U8 => "u8",
            ValueType::U16 => "u16",
            ValueType::U32 => "u32",
            ValueType::U64 => "u64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::Ptr => "ptr",
            ValueType::CStr => "cstr",
        };
        f.write_str(name)
    }
}

/// Parameter and return types of a resolved function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureTag {
    pub params: Vec<ValueType>,
    pub ret: ValueType,
}

impl SignatureTag {
    pub fn new(params: impl Into<Vec<ValueType>>, ret: ValueType) -> Self {
        Self {
            params: params.into(),
            ret,
        }
    }

    /// `void()`
    pub fn unit() -> Self {
        Self::new(Vec::new(), ValueType::Void)
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Whether a function declared as `other` can be called through this
    /// shape. See [`ValueType::is_compatible`].
    pub fn is_compatible(&self, other: &SignatureTag) -> bool {
        self.ret.is_compatible(other.ret)
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.is_compatible(*b))
    }
}

impl fmt::Display for SignatureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")
    }
}

/// Error returned when a signature string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseSignatureError {
    #[error("signature must look like `ret(param, ...)`: {0}")]
    Malformed(String),

    #[error("unknown type `{0}` in signature")]
    UnknownType(String),

    #[error("`void` is only allowed as a return type")]
    VoidParameter,
}

impl FromStr for SignatureTag {
    type Err = ParseSignatureError;

    /// Parses the form produced by `Display`, e.g. `i32(i32, i32)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let open = s
            .find('(')
            .ok_or_else(|| ParseSignatureError::Malformed(s.to_string()))?;
        let inner = s[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| ParseSignatureError::Malformed(s.to_string()))?;

        let ret_name = &s[..open];
        let ret = ValueType::parse(ret_name)
            .ok_or_else(|| ParseSignatureError::UnknownType(ret_name.trim().to_string()))?;

        let mut params = Vec::new();
        if !inner.trim().is_empty() {
            for part in inner.split(',').map(str::trim) {
                if part.is_empty() {
                    return Err(ParseSignatureError::Malformed(s.to_string()));
                }
                let ty = ValueType::parse(part)
                    .ok_or_else(|| ParseSignatureError::UnknownType(part.to_string()))?;
                if ty == ValueType::Void {
                    return Err(ParseSignatureError::VoidParameter);
                }
                params.push(ty);
            }
        }

        Ok(SignatureTag { params, ret })
    }
}

/// A Rust type that can cross the native boundary as a scalar.
pub trait AbiValue {
    const VALUE_TYPE: ValueType;
}

macro_rules! abi_value {
    ($($ty:ty => $vt:ident),* $(,)?) => {
        $(impl AbiValue for $ty {
            const VALUE_TYPE: ValueType = ValueType::$vt;
        })*
    };
}

abi_value! {
    () => Void,
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    isize => Ptr,
    usize => Ptr,
}

impl<T> AbiValue for *const T {
    const VALUE_TYPE: ValueType = ValueType::Ptr;
}

impl<T> AbiValue for *mut T {
    const VALUE_TYPE: ValueType = ValueType::Ptr;
}

/// An `extern "C"` function pointer type with a known call shape.
///
/// Implemented for `extern "C" fn` pointers of up to six [`AbiValue`]
/// parameters.
pub trait FnSignature: Copy + Send + Sync + 'static {
    /// The tag describing this pointer type.
    fn signature() -> SignatureTag;

    /// Reinterpret a native address as this function pointer type.
    ///
    /// # Safety
    ///
    /// `address` must point at a function with exactly this call shape and
    /// must stay valid for as long as the returned pointer is used.
    unsafe fn from_address(address: NonZeroUsize) -> Self;
}

macro_rules! fn_signature {
    ($($param:ident),*) => {
        impl<R: AbiValue + 'static, $($param: AbiValue + 'static),*> FnSignature
            for extern "C" fn($($param),*) -> R
        {
            fn signature() -> SignatureTag {
                SignatureTag::new(
                    Vec::<ValueType>::from([$($param::VALUE_TYPE),*]),
                    R::VALUE_TYPE,
                )
            }

            unsafe fn from_address(address: NonZeroUsize) -> Self {
                let raw = address.get();
                // SAFETY: function pointers are pointer-sized; the caller
                // vouches for the call shape.
                unsafe { std::mem::transmute_copy::<usize, Self>(&raw) }
            }
        }
    };
}

fn_signature!();
fn_signature!(A0);
fn_signature!(A0, A1);
fn_signature!(A0, A1, A2);
fn_signature!(A0, A1, A2, A3);
fn_signature!(A0, A1, A2, A3, A4);
fn_signature!(A0, A1, A2, A3, A4, A5);
