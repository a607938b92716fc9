//! Codec error types.
//!
//! Encoding and decoding failures are kept apart: an [`EncodeError`] always
//! points at a programming or schema mistake on the caller's side, while a
//! [`DecodeError`] means the bytes handed to us are corrupt or come from an
//! incompatible producer.  Neither is ever worth retrying.

use thiserror::Error;

use crate::value::DataType;

/// Errors raised while turning native values into wire-format bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Two entries of the same list resolved to the same key.
    #[error("duplicate key {0:?} in nvlist")]
    DuplicateKey(String),

    /// A key or string value contains a NUL byte, which the C side would
    /// silently truncate.
    #[error("{0:?} contains an interior NUL byte")]
    InteriorNul(String),

    /// A pair name does not fit the 16-bit name length of the pair header.
    #[error("pair name is {len} bytes, limit is {max}")]
    NameTooLong {
        /// Length of the offending name in bytes.
        len: usize,
        /// Longest name the wire format can carry.
        max: usize,
    },

    /// A value (or the whole list) overflows the 32-bit size fields.
    #[error("value for {0:?} is too large for the wire format")]
    TooLarge(String),

    /// The native value has no wire representation.
    #[error("unsupported value: {0}")]
    Unsupported(String),
}

/// Errors raised while parsing wire-format bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The input ended before a complete item could be read.
    #[error("truncated input: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Offset at which the read was attempted.
        offset: usize,
        /// Number of bytes the read required.
        needed: usize,
    },

    /// The stream header names an encoding we do not speak.
    #[error("unknown nvlist encoding {0}")]
    UnknownEncoding(u8),

    /// A pair carries a type tag outside the known table.
    #[error("unknown data type tag {tag} for key {key:?}")]
    UnknownDataType {
        /// Key of the offending pair.
        key: String,
        /// Raw tag value.
        tag: i32,
    },

    /// An element count disagrees with the payload or the pair header.
    #[error("length mismatch for {key:?}: header says {declared}, payload says {actual}")]
    LengthMismatch {
        /// Key of the offending pair.
        key: String,
        /// Element count announced by the pair header.
        declared: usize,
        /// Element count found in the payload.
        actual: usize,
    },

    /// A string is not valid UTF-8.
    #[error("invalid UTF-8 in {0:?}")]
    InvalidUtf8(String),

    /// The wire value cannot be stored in the native field.
    #[error("type mismatch for {key:?}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Key of the offending pair (empty until attached by the caller).
        key: String,
        /// Type the native field accepts.
        expected: DataType,
        /// Type present on the wire.
        found: DataType,
    },

    /// Nested lists exceed the supported depth.
    #[error("nvlist nesting deeper than {0} levels")]
    TooDeep(usize),

    /// Any other structural problem.
    #[error("malformed nvlist: {0}")]
    Malformed(String),
}

impl DecodeError {
    /// Create a [`DecodeError::Malformed`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn malformed<E: std::fmt::Display>(e: E) -> Self {
        Self::Malformed(e.to_string())
    }

    /// Attach the wire key to errors produced before the key was known.
    #[must_use]
    pub fn with_key(self, key: &str) -> Self {
        match self {
            Self::TypeMismatch {
                key: k,
                expected,
                found,
            } if k.is_empty() => Self::TypeMismatch {
                key: key.to_owned(),
                expected,
                found,
            },
            Self::LengthMismatch {
                key: k,
                declared,
                actual,
            } if k.is_empty() => Self::LengthMismatch {
                key: key.to_owned(),
                declared,
                actual,
            },
            Self::InvalidUtf8(k) if k.is_empty() => Self::InvalidUtf8(key.to_owned()),
            other => other,
        }
    }
}
