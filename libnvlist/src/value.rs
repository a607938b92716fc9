//! The wire value model: [`DataType`] tags, the closed [`Value`] variant and
//! the ordered, unique-keyed [`NvList`].
//!
//! `Value` doubles as the dynamic decode target: when no schema is known the
//! codec returns a plain `NvList` tree and callers walk it with the usual
//! pattern matching.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::EncodeError;

// ============================================================================
// DataType: single-source definition via macro
// ============================================================================

macro_rules! define_data_types {
    ( $( $(#[$meta:meta])* $variant:ident = $id:expr, $display:expr; )* ) => {
        /// Numeric type tag carried by every pair on the wire.
        ///
        /// The values mirror the kernel's `data_type_t` and must never be
        /// renumbered.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum DataType {
            $( $(#[$meta])* $variant = $id, )*
        }

        impl DataType {
            /// Decode from the raw tag. Returns `None` for unknown tags.
            pub fn from_i32(v: i32) -> Option<Self> {
                match v {
                    $( $id => Some(Self::$variant), )*
                    _ => None,
                }
            }

            /// Encode to the raw tag.
            #[inline]
            pub fn as_i32(self) -> i32 {
                self as i32
            }

            /// Kernel-style name for logging/debugging.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $display, )*
                }
            }
        }

        /// All defined data types (for testing completeness).
        #[doc(hidden)]
        #[cfg(test)]
        pub(crate) const ALL_DATA_TYPES: &[DataType] = &[
            $( DataType::$variant, )*
        ];
    };
}

define_data_types! {
    /// Presence-only flag, no payload
    Boolean      = 1,  "BOOLEAN";
    /// Unsigned byte
    Byte         = 2,  "BYTE";
    Int16        = 3,  "INT16";
    Uint16       = 4,  "UINT16";
    Int32        = 5,  "INT32";
    Uint32       = 6,  "UINT32";
    Int64        = 7,  "INT64";
    Uint64       = 8,  "UINT64";
    String       = 9,  "STRING";
    ByteArray    = 10, "BYTE_ARRAY";
    Int16Array   = 11, "INT16_ARRAY";
    Uint16Array  = 12, "UINT16_ARRAY";
    Int32Array   = 13, "INT32_ARRAY";
    Uint32Array  = 14, "UINT32_ARRAY";
    Int64Array   = 15, "INT64_ARRAY";
    Uint64Array  = 16, "UINT64_ARRAY";
    StringArray  = 17, "STRING_ARRAY";
    /// High resolution time, signed nanoseconds
    Hrtime       = 18, "HRTIME";
    NvList       = 19, "NVLIST";
    NvListArray  = 20, "NVLIST_ARRAY";
    BooleanValue = 21, "BOOLEAN_VALUE";
    Int8         = 22, "INT8";
    Uint8        = 23, "UINT8";
    BooleanArray = 24, "BOOLEAN_ARRAY";
    Int8Array    = 25, "INT8_ARRAY";
    Uint8Array   = 26, "UINT8_ARRAY";
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Value
// ============================================================================

/// A single wire value.
///
/// Width and signedness are part of the identity: `Uint32(7)` and
/// `Uint64(7)` are different values and are never coerced into each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Boolean,
    BooleanValue(bool),
    Byte(u8),
    Int8(i8),
    Uint8(u8),
    Int16(i16),
    Uint16(u16),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Hrtime(i64),
    String(String),
    ByteArray(Vec<u8>),
    BooleanArray(Vec<bool>),
    Int8Array(Vec<i8>),
    Uint8Array(Vec<u8>),
    Int16Array(Vec<i16>),
    Uint16Array(Vec<u16>),
    Int32Array(Vec<i32>),
    Uint32Array(Vec<u32>),
    Int64Array(Vec<i64>),
    Uint64Array(Vec<u64>),
    StringArray(Vec<String>),
    NvList(NvList),
    NvListArray(Vec<NvList>),
}

impl Value {
    /// Type tag written on the wire for this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Boolean => DataType::Boolean,
            Self::BooleanValue(_) => DataType::BooleanValue,
            Self::Byte(_) => DataType::Byte,
            Self::Int8(_) => DataType::Int8,
            Self::Uint8(_) => DataType::Uint8,
            Self::Int16(_) => DataType::Int16,
            Self::Uint16(_) => DataType::Uint16,
            Self::Int32(_) => DataType::Int32,
            Self::Uint32(_) => DataType::Uint32,
            Self::Int64(_) => DataType::Int64,
            Self::Uint64(_) => DataType::Uint64,
            Self::Hrtime(_) => DataType::Hrtime,
            Self::String(_) => DataType::String,
            Self::ByteArray(_) => DataType::ByteArray,
            Self::BooleanArray(_) => DataType::BooleanArray,
            Self::Int8Array(_) => DataType::Int8Array,
            Self::Uint8Array(_) => DataType::Uint8Array,
            Self::Int16Array(_) => DataType::Int16Array,
            Self::Uint16Array(_) => DataType::Uint16Array,
            Self::Int32Array(_) => DataType::Int32Array,
            Self::Uint32Array(_) => DataType::Uint32Array,
            Self::Int64Array(_) => DataType::Int64Array,
            Self::Uint64Array(_) => DataType::Uint64Array,
            Self::StringArray(_) => DataType::StringArray,
            Self::NvList(_) => DataType::NvList,
            Self::NvListArray(_) => DataType::NvListArray,
        }
    }

    /// Element count stored in the pair header.
    pub fn nelem(&self) -> usize {
        match self {
            Self::Boolean => 0,
            Self::ByteArray(v) | Self::Uint8Array(v) => v.len(),
            Self::BooleanArray(v) => v.len(),
            Self::Int8Array(v) => v.len(),
            Self::Int16Array(v) => v.len(),
            Self::Uint16Array(v) => v.len(),
            Self::Int32Array(v) => v.len(),
            Self::Uint32Array(v) => v.len(),
            Self::Int64Array(v) => v.len(),
            Self::Uint64Array(v) => v.len(),
            Self::StringArray(v) => v.len(),
            Self::NvListArray(v) => v.len(),
            _ => 1,
        }
    }

    /// Size of the value inside an unpacked kernel `nvpair_t`.
    ///
    /// Both encodings carry this number: the kernel allocates and validates
    /// each pair against it, so it must match `i_get_value_size()` exactly.
    pub(crate) fn native_size(&self) -> usize {
        match self {
            Self::Boolean => 0,
            Self::Byte(_) | Self::Int8(_) | Self::Uint8(_) => 1,
            Self::Int16(_) | Self::Uint16(_) => 2,
            Self::BooleanValue(_) | Self::Int32(_) | Self::Uint32(_) => 4,
            Self::Int64(_) | Self::Uint64(_) | Self::Hrtime(_) => 8,
            Self::String(s) => s.len() + 1,
            Self::ByteArray(v) | Self::Uint8Array(v) => v.len(),
            Self::Int8Array(v) => v.len(),
            Self::BooleanArray(v) => v.len() * 4,
            Self::Int16Array(v) => v.len() * 2,
            Self::Uint16Array(v) => v.len() * 2,
            Self::Int32Array(v) => v.len() * 4,
            Self::Uint32Array(v) => v.len() * 4,
            Self::Int64Array(v) => v.len() * 8,
            Self::Uint64Array(v) => v.len() * 8,
            Self::StringArray(v) => v.iter().map(|s| 8 + s.len() + 1).sum(),
            Self::NvList(_) => NVLIST_T_SIZE,
            Self::NvListArray(v) => v.len() * (8 + NVLIST_T_SIZE),
        }
    }
}

/// `sizeof(nvpair_t)`: size, name_sz, reserve, value_elem, type.
pub(crate) const NVPAIR_HEADER_SIZE: usize = 16;

/// `sizeof(nvlist_t)` on 64-bit kernels.
pub(crate) const NVLIST_T_SIZE: usize = 24;

/// Round up to the 8-byte alignment used inside unpacked pairs.
#[inline]
pub(crate) const fn align8(n: usize) -> usize {
    (n + 7) & !7
}

/// Round up to the 4-byte XDR unit.
#[inline]
pub(crate) const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Full `nvp_size` of a pair: header and NUL-terminated name, then the
/// value, each 8-byte aligned.
pub(crate) fn native_pair_size(name: &str, value: &Value) -> usize {
    align8(NVPAIR_HEADER_SIZE + name.len() + 1) + align8(value.native_size())
}

/// Check a key or string for interior NULs.
pub(crate) fn check_c_string(s: &str) -> Result<(), EncodeError> {
    if s.as_bytes().contains(&0) {
        return Err(EncodeError::InteriorNul(s.to_owned()));
    }
    Ok(())
}

// ============================================================================
// NvList
// ============================================================================

/// Ordered list of uniquely named values.
///
/// Lookup is linear; real property lists hold a few dozen entries at most and
/// keeping insertion order makes encoding deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NvList {
    pairs: Vec<(String, Value)>,
}

impl NvList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Insert `value` under `key`, replacing an existing entry in place.
    ///
    /// Returns the previous value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if let Some(slot) = self.get_mut(&key) {
            return Some(std::mem::replace(slot, value));
        }
        self.pairs.push((key, value));
        None
    }

    /// Insert `value` under `key`, failing if the key is already present.
    pub fn try_insert(&mut self, key: impl Into<String>, value: Value) -> Result<(), EncodeError> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(EncodeError::DuplicateKey(key));
        }
        self.pairs.push((key, value));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.pairs
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Remove and return the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let idx = self.pairs.iter().position(|(k, _)| k == key)?;
        Some(self.pairs.remove(idx).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate over `(key, value)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in wire order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    /// Look up a nested list.
    pub fn get_list(&self, key: &str) -> Option<&NvList> {
        match self.get(key) {
            Some(Value::NvList(list)) => Some(list),
            _ => None,
        }
    }

    /// Look up a `uint64` value.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key) {
            Some(Value::Uint64(v)) => Some(*v),
            _ => None,
        }
    }

    /// Look up a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

impl IntoIterator for NvList {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for NvList {
    /// Later duplicates replace earlier ones, like repeated [`NvList::insert`].
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut list = NvList::new();
        for (k, v) in iter {
            let _ = list.insert(k, v);
        }
        list
    }
}

// ---------------------------------------------------------------------------
// serde: introspection dumps (e.g. `serde_json::to_string_pretty(&props)`)
// ---------------------------------------------------------------------------

impl Serialize for NvList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Boolean => serializer.serialize_bool(true),
            Self::BooleanValue(b) => serializer.serialize_bool(*b),
            Self::Byte(v) | Self::Uint8(v) => serializer.serialize_u8(*v),
            Self::Int8(v) => serializer.serialize_i8(*v),
            Self::Int16(v) => serializer.serialize_i16(*v),
            Self::Uint16(v) => serializer.serialize_u16(*v),
            Self::Int32(v) => serializer.serialize_i32(*v),
            Self::Uint32(v) => serializer.serialize_u32(*v),
            Self::Int64(v) | Self::Hrtime(v) => serializer.serialize_i64(*v),
            Self::Uint64(v) => serializer.serialize_u64(*v),
            Self::String(s) => serializer.serialize_str(s),
            Self::ByteArray(v) | Self::Uint8Array(v) => v.serialize(serializer),
            Self::BooleanArray(v) => v.serialize(serializer),
            Self::Int8Array(v) => v.serialize(serializer),
            Self::Int16Array(v) => v.serialize(serializer),
            Self::Uint16Array(v) => v.serialize(serializer),
            Self::Int32Array(v) => v.serialize(serializer),
            Self::Uint32Array(v) => v.serialize(serializer),
            Self::Int64Array(v) => v.serialize(serializer),
            Self::Uint64Array(v) => v.serialize(serializer),
            Self::StringArray(v) => v.serialize(serializer),
            Self::NvList(list) => list.serialize(serializer),
            Self::NvListArray(lists) => {
                let mut seq = serializer.serialize_seq(Some(lists.len()))?;
                for list in lists {
                    seq.serialize_element(list)?;
                }
                seq.end()
            }
        }
    }
}
