//! Typed records on top of [`NvList`].
//!
//! A record is a plain struct whose fields map to wire keys through a
//! static table of [`Directive`]s. The table is generated by
//! [`nvlist_record!`](crate::nvlist_record), which also emits the
//! [`Record`], [`ToValue`], [`FromValue`] and [`ArrayElement`] impls:
//!
//! ```
//! use std::collections::HashMap;
//! use libnvlist::nvlist_record;
//!
//! nvlist_record! {
//!     #[derive(Debug, Default, Clone, PartialEq)]
//!     pub struct Props {
//!         pub comment: String => "comment" [omitempty],
//!         pub ashift: u64 => "ashift" [omitempty],
//!         pub size: u64 => "size" [ro],
//!         ..pub user: HashMap<String, String>,
//!     }
//! }
//! ```
//!
//! | flag | effect |
//! |---|---|
//! | `omitempty` | skip the field on encode while it holds its zero value |
//! | `ro` | never encoded, filled on decode |
//! | `..field` | catch-all: unclaimed keys on decode, extra keys on encode |
//!
//! Attributes of the catch-all field, doc comments included, go after the
//! `..` marker.
//!
//! Fields without `=> "key"` use the field name. Absent keys decode to the
//! field type's `Default`. Wire values must match the field type exactly;
//! `Uint32` is never accepted for a `u64` field.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::error::{DecodeError, EncodeError};
use crate::value::{DataType, NvList, Value};

/// Directive flag bits.
pub mod flag {
    pub const OMITEMPTY: u8 = 0x1;
    pub const RO: u8 = 0x2;
    pub const EXTRA: u8 = 0x4;
}

/// Serialization rule for one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    /// Rust field name.
    pub field: &'static str,
    /// Wire key; empty means the field name.
    pub name: &'static str,
    pub flags: u8,
}

impl Directive {
    pub const fn new(field: &'static str, name: &'static str, flags: u8) -> Self {
        Self { field, name, flags }
    }

    /// Directive for the catch-all map field.
    pub const fn catch_all(field: &'static str) -> Self {
        Self::new(field, "", flag::EXTRA)
    }

    /// Resolved wire key.
    pub const fn key(&self) -> &'static str {
        if self.name.is_empty() {
            self.field
        } else {
            self.name
        }
    }

    pub const fn omit_empty(&self) -> bool {
        self.flags & flag::OMITEMPTY != 0
    }

    pub const fn read_only(&self) -> bool {
        self.flags & flag::RO != 0
    }

    pub const fn is_extra(&self) -> bool {
        self.flags & flag::EXTRA != 0
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A native aggregate that maps to one nested list.
pub trait Record: Sized {
    /// Field directives in encode order, catch-all last.
    fn schema() -> &'static [Directive];

    fn to_nvlist(&self) -> Result<NvList, EncodeError>;

    fn from_nvlist(list: NvList) -> Result<Self, DecodeError>;
}

/// Conversion of a field value into a wire value.
pub trait ToValue {
    /// `Ok(None)` means there is nothing to put on the wire.
    fn to_value(&self) -> Result<Option<Value>, EncodeError>;

    /// Whether `omitempty` drops this value.
    fn is_zero(&self) -> bool {
        false
    }

    /// What an unset `Option<Self>` encodes to when it is not `omitempty`.
    fn absent_value() -> Option<Value>
    where
        Self: Sized,
    {
        None
    }
}

/// Conversion of a wire value into a field value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, DecodeError>;
}

/// Element types that have a homogeneous array representation.
pub trait ArrayElement: Sized {
    fn array_value(items: &[Self]) -> Result<Value, EncodeError>;

    fn from_array(value: Value) -> Result<Vec<Self>, DecodeError>;
}

/// Types usable as a catch-all field.
pub trait ExtraFields: Default {
    /// Entries emitted as extra top-level keys.
    fn extra_entries(&self) -> Result<Vec<(String, Value)>, EncodeError>;

    /// Take ownership of one unclaimed key.
    fn absorb(&mut self, key: String, value: Value) -> Result<(), DecodeError>;
}

/// Error for a wire value that does not fit the native type.
pub fn mismatch(expected: DataType, found: &Value) -> DecodeError {
    DecodeError::TypeMismatch {
        key: String::new(),
        expected,
        found: found.data_type(),
    }
}

// ============================================================================
// Field helpers used by generated code
// ============================================================================

/// Encode one field according to its directive.
pub fn encode_field<T: ToValue + ?Sized>(
    list: &mut NvList,
    directive: &Directive,
    value: &T,
) -> Result<(), EncodeError> {
    if directive.read_only() || (directive.omit_empty() && value.is_zero()) {
        return Ok(());
    }
    match value.to_value()? {
        Some(v) => list.try_insert(directive.key(), v),
        None => Ok(()),
    }
}

/// Append catch-all entries after the named fields.
pub fn encode_extra<T: ExtraFields>(list: &mut NvList, extra: &T) -> Result<(), EncodeError> {
    for (key, value) in extra.extra_entries()? {
        list.try_insert(key, value)?;
    }
    Ok(())
}

/// Remove the field's key from `list` and decode it.
pub fn decode_field<T: FromValue + Default>(
    list: &mut NvList,
    directive: &Directive,
) -> Result<T, DecodeError> {
    let key = directive.key();
    match list.remove(key) {
        Some(v) => T::from_value(v).map_err(|e| e.with_key(key)),
        None => Ok(T::default()),
    }
}

/// Move every key still in `list` into the catch-all.
pub fn decode_extra<T: ExtraFields>(list: &mut NvList) -> Result<T, DecodeError> {
    let mut extra = T::default();
    for (key, value) in std::mem::take(list) {
        extra.absorb(key, value)?;
    }
    Ok(extra)
}

/// Drop keys no field claimed.
pub fn discard_unclaimed<R>(list: NvList) {
    for (key, value) in list {
        trace!(
            record = std::any::type_name::<R>(),
            key = %key,
            ty = %value.data_type(),
            "discarding unclaimed nvlist key"
        );
    }
}

// ============================================================================
// Scalar impls
// ============================================================================

macro_rules! int_impls {
    ($($ty:ty => $variant:ident, $array:ident;)*) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Result<Option<Value>, EncodeError> {
                    Ok(Some(Value::$variant(*self)))
                }

                fn is_zero(&self) -> bool {
                    *self == 0
                }
            }

            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self, DecodeError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(mismatch(DataType::$variant, &other)),
                    }
                }
            }

            impl ArrayElement for $ty {
                fn array_value(items: &[Self]) -> Result<Value, EncodeError> {
                    Ok(Value::$array(items.to_vec()))
                }

                fn from_array(value: Value) -> Result<Vec<Self>, DecodeError> {
                    match value {
                        Value::$array(v) => Ok(v),
                        other => Err(mismatch(DataType::$array, &other)),
                    }
                }
            }
        )*
    };
}

int_impls! {
    i8 => Int8, Int8Array;
    i16 => Int16, Int16Array;
    u16 => Uint16, Uint16Array;
    i32 => Int32, Int32Array;
    u32 => Uint32, Uint32Array;
    i64 => Int64, Int64Array;
    u64 => Uint64, Uint64Array;
}

// BYTE and UINT8 share width and signedness; both decode into `u8`.
impl ToValue for u8 {
    fn to_value(&self) -> Result<Option<Value>, EncodeError> {
        Ok(Some(Value::Uint8(*self)))
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl FromValue for u8 {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Uint8(v) | Value::Byte(v) => Ok(v),
            other => Err(mismatch(DataType::Uint8, &other)),
        }
    }
}

impl ArrayElement for u8 {
    fn array_value(items: &[Self]) -> Result<Value, EncodeError> {
        Ok(Value::Uint8Array(items.to_vec()))
    }

    fn from_array(value: Value) -> Result<Vec<Self>, DecodeError> {
        match value {
            Value::Uint8Array(v) | Value::ByteArray(v) => Ok(v),
            other => Err(mismatch(DataType::Uint8Array, &other)),
        }
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Result<Option<Value>, EncodeError> {
        Ok(Some(Value::BooleanValue(*self)))
    }

    fn is_zero(&self) -> bool {
        !*self
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::BooleanValue(b) => Ok(b),
            // A presence flag is a set boolean.
            Value::Boolean => Ok(true),
            other => Err(mismatch(DataType::BooleanValue, &other)),
        }
    }
}

impl ArrayElement for bool {
    fn array_value(items: &[Self]) -> Result<Value, EncodeError> {
        Ok(Value::BooleanArray(items.to_vec()))
    }

    fn from_array(value: Value) -> Result<Vec<Self>, DecodeError> {
        match value {
            Value::BooleanArray(v) => Ok(v),
            other => Err(mismatch(DataType::BooleanArray, &other)),
        }
    }
}

impl ToValue for String {
    fn to_value(&self) -> Result<Option<Value>, EncodeError> {
        Ok(Some(Value::String(self.clone())))
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl ToValue for str {
    fn to_value(&self) -> Result<Option<Value>, EncodeError> {
        Ok(Some(Value::String(self.to_owned())))
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch(DataType::String, &other)),
        }
    }
}

impl ArrayElement for String {
    fn array_value(items: &[Self]) -> Result<Value, EncodeError> {
        Ok(Value::StringArray(items.to_vec()))
    }

    fn from_array(value: Value) -> Result<Vec<Self>, DecodeError> {
        match value {
            Value::StringArray(v) => Ok(v),
            other => Err(mismatch(DataType::StringArray, &other)),
        }
    }
}

// ============================================================================
// Containers
// ============================================================================

impl<T: ArrayElement> ToValue for Vec<T> {
    fn to_value(&self) -> Result<Option<Value>, EncodeError> {
        T::array_value(self).map(Some)
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<T: ArrayElement> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        T::from_array(value)
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Result<Option<Value>, EncodeError> {
        match self {
            Some(v) => v.to_value(),
            None => Ok(T::absent_value()),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        T::from_value(value).map(Some)
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Result<Option<Value>, EncodeError> {
        (**self).to_value()
    }

    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

fn map_from_list<M, V>(list: NvList) -> Result<M, DecodeError>
where
    M: FromIterator<(String, V)>,
    V: FromValue,
{
    list.into_iter()
        .map(|(key, value)| {
            let v = V::from_value(value).map_err(|e| e.with_key(&key))?;
            Ok((key, v))
        })
        .collect()
}

macro_rules! map_impls {
    ($($map:ident),*) => {
        $(
            impl<V: ToValue> ToValue for $map<String, V> {
                fn to_value(&self) -> Result<Option<Value>, EncodeError> {
                    let mut list = NvList::new();
                    for (key, value) in self {
                        if let Some(v) = value.to_value()? {
                            list.try_insert(key.clone(), v)?;
                        }
                    }
                    Ok(Some(Value::NvList(list)))
                }

                fn is_zero(&self) -> bool {
                    self.is_empty()
                }

                fn absent_value() -> Option<Value> {
                    Some(Value::NvList(NvList::new()))
                }
            }

            impl<V: FromValue> FromValue for $map<String, V> {
                fn from_value(value: Value) -> Result<Self, DecodeError> {
                    match value {
                        Value::NvList(list) => map_from_list(list),
                        other => Err(mismatch(DataType::NvList, &other)),
                    }
                }
            }

            impl<V: ToValue + FromValue> Record for $map<String, V> {
                fn schema() -> &'static [Directive] {
                    &[]
                }

                fn to_nvlist(&self) -> Result<NvList, EncodeError> {
                    let mut list = NvList::new();
                    encode_extra(&mut list, self)?;
                    Ok(list)
                }

                fn from_nvlist(list: NvList) -> Result<Self, DecodeError> {
                    map_from_list(list)
                }
            }

            impl<V: ToValue + FromValue> ExtraFields for $map<String, V> {
                fn extra_entries(&self) -> Result<Vec<(String, Value)>, EncodeError> {
                    let mut out = Vec::with_capacity(self.len());
                    for (key, value) in self {
                        if let Some(v) = value.to_value()? {
                            out.push((key.clone(), v));
                        }
                    }
                    Ok(out)
                }

                fn absorb(&mut self, key: String, value: Value) -> Result<(), DecodeError> {
                    let v = V::from_value(value).map_err(|e| e.with_key(&key))?;
                    self.insert(key, v);
                    Ok(())
                }
            }
        )*
    };
}

map_impls!(HashMap, BTreeMap);

// ============================================================================
// Dynamic targets
// ============================================================================

impl ToValue for NvList {
    fn to_value(&self) -> Result<Option<Value>, EncodeError> {
        Ok(Some(Value::NvList(self.clone())))
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn absent_value() -> Option<Value> {
        Some(Value::NvList(NvList::new()))
    }
}

impl FromValue for NvList {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::NvList(list) => Ok(list),
            other => Err(mismatch(DataType::NvList, &other)),
        }
    }
}

impl ArrayElement for NvList {
    fn array_value(items: &[Self]) -> Result<Value, EncodeError> {
        Ok(Value::NvListArray(items.to_vec()))
    }

    fn from_array(value: Value) -> Result<Vec<Self>, DecodeError> {
        match value {
            Value::NvListArray(v) => Ok(v),
            other => Err(mismatch(DataType::NvListArray, &other)),
        }
    }
}

impl Record for NvList {
    fn schema() -> &'static [Directive] {
        &[]
    }

    fn to_nvlist(&self) -> Result<NvList, EncodeError> {
        Ok(self.clone())
    }

    fn from_nvlist(list: NvList) -> Result<Self, DecodeError> {
        Ok(list)
    }
}

impl ExtraFields for NvList {
    fn extra_entries(&self) -> Result<Vec<(String, Value)>, EncodeError> {
        Ok(self
            .iter()
            .map(|(k, v)| (k.to_owned(), v.clone()))
            .collect())
    }

    fn absorb(&mut self, key: String, value: Value) -> Result<(), DecodeError> {
        self.insert(key, value);
        Ok(())
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Result<Option<Value>, EncodeError> {
        Ok(Some(self.clone()))
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

/// The empty record: encodes to an empty list, ignores every key.
impl Record for () {
    fn schema() -> &'static [Directive] {
        &[]
    }

    fn to_nvlist(&self) -> Result<NvList, EncodeError> {
        Ok(NvList::new())
    }

    fn from_nvlist(list: NvList) -> Result<Self, DecodeError> {
        discard_unclaimed::<()>(list);
        Ok(())
    }
}

// ============================================================================
// Record macro
// ============================================================================

/// Declare a struct together with its wire schema.
///
/// See the [module documentation](crate::schema) for the field syntax.
/// Every field type must implement `Default`; records used as nested
/// fields must therefore derive it.
#[macro_export]
macro_rules! nvlist_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                pub $field:ident : $ty:ty $(=> $key:literal)? $([$($flag:ident),* $(,)?])? ,
            )*
            $(
                ..
                $(#[$emeta:meta])*
                pub $extra:ident : $ety:ty ,
            )?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
            $(
                $(#[$emeta])*
                pub $extra: $ety,
            )?
        }

        impl $crate::schema::Record for $name {
            fn schema() -> &'static [$crate::schema::Directive] {
                const SCHEMA: &[$crate::schema::Directive] = &[
                    $(
                        $crate::__nvlist_directive!(
                            $field, [$($key)?], [$($($flag)*)?]
                        ),
                    )*
                    $( $crate::schema::Directive::catch_all(stringify!($extra)), )?
                ];
                SCHEMA
            }

            fn to_nvlist(&self) -> ::std::result::Result<$crate::NvList, $crate::EncodeError> {
                let mut list = $crate::NvList::new();
                $(
                    $crate::schema::encode_field(
                        &mut list,
                        &$crate::__nvlist_directive!($field, [$($key)?], [$($($flag)*)?]),
                        &self.$field,
                    )?;
                )*
                $( $crate::schema::encode_extra(&mut list, &self.$extra)?; )?
                Ok(list)
            }

            fn from_nvlist(
                mut list: $crate::NvList,
            ) -> ::std::result::Result<Self, $crate::DecodeError> {
                let record = Self {
                    $(
                        $field: $crate::schema::decode_field(
                            &mut list,
                            &$crate::__nvlist_directive!($field, [$($key)?], [$($($flag)*)?]),
                        )?,
                    )*
                    $( $extra: $crate::schema::decode_extra(&mut list)?, )?
                };
                $crate::schema::discard_unclaimed::<Self>(list);
                Ok(record)
            }
        }

        impl $crate::schema::ToValue for $name {
            fn to_value(
                &self,
            ) -> ::std::result::Result<::std::option::Option<$crate::Value>, $crate::EncodeError> {
                $crate::schema::Record::to_nvlist(self)
                    .map(|list| ::std::option::Option::Some($crate::Value::NvList(list)))
            }

            fn absent_value() -> ::std::option::Option<$crate::Value> {
                ::std::option::Option::Some($crate::Value::NvList($crate::NvList::new()))
            }
        }

        impl $crate::schema::FromValue for $name {
            fn from_value(value: $crate::Value) -> ::std::result::Result<Self, $crate::DecodeError> {
                match value {
                    $crate::Value::NvList(list) => {
                        <Self as $crate::schema::Record>::from_nvlist(list)
                    }
                    other => Err($crate::schema::mismatch($crate::DataType::NvList, &other)),
                }
            }
        }

        impl $crate::schema::ArrayElement for $name {
            fn array_value(
                items: &[Self],
            ) -> ::std::result::Result<$crate::Value, $crate::EncodeError> {
                items
                    .iter()
                    .map($crate::schema::Record::to_nvlist)
                    .collect::<::std::result::Result<::std::vec::Vec<_>, _>>()
                    .map($crate::Value::NvListArray)
            }

            fn from_array(
                value: $crate::Value,
            ) -> ::std::result::Result<::std::vec::Vec<Self>, $crate::DecodeError> {
                match value {
                    $crate::Value::NvListArray(lists) => lists
                        .into_iter()
                        .map(<Self as $crate::schema::Record>::from_nvlist)
                        .collect(),
                    other => Err($crate::schema::mismatch($crate::DataType::NvListArray, &other)),
                }
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __nvlist_directive {
    ($field:ident, [$($key:literal)?], [$($flag:ident)*]) => {
        $crate::schema::Directive::new(
            stringify!($field),
            $crate::__nvlist_name!($($key)?),
            0 $( | $crate::__nvlist_flag!($flag) )*,
        )
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __nvlist_name {
    () => {
        ""
    };
    ($key:literal) => {
        $key
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __nvlist_flag {
    (omitempty) => {
        $crate::schema::flag::OMITEMPTY
    };
    (ro) => {
        $crate::schema::flag::RO
    };
    ($other:ident) => {
        compile_error!(concat!(
            "unknown nvlist directive `",
            stringify!($other),
            "`; expected `omitempty` or `ro`"
        ))
    };
}
