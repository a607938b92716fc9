//! # libnvlist
//!
//! Codec for packed name/value lists, the self-describing binary format the
//! ZFS kernel module speaks on its control device.
//!
//! ## Overview
//!
//! | layer | items |
//! |---|---|
//! | value model | [`Value`], [`NvList`], [`DataType`] |
//! | framing | [`pack`], [`unpack`], [`Encoding`] |
//! | typed records | [`Record`], [`nvlist_record!`], [`to_bytes`], [`from_bytes`] |
//!
//! Two encodings are supported. XDR is big-endian and portable; requests
//! use it by default. Native is the kernel's in-memory layout in host byte
//! order and is what comes back in command responses. [`unpack`] reads the
//! stream header and picks the right decoder.
//!
//! ```
//! use libnvlist::{Encoding, NvList, Value, pack, unpack};
//!
//! let mut list = NvList::new();
//! list.insert("ashift", Value::Uint64(12));
//! let bytes = pack(&list, Encoding::Xdr).unwrap();
//! assert_eq!(unpack(&bytes).unwrap(), list);
//! ```

mod buf;
pub mod error;
mod native;
mod pack;
pub mod schema;
mod value;
mod xdr;

pub use error::{DecodeError, EncodeError};
pub use pack::{Encoding, MAX_DEPTH, MAX_NAME_LEN, pack, unpack};
pub use schema::{Directive, FromValue, Record, ToValue};
pub use value::{DataType, NvList, Value};

/// Encode a record with the default (XDR) encoding.
pub fn to_bytes<R: Record>(record: &R) -> Result<Vec<u8>, EncodeError> {
    to_bytes_with(record, Encoding::default())
}

/// Encode a record with an explicit encoding.
pub fn to_bytes_with<R: Record>(record: &R, encoding: Encoding) -> Result<Vec<u8>, EncodeError> {
    pack(&record.to_nvlist()?, encoding)
}

/// Decode a record from either encoding.
pub fn from_bytes<R: Record>(bytes: &[u8]) -> Result<R, DecodeError> {
    R::from_nvlist(unpack(bytes)?)
}
