//! Native encoding: the unpacked kernel structures copied byte for byte.
//!
//! ```text
//! list: i32 version | u32 nvflag | nvpair* | i32 0
//!
//! nvpair (nvp_size bytes, 8-byte aligned):
//!   i32 nvp_size | i16 name_sz | i16 reserve | i32 nelem | i32 type
//!   | name NUL (pad 8) | value area (pad 8)
//! ```
//!
//! Embedded lists are written right after the pair that owns them. Pointer
//! slots inside value areas (string arrays, nvlist arrays, `nvl_priv`) are
//! zeroed. This is what the kernel returns in `zc_nvlist_dst`.

use crate::buf::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::pack::{
    NV_UNIQUE_NAME, NV_VERSION, check_depth, check_name, check_version, expect_nelem, read_count,
    utf8, wire_i32,
};
use crate::value::{
    DataType, NVLIST_T_SIZE, NVPAIR_HEADER_SIZE, NvList, Value, align8, check_c_string,
    native_pair_size,
};

// ============================================================================
// Encode
// ============================================================================

pub(crate) fn encode_list(w: &mut Writer, list: &NvList) -> Result<(), EncodeError> {
    w.i32(NV_VERSION);
    w.u32(NV_UNIQUE_NAME);
    for (name, value) in list.iter() {
        encode_pair(w, name, value)?;
    }
    w.i32(0);
    Ok(())
}

fn encode_pair(w: &mut Writer, name: &str, value: &Value) -> Result<(), EncodeError> {
    check_name(name)?;

    let size = native_pair_size(name, value);
    let start = w.len();
    w.i32(wire_i32(name, size)?);
    w.i16((name.len() + 1) as i16);
    w.i16(0);
    w.i32(wire_i32(name, value.nelem())?);
    w.i32(value.data_type().as_i32());
    w.bytes(name.as_bytes());
    w.u8(0);
    w.pad_from(start, 8);

    encode_value_area(w, value)?;
    w.pad_from(start, 8);
    debug_assert_eq!(w.len() - start, size, "nvp_size disagrees for {name:?}");

    match value {
        Value::NvList(list) => encode_list(w, list)?,
        Value::NvListArray(lists) => {
            for list in lists {
                encode_list(w, list)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Packed `nvlist_t` with the private pointer cleared.
fn put_nvlist_header(w: &mut Writer) {
    w.i32(NV_VERSION);
    w.u32(NV_UNIQUE_NAME);
    w.u64(0);
    w.u32(0);
    w.i32(0);
}

fn encode_value_area(w: &mut Writer, value: &Value) -> Result<(), EncodeError> {
    match value {
        Value::Boolean => {}
        Value::BooleanValue(b) => w.i32(i32::from(*b)),
        Value::Byte(v) | Value::Uint8(v) => w.u8(*v),
        Value::Int8(v) => w.i8(*v),
        Value::Int16(v) => w.i16(*v),
        Value::Uint16(v) => w.u16(*v),
        Value::Int32(v) => w.i32(*v),
        Value::Uint32(v) => w.u32(*v),
        Value::Int64(v) | Value::Hrtime(v) => w.i64(*v),
        Value::Uint64(v) => w.u64(*v),
        Value::String(s) => {
            check_c_string(s)?;
            w.bytes(s.as_bytes());
            w.u8(0);
        }
        Value::ByteArray(v) | Value::Uint8Array(v) => w.bytes(v),
        Value::BooleanArray(v) => v.iter().for_each(|b| w.i32(i32::from(*b))),
        Value::Int8Array(v) => v.iter().for_each(|x| w.i8(*x)),
        Value::Int16Array(v) => v.iter().for_each(|x| w.i16(*x)),
        Value::Uint16Array(v) => v.iter().for_each(|x| w.u16(*x)),
        Value::Int32Array(v) => v.iter().for_each(|x| w.i32(*x)),
        Value::Uint32Array(v) => v.iter().for_each(|x| w.u32(*x)),
        Value::Int64Array(v) => v.iter().for_each(|x| w.i64(*x)),
        Value::Uint64Array(v) => v.iter().for_each(|x| w.u64(*x)),
        Value::StringArray(v) => {
            w.zeros(8 * v.len());
            for s in v {
                check_c_string(s)?;
                w.bytes(s.as_bytes());
                w.u8(0);
            }
        }
        Value::NvList(_) => put_nvlist_header(w),
        Value::NvListArray(lists) => {
            w.zeros(8 * lists.len());
            lists.iter().for_each(|_| put_nvlist_header(w));
        }
    }
    Ok(())
}

// ============================================================================
// Decode
// ============================================================================

pub(crate) fn decode_list(r: &mut Reader<'_>, depth: usize) -> Result<NvList, DecodeError> {
    check_depth(depth)?;
    check_version(r.i32()?)?;
    let _nvflag = r.u32()?;

    let mut list = NvList::new();
    loop {
        let start = r.pos();
        let size = read_count(r, "pair size")?;
        if size == 0 {
            break;
        }
        if size < NVPAIR_HEADER_SIZE {
            return Err(DecodeError::Malformed(format!(
                "pair at offset {start} claims {size} bytes"
            )));
        }
        r.ensure(size - 4)?;

        let name_sz = r.i16()?;
        let _reserve = r.i16()?;
        let nelem = read_count(r, "element count")?;
        let tag = r.i32()?;

        let name_sz = usize::try_from(name_sz)
            .ok()
            .filter(|n| *n >= 1 && align8(NVPAIR_HEADER_SIZE + n) <= size)
            .ok_or_else(|| {
                DecodeError::Malformed(format!("bad name size {name_sz} at offset {start}"))
            })?;
        let raw_name = r.take(name_sz)?;
        let name = match raw_name.split_last() {
            Some((0, name)) => {
                utf8(name).map_err(|_| DecodeError::InvalidUtf8("<pair name>".into()))?
            }
            _ => {
                return Err(DecodeError::Malformed(format!(
                    "unterminated pair name at offset {start}"
                )));
            }
        };

        let ty = DataType::from_i32(tag).ok_or_else(|| DecodeError::UnknownDataType {
            key: name.clone(),
            tag,
        })?;

        r.seek(start + align8(NVPAIR_HEADER_SIZE + name_sz))?;
        let area = r.take(start + size - r.pos())?;
        let mut v = Reader::new(area, 0, r.big_endian());
        let value = decode_value(&mut v, r, ty, nelem, depth).map_err(|e| e.with_key(&name))?;

        list.insert(name, value);
    }
    Ok(list)
}

/// Check that `nelem` elements of `width` bytes fit in the value area.
fn fits(v: &Reader<'_>, nelem: usize, width: usize) -> Result<(), DecodeError> {
    if nelem.saturating_mul(width) > v.remaining() {
        return Err(DecodeError::LengthMismatch {
            key: String::new(),
            declared: nelem,
            actual: v.remaining() / width,
        });
    }
    Ok(())
}

fn get_vec<T>(
    v: &mut Reader<'_>,
    nelem: usize,
    width: usize,
    mut read: impl FnMut(&mut Reader<'_>) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    fits(v, nelem, width)?;
    let mut out = Vec::with_capacity(nelem);
    for _ in 0..nelem {
        out.push(read(v)?);
    }
    Ok(out)
}

/// Read a NUL-terminated string from the value area.
fn get_c_string(v: &mut Reader<'_>) -> Result<String, DecodeError> {
    let rest = v.take(v.remaining())?;
    let len = rest
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| DecodeError::Malformed("unterminated string value".into()))?;
    let s = utf8(&rest[..len])?;
    // Give back everything after the terminator.
    v.seek(v.pos() - rest.len() + len + 1)?;
    Ok(s)
}

/// `v` covers the pair's value area; `outer` continues after the pair and
/// is where embedded lists live.
fn decode_value(
    v: &mut Reader<'_>,
    outer: &mut Reader<'_>,
    ty: DataType,
    nelem: usize,
    depth: usize,
) -> Result<Value, DecodeError> {
    let scalar = |expected| expect_nelem(nelem, expected);
    let value = match ty {
        DataType::Boolean => {
            scalar(0)?;
            Value::Boolean
        }
        DataType::BooleanValue => {
            scalar(1)?;
            Value::BooleanValue(v.i32()? != 0)
        }
        DataType::Byte => {
            scalar(1)?;
            Value::Byte(v.u8()?)
        }
        DataType::Int8 => {
            scalar(1)?;
            Value::Int8(v.i8()?)
        }
        DataType::Uint8 => {
            scalar(1)?;
            Value::Uint8(v.u8()?)
        }
        DataType::Int16 => {
            scalar(1)?;
            Value::Int16(v.i16()?)
        }
        DataType::Uint16 => {
            scalar(1)?;
            Value::Uint16(v.u16()?)
        }
        DataType::Int32 => {
            scalar(1)?;
            Value::Int32(v.i32()?)
        }
        DataType::Uint32 => {
            scalar(1)?;
            Value::Uint32(v.u32()?)
        }
        DataType::Int64 => {
            scalar(1)?;
            Value::Int64(v.i64()?)
        }
        DataType::Uint64 => {
            scalar(1)?;
            Value::Uint64(v.u64()?)
        }
        DataType::Hrtime => {
            scalar(1)?;
            Value::Hrtime(v.i64()?)
        }
        DataType::String => {
            scalar(1)?;
            Value::String(get_c_string(v)?)
        }
        DataType::ByteArray => {
            fits(v, nelem, 1)?;
            Value::ByteArray(v.take(nelem)?.to_vec())
        }
        DataType::Uint8Array => {
            fits(v, nelem, 1)?;
            Value::Uint8Array(v.take(nelem)?.to_vec())
        }
        DataType::BooleanArray => {
            Value::BooleanArray(get_vec(v, nelem, 4, |v| Ok(v.i32()? != 0))?)
        }
        DataType::Int8Array => Value::Int8Array(get_vec(v, nelem, 1, |v| v.i8())?),
        DataType::Int16Array => Value::Int16Array(get_vec(v, nelem, 2, |v| v.i16())?),
        DataType::Uint16Array => Value::Uint16Array(get_vec(v, nelem, 2, |v| v.u16())?),
        DataType::Int32Array => Value::Int32Array(get_vec(v, nelem, 4, |v| v.i32())?),
        DataType::Uint32Array => Value::Uint32Array(get_vec(v, nelem, 4, |v| v.u32())?),
        DataType::Int64Array => Value::Int64Array(get_vec(v, nelem, 8, |v| v.i64())?),
        DataType::Uint64Array => Value::Uint64Array(get_vec(v, nelem, 8, |v| v.u64())?),
        DataType::StringArray => {
            // Pointer slot plus at least a terminator per element.
            fits(v, nelem, 9)?;
            v.skip(8 * nelem)?;
            let mut out = Vec::with_capacity(nelem);
            for _ in 0..nelem {
                out.push(get_c_string(v)?);
            }
            Value::StringArray(out)
        }
        DataType::NvList => {
            scalar(1)?;
            fits(v, 1, NVLIST_T_SIZE)?;
            Value::NvList(decode_list(outer, depth + 1)?)
        }
        DataType::NvListArray => {
            fits(v, nelem, 8 + NVLIST_T_SIZE)?;
            let mut out = Vec::with_capacity(nelem);
            for _ in 0..nelem {
                out.push(decode_list(outer, depth + 1)?);
            }
            Value::NvListArray(out)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{Encoding, pack, unpack};

    fn le() -> bool {
        cfg!(target_endian = "little")
    }

    #[test]
    fn single_uint64_layout() {
        let list: NvList = [("a", Value::Uint64(1))].into_iter().collect();
        let bytes = pack(&list, Encoding::Native).unwrap();
        assert_eq!(bytes.len(), 4 + 8 + 32 + 4);

        let mut r = Reader::new(&bytes, 12, !le());
        assert_eq!(r.i32().unwrap(), 32); // nvp_size
        assert_eq!(r.i16().unwrap(), 2); // "a\0"
        assert_eq!(r.i16().unwrap(), 0);
        assert_eq!(r.i32().unwrap(), 1);
        assert_eq!(r.i32().unwrap(), DataType::Uint64.as_i32());
        assert_eq!(r.take(8).unwrap(), b"a\0\0\0\0\0\0\0");
        assert_eq!(r.u64().unwrap(), 1);
        assert_eq!(r.i32().unwrap(), 0); // terminator
    }

    #[test]
    fn embedded_list_follows_pair() {
        let inner: NvList = [("s", Value::String("ab".into()))].into_iter().collect();
        let outer: NvList = [("t", Value::NvList(inner.clone()))].into_iter().collect();
        let bytes = pack(&outer, Encoding::Native).unwrap();

        // outer pair 48, inner list 8 + 32 + 4, outer terminator 4
        assert_eq!(bytes.len(), 4 + 8 + 48 + 44 + 4);
        let mut r = Reader::new(&bytes, 12 + 48, !le());
        assert_eq!(decode_list(&mut r, 1).unwrap(), inner);
        assert_eq!(unpack(&bytes).unwrap(), outer);
    }

    #[test]
    fn string_array_skips_pointer_slots() {
        let list: NvList = [(
            "paths",
            Value::StringArray(vec!["/dev/sda".into(), String::new(), "x".into()]),
        )]
        .into_iter()
        .collect();
        let bytes = pack(&list, Encoding::Native).unwrap();
        assert_eq!(unpack(&bytes).unwrap(), list);
    }

    #[test]
    fn undersized_value_area_is_length_mismatch() {
        let list: NvList = [("v", Value::Uint32Array(vec![1, 2]))].into_iter().collect();
        let mut bytes = pack(&list, Encoding::Native).unwrap();
        // nelem lives 8 bytes into the pair header.
        let at = 12 + 8;
        let patched = if le() { 5i32.to_le_bytes() } else { 5i32.to_be_bytes() };
        bytes[at..at + 4].copy_from_slice(&patched);
        assert_eq!(
            unpack(&bytes).unwrap_err(),
            DecodeError::LengthMismatch {
                key: "v".into(),
                declared: 5,
                actual: 2,
            }
        );
    }

    #[test]
    fn foreign_byte_order_decodes() {
        // Big-endian native stream for {"n": Int32(-2)} built by hand.
        #[rustfmt::skip]
        let bytes: Vec<u8> = vec![
            0, 0, 0, 0,                 // native, big-endian
            0, 0, 0, 0, 0, 0, 0, 1,     // version, nvflag
            0, 0, 0, 32, 0, 2, 0, 0,    // nvp_size, name_sz, reserve
            0, 0, 0, 1, 0, 0, 0, 5,     // nelem, INT32
            b'n', 0, 0, 0, 0, 0, 0, 0,
            0xff, 0xff, 0xff, 0xfe, 0, 0, 0, 0,
            0, 0, 0, 0,
        ];
        let list = unpack(&bytes).unwrap();
        assert_eq!(list.get("n"), Some(&Value::Int32(-2)));
    }
}
