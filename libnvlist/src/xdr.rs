//! XDR encoding of packed nvlists.
//!
//! Layout of one list (all fields big-endian, 4-byte aligned):
//!
//! ```text
//! i32 version | u32 nvflag | pair* | i32 0 | i32 0
//!
//! pair: i32 encoded_size | i32 decoded_size | string name
//!       | i32 type | i32 nelem | value
//! ```
//!
//! `encoded_size` covers the whole pair including embedded lists;
//! `decoded_size` is the size of the unpacked kernel `nvpair_t`, which the
//! kernel uses to pre-allocate. Sub-word integers travel as full 4-byte
//! words, byte arrays as padded opaque data, other arrays with an explicit
//! element count.

use crate::buf::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::pack::{
    NV_UNIQUE_NAME, NV_VERSION, check_depth, check_name, check_version, expect_nelem, read_count,
    utf8, wire_i32,
};
use crate::value::{DataType, NvList, Value, align4, check_c_string, native_pair_size};

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
    w.i32(0);
    Ok(())
}

fn encode_pair(w: &mut Writer, name: &str, value: &Value) -> Result<(), EncodeError> {
    check_name(name)?;

    let start = w.len();
    w.i32(0);
    w.i32(wire_i32(name, native_pair_size(name, value))?);
    put_string(w, name)?;
    w.i32(value.data_type().as_i32());
    w.i32(wire_i32(name, value.nelem())?);
    encode_value(w, value)?;

    let encoded = wire_i32(name, w.len() - start)?;
    w.patch_i32(start, encoded);
    Ok(())
}

fn put_string(w: &mut Writer, s: &str) -> Result<(), EncodeError> {
    w.u32(wire_i32(s, s.len())? as u32);
    w.bytes(s.as_bytes());
    w.pad_to(4);
    Ok(())
}

/// Count prefix of an `xdr_array`; already range-checked through `nelem`.
fn put_count(w: &mut Writer, n: usize) {
    w.u32(n as u32);
}

fn encode_value(w: &mut Writer, value: &Value) -> Result<(), EncodeError> {
    match value {
        Value::Boolean => {}
        Value::BooleanValue(b) => w.i32(i32::from(*b)),
        // xdr_char sign-extends, xdr_u_char does not.
        Value::Byte(v) => w.i32(i32::from(*v as i8)),
        Value::Int8(v) => w.i32(i32::from(*v)),
        Value::Uint8(v) => w.u32(u32::from(*v)),
        Value::Int16(v) => w.i32(i32::from(*v)),
        Value::Uint16(v) => w.u32(u32::from(*v)),
        Value::Int32(v) => w.i32(*v),
        Value::Uint32(v) => w.u32(*v),
        Value::Int64(v) | Value::Hrtime(v) => w.i64(*v),
        Value::Uint64(v) => w.u64(*v),
        Value::String(s) => {
            check_c_string(s)?;
            put_string(w, s)?;
        }
        Value::ByteArray(v) => {
            w.bytes(v);
            w.pad_to(4);
        }
        Value::BooleanArray(v) => {
            put_count(w, v.len());
            v.iter().for_each(|b| w.i32(i32::from(*b)));
        }
        Value::Int8Array(v) => {
            put_count(w, v.len());
            v.iter().for_each(|x| w.i32(i32::from(*x)));
        }
        // Counted array of xdr_u_char, not opaque bytes.
        Value::Uint8Array(v) => {
            put_count(w, v.len());
            v.iter().for_each(|x| w.u32(u32::from(*x)));
        }
        Value::Int16Array(v) => {
            put_count(w, v.len());
            v.iter().for_each(|x| w.i32(i32::from(*x)));
        }
        Value::Uint16Array(v) => {
            put_count(w, v.len());
            v.iter().for_each(|x| w.u32(u32::from(*x)));
        }
        Value::Int32Array(v) => {
            put_count(w, v.len());
            v.iter().for_each(|x| w.i32(*x));
        }
        Value::Uint32Array(v) => {
            put_count(w, v.len());
            v.iter().for_each(|x| w.u32(*x));
        }
        Value::Int64Array(v) => {
            put_count(w, v.len());
            v.iter().for_each(|x| w.i64(*x));
        }
        Value::Uint64Array(v) => {
            put_count(w, v.len());
            v.iter().for_each(|x| w.u64(*x));
        }
        Value::StringArray(v) => {
            for s in v {
                check_c_string(s)?;
                put_string(w, s)?;
            }
        }
        Value::NvList(list) => encode_list(w, list)?,
        Value::NvListArray(lists) => {
            for list in lists {
                encode_list(w, list)?;
            }
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
        let encoded = r.i32()?;
        let decoded = r.i32()?;
        if encoded == 0 && decoded == 0 {
            break;
        }
        if encoded < 0 || decoded < 0 {
            return Err(DecodeError::Malformed(format!(
                "negative pair size {encoded}/{decoded}"
            )));
        }

        let name = get_string(r).map_err(|e| match e {
            DecodeError::InvalidUtf8(_) => DecodeError::InvalidUtf8("<pair name>".into()),
            other => other,
        })?;
        let tag = r.i32()?;
        let ty = DataType::from_i32(tag).ok_or_else(|| DecodeError::UnknownDataType {
            key: name.clone(),
            tag,
        })?;
        let nelem = read_count(r, "element count")?;
        let value = decode_value(r, ty, nelem, depth).map_err(|e| e.with_key(&name))?;

        // Duplicates only arrive from foreign producers; the last one wins.
        list.insert(name, value);
    }
    Ok(list)
}

fn get_string(r: &mut Reader<'_>) -> Result<String, DecodeError> {
    let len = r.u32()? as usize;
    let bytes = r.take(len)?;
    r.skip(align4(len) - len)?;
    utf8(bytes)
}

/// Read the `xdr_array` count and check it against the pair header.
fn get_count(r: &mut Reader<'_>, nelem: usize, width: usize) -> Result<usize, DecodeError> {
    let count = r.u32()? as usize;
    if count != nelem {
        return Err(DecodeError::LengthMismatch {
            key: String::new(),
            declared: nelem,
            actual: count,
        });
    }
    r.ensure(count.saturating_mul(width))?;
    Ok(count)
}

fn get_vec<T>(
    r: &mut Reader<'_>,
    nelem: usize,
    width: usize,
    mut read: impl FnMut(&mut Reader<'_>) -> Result<T, DecodeError>,
) -> Result<Vec<T>, DecodeError> {
    let n = get_count(r, nelem, width)?;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(read(r)?);
    }
    Ok(out)
}

fn decode_value(
    r: &mut Reader<'_>,
    ty: DataType,
    nelem: usize,
    depth: usize,
) -> Result<Value, DecodeError> {
    let value = match ty {
        DataType::Boolean => {
            expect_nelem(nelem, 0)?;
            Value::Boolean
        }
        DataType::BooleanValue => {
            expect_nelem(nelem, 1)?;
            Value::BooleanValue(r.i32()? != 0)
        }
        DataType::Byte => {
            expect_nelem(nelem, 1)?;
            Value::Byte(r.i32()? as u8)
        }
        DataType::Int8 => {
            expect_nelem(nelem, 1)?;
            Value::Int8(r.i32()? as i8)
        }
        DataType::Uint8 => {
            expect_nelem(nelem, 1)?;
            Value::Uint8(r.u32()? as u8)
        }
        DataType::Int16 => {
            expect_nelem(nelem, 1)?;
            Value::Int16(r.i32()? as i16)
        }
        DataType::Uint16 => {
            expect_nelem(nelem, 1)?;
            Value::Uint16(r.u32()? as u16)
        }
        DataType::Int32 => {
            expect_nelem(nelem, 1)?;
            Value::Int32(r.i32()?)
        }
        DataType::Uint32 => {
            expect_nelem(nelem, 1)?;
            Value::Uint32(r.u32()?)
        }
        DataType::Int64 => {
            expect_nelem(nelem, 1)?;
            Value::Int64(r.i64()?)
        }
        DataType::Uint64 => {
            expect_nelem(nelem, 1)?;
            Value::Uint64(r.u64()?)
        }
        DataType::Hrtime => {
            expect_nelem(nelem, 1)?;
            Value::Hrtime(r.i64()?)
        }
        DataType::String => {
            expect_nelem(nelem, 1)?;
            Value::String(get_string(r)?)
        }
        DataType::ByteArray => {
            let bytes = r.take(nelem)?.to_vec();
            r.skip(align4(nelem) - nelem)?;
            Value::ByteArray(bytes)
        }
        DataType::BooleanArray => {
            Value::BooleanArray(get_vec(r, nelem, 4, |r| Ok(r.i32()? != 0))?)
        }
        DataType::Int8Array => Value::Int8Array(get_vec(r, nelem, 4, |r| Ok(r.i32()? as i8))?),
        DataType::Uint8Array => Value::Uint8Array(get_vec(r, nelem, 4, |r| Ok(r.u32()? as u8))?),
        DataType::Int16Array => {
            Value::Int16Array(get_vec(r, nelem, 4, |r| Ok(r.i32()? as i16))?)
        }
        DataType::Uint16Array => {
            Value::Uint16Array(get_vec(r, nelem, 4, |r| Ok(r.u32()? as u16))?)
        }
        DataType::Int32Array => Value::Int32Array(get_vec(r, nelem, 4, |r| r.i32())?),
        DataType::Uint32Array => Value::Uint32Array(get_vec(r, nelem, 4, |r| r.u32())?),
        DataType::Int64Array => Value::Int64Array(get_vec(r, nelem, 8, |r| r.i64())?),
        DataType::Uint64Array => Value::Uint64Array(get_vec(r, nelem, 8, |r| r.u64())?),
        DataType::StringArray => {
            r.ensure(nelem.saturating_mul(4))?;
            let mut out = Vec::with_capacity(nelem);
            for _ in 0..nelem {
                out.push(get_string(r)?);
            }
            Value::StringArray(out)
        }
        DataType::NvList => {
            expect_nelem(nelem, 1)?;
            Value::NvList(decode_list(r, depth + 1)?)
        }
        DataType::NvListArray => {
            // Every embedded list is at least header plus terminator.
            r.ensure(nelem.saturating_mul(16))?;
            let mut out = Vec::with_capacity(nelem);
            for _ in 0..nelem {
                out.push(decode_list(r, depth + 1)?);
            }
            Value::NvListArray(out)
        }
    };
    Ok(value)
}
