//! Stream framing: the 4-byte header, encoding selection and the limits
//! shared by both encoders.

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::buf::{Reader, Writer};
use crate::error::{DecodeError, EncodeError};
use crate::value::NvList;
use crate::{native, xdr};

/// `NV_VERSION`: the only list version ever produced.
pub(crate) const NV_VERSION: i32 = 0;

/// `NV_UNIQUE_NAME`: names are unique within a list.
pub(crate) const NV_UNIQUE_NAME: u32 = 0x1;

/// Deepest nesting accepted by the decoders.
pub const MAX_DEPTH: usize = 64;

/// Longest pair name; the pair header stores `len + 1` in an `i16`.
pub const MAX_NAME_LEN: usize = i16::MAX as usize - 1;

const NVS_BIG_ENDIAN: u8 = 0;
const NVS_LITTLE_ENDIAN: u8 = 1;

/// Packing method recorded in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Encoding {
    /// Host layout of the unpacked kernel structures.
    Native = 0,
    /// Big-endian XDR. Portable; what requests use unless configured
    /// otherwise.
    #[default]
    Xdr = 1,
}

impl Encoding {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Native),
            1 => Some(Self::Xdr),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Xdr => "xdr",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xdr" => Ok(Self::Xdr),
            "native" => Ok(Self::Native),
            other => Err(format!("unknown nvlist encoding {other:?}")),
        }
    }
}

/// Serialize `list` into a self-describing byte stream.
pub fn pack(list: &NvList, encoding: Encoding) -> Result<Vec<u8>, EncodeError> {
    let host_big = cfg!(target_endian = "big");
    let big_endian = match encoding {
        Encoding::Xdr => true,
        Encoding::Native => host_big,
    };

    let mut w = Writer::new(big_endian);
    w.u8(encoding as u8);
    w.u8(if host_big {
        NVS_BIG_ENDIAN
    } else {
        NVS_LITTLE_ENDIAN
    });
    w.zeros(2);

    match encoding {
        Encoding::Xdr => xdr::encode_list(&mut w, list)?,
        Encoding::Native => native::encode_list(&mut w, list)?,
    }

    let out = w.into_inner();
    trace!(%encoding, pairs = list.len(), bytes = out.len(), "packed nvlist");
    Ok(out)
}

/// Parse a byte stream produced by either encoding.
///
/// Bytes after the top-level terminator are ignored; the kernel hands back
/// buffers that are larger than the list they carry.
pub fn unpack(bytes: &[u8]) -> Result<NvList, DecodeError> {
    let mut r = Reader::new(bytes, 0, true);
    let header = r.take(4)?;
    let encoding = Encoding::from_u8(header[0]).ok_or(DecodeError::UnknownEncoding(header[0]))?;
    let big_endian = match header[1] {
        NVS_BIG_ENDIAN => true,
        NVS_LITTLE_ENDIAN => false,
        other => {
            return Err(DecodeError::Malformed(format!(
                "unknown byte order {other} in stream header"
            )));
        }
    };

    let list = match encoding {
        Encoding::Xdr => xdr::decode_list(&mut r, 0)?,
        Encoding::Native => {
            let mut r = Reader::new(bytes, 4, big_endian);
            native::decode_list(&mut r, 0)?
        }
    };
    trace!(%encoding, pairs = list.len(), "unpacked nvlist");
    Ok(list)
}

// ---------------------------------------------------------------------------
// Shared checks
// ---------------------------------------------------------------------------

/// Validate a pair name before it is written.
pub(crate) fn check_name(name: &str) -> Result<(), EncodeError> {
    crate::value::check_c_string(name)?;
    if name.len() > MAX_NAME_LEN {
        return Err(EncodeError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

/// Convert a size or count into the wire's signed 32-bit field.
pub(crate) fn wire_i32(key: &str, n: usize) -> Result<i32, EncodeError> {
    i32::try_from(n).map_err(|_| EncodeError::TooLarge(key.to_owned()))
}

/// Enforce the element count a scalar pair must announce.
pub(crate) fn expect_nelem(declared: usize, expected: usize) -> Result<(), DecodeError> {
    if declared != expected {
        return Err(DecodeError::LengthMismatch {
            key: String::new(),
            declared,
            actual: expected,
        });
    }
    Ok(())
}

/// Read a non-negative 32-bit count from a pair header.
pub(crate) fn read_count(r: &mut Reader<'_>, what: &str) -> Result<usize, DecodeError> {
    let n = r.i32()?;
    usize::try_from(n).map_err(|_| DecodeError::Malformed(format!("negative {what} {n}")))
}

/// Reject list versions we do not understand.
pub(crate) fn check_version(version: i32) -> Result<(), DecodeError> {
    if version != NV_VERSION {
        return Err(DecodeError::Malformed(format!(
            "unsupported nvlist version {version}"
        )));
    }
    Ok(())
}

pub(crate) fn check_depth(depth: usize) -> Result<(), DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeep(MAX_DEPTH));
    }
    Ok(())
}

/// Decode UTF-8, leaving the key to be attached by the caller.
pub(crate) fn utf8(bytes: &[u8]) -> Result<String, DecodeError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(String::new()))
}
