//! Byte cursors shared by both encodings.
//!
//! The XDR side always runs big-endian; the native side follows the byte
//! order announced in the stream header.

use crate::error::DecodeError;

/// Bounds-checked reader over a borrowed byte slice.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

macro_rules! read_int {
    ($($fn:ident -> $ty:ty;)*) => {
        $(
            pub(crate) fn $fn(&mut self) -> Result<$ty, DecodeError> {
                const N: usize = std::mem::size_of::<$ty>();
                let bytes: [u8; N] = self
                    .take(N)?
                    .try_into()
                    .map_err(DecodeError::malformed)?;
                Ok(if self.big_endian {
                    <$ty>::from_be_bytes(bytes)
                } else {
                    <$ty>::from_le_bytes(bytes)
                })
            }
        )*
    };
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8], pos: usize, big_endian: bool) -> Self {
        Self {
            buf,
            pos,
            big_endian,
        }
    }

    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn big_endian(&self) -> bool {
        self.big_endian
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Fail with [`DecodeError::Truncated`] unless `n` more bytes exist.
    pub(crate) fn ensure(&self, n: usize) -> Result<(), DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n,
            });
        }
        Ok(())
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(n)?;
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    /// Move to an absolute offset inside the buffer.
    pub(crate) fn seek(&mut self, pos: usize) -> Result<(), DecodeError> {
        if pos > self.buf.len() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: pos.saturating_sub(self.pos),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    read_int! {
        i8 -> i8;
        i16 -> i16;
        u16 -> u16;
        i32 -> i32;
        u32 -> u32;
        i64 -> i64;
        u64 -> u64;
    }
}

/// Growable writer with a fixed byte order.
pub(crate) struct Writer {
    buf: Vec<u8>,
    big_endian: bool,
}

macro_rules! write_int {
    ($($fn:ident($ty:ty);)*) => {
        $(
            pub(crate) fn $fn(&mut self, v: $ty) {
                if self.big_endian {
                    self.buf.extend_from_slice(&v.to_be_bytes());
                } else {
                    self.buf.extend_from_slice(&v.to_le_bytes());
                }
            }
        )*
    };
}

impl Writer {
    pub(crate) fn new(big_endian: bool) -> Self {
        Self {
            buf: Vec::new(),
            big_endian,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Append zero bytes until the length is a multiple of `align`.
    pub(crate) fn pad_to(&mut self, align: usize) {
        self.pad_from(0, align);
    }

    /// Append zero bytes until the distance from `base` is a multiple of
    /// `align`.
    pub(crate) fn pad_from(&mut self, base: usize, align: usize) {
        let rem = (self.buf.len() - base) % align;
        if rem != 0 {
            self.zeros(align - rem);
        }
    }

    pub(crate) fn zeros(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }

    /// Overwrite a previously reserved 32-bit slot.
    pub(crate) fn patch_i32(&mut self, at: usize, v: i32) {
        let bytes = if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.buf[at..at + 4].copy_from_slice(&bytes);
    }

    write_int! {
        i8(i8);
        i16(i16);
        u16(u16);
        i32(i32);
        u32(u32);
        i64(i64);
        u64(u64);
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_respects_byte_order() {
        let data = [0x00, 0x00, 0x01, 0x02];
        assert_eq!(Reader::new(&data, 0, true).i32().unwrap(), 0x0102);
        assert_eq!(Reader::new(&data, 0, false).i32().unwrap(), 0x0201_0000);
    }

    #[test]
    fn reader_reports_truncation_offset() {
        let data = [0u8; 6];
        let mut r = Reader::new(&data, 0, true);
        r.u32().unwrap();
        let err = r.u32().unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                offset: 4,
                needed: 4
            }
        );
    }

    #[test]
    fn writer_pads_and_patches() {
        let mut w = Writer::new(true);
        w.i32(0);
        w.u8(7);
        w.pad_to(4);
        w.patch_i32(0, 8);
        assert_eq!(w.into_inner(), vec![0, 0, 0, 8, 7, 0, 0, 0]);
    }
}
