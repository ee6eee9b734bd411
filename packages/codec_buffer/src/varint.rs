//! Unsigned LEB128 encoding of two's-complement bit patterns.
//!
//! No zig-zag transform is applied, so negative values always occupy the maximum number of
//! bytes for their width.

use crate::{Error, Result};

/// The largest number of bytes a 32-bit varint can occupy (35 bits of coverage).
pub const MAX_VAR_I32_LEN: usize = 5;

/// The largest number of bytes a 64-bit varint can occupy (70 bits of coverage).
pub const MAX_VAR_I64_LEN: usize = 10;

const DATA_BITS: u32 = 7;
const DATA_MASK: u8 = 0x7F;
const CONTINUATION: u8 = 0x80;

/// Encoded form of one varint, least significant group first.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EncodedVarInt {
    bytes: [u8; MAX_VAR_I64_LEN],
    len: usize,
}

impl EncodedVarInt {
    pub(crate) fn from_u32(value: u32) -> Self {
        Self::from_u64(u64::from(value))
    }

    pub(crate) fn from_u64(mut value: u64) -> Self {
        let mut bytes = [0_u8; MAX_VAR_I64_LEN];
        let mut len = 0;

        for slot in &mut bytes {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "masked to the low 7 bits before the cast"
            )]
            let group = (value & u64::from(DATA_MASK)) as u8;
            value >>= DATA_BITS;
            len += 1;

            if value == 0 {
                *slot = group;
                break;
            }

            *slot = group | CONTINUATION;
        }

        Self { bytes, len }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        #[expect(
            clippy::indexing_slicing,
            reason = "len never exceeds the array length, the encoding loop is bounded by it"
        )]
        &self.bytes[..self.len]
    }
}

/// Accumulates varint bytes until the terminating byte arrives.
#[derive(Debug)]
pub(crate) struct VarIntDecoder {
    value: u64,
    shift: u32,
    consumed: usize,
    max_bytes: usize,
}

impl VarIntDecoder {
    pub(crate) fn new(max_bytes: usize) -> Self {
        Self {
            value: 0,
            shift: 0,
            consumed: 0,
            max_bytes,
        }
    }

    /// Feeds the next byte. Returns the decoded bit pattern once the final group has arrived.
    pub(crate) fn push(&mut self, byte: u8) -> Result<Option<u64>> {
        // Bits shifted out of the top are discarded, which is what reproduces the sign of a
        // negative value from its fixed number of groups.
        self.value |= u64::from(byte & DATA_MASK).wrapping_shl(self.shift);
        self.shift = self.shift.wrapping_add(DATA_BITS);
        self.consumed = self.consumed.wrapping_add(1);

        if byte & CONTINUATION == 0 {
            return Ok(Some(self.value));
        }

        if self.consumed >= self.max_bytes {
            return Err(Error::MalformedVarInt {
                max_bytes: self.max_bytes,
            });
        }

        Ok(None)
    }
}

/// Returns how many bytes the varint encoding of `value` occupies.
///
/// # Example
///
/// ```
/// use codec_buffer::{encoded_len_i32, encoded_len_i64};
///
/// assert_eq!(encoded_len_i32(127), 1);
/// assert_eq!(encoded_len_i32(128), 2);
/// assert_eq!(encoded_len_i32(-1), 5);
/// assert_eq!(encoded_len_i64(-1), 10);
/// ```
#[must_use]
pub fn encoded_len_i32(value: i32) -> usize {
    #[expect(
        clippy::cast_sign_loss,
        reason = "we encode the two's-complement bit pattern"
    )]
    EncodedVarInt::from_u32(value as u32).len
}

/// Returns how many bytes the varint encoding of `value` occupies.
#[must_use]
pub fn encoded_len_i64(value: i64) -> usize {
    #[expect(
        clippy::cast_sign_loss,
        reason = "we encode the two's-complement bit pattern"
    )]
    EncodedVarInt::from_u64(value as u64).len
}
