use crate::varint::{EncodedVarInt, VarIntDecoder};
use crate::{Error, MAX_VAR_I32_LEN, MAX_VAR_I64_LEN, Result};

/// Byte order of the fixed-width integer encodings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ByteOrder {
    /// Most significant byte first.
    BigEndian,
}

/// The byte order used by [`CodecBuffer::write_i32()`], [`CodecBuffer::write_i64()`] and their
/// read counterparts, on every platform.
///
/// This is part of the persisted format of [`PagedBuffer`][crate::PagedBuffer] files, so data
/// written on one machine reads back identically on any other.
pub const BYTE_ORDER: ByteOrder = ByteOrder::BigEndian;

/// A cursor over a sequence of bytes that typed values can be written into and read back from.
///
/// The buffer tracks two offsets:
///
/// * `position` - where the next read or write happens.
/// * `size` - the high-water mark of valid bytes. Reads may not go past it, writes move it
///   forward when they end beyond it.
///
/// `0 <= position <= size` holds after every operation.
///
/// Typical use is to write a sequence of values, [`flip()`][Self::flip] the buffer and read the
/// same sequence back in the same order:
///
/// ```
/// use codec_buffer::{CodecBuffer, GrowableBuffer};
///
/// let mut buffer = GrowableBuffer::new();
/// buffer.write_var_i32(300)?;
/// buffer.write_i64(-5)?;
/// buffer.write_buffer(b"payload")?;
///
/// buffer.flip();
///
/// assert_eq!(buffer.read_var_i32()?, 300);
/// assert_eq!(buffer.read_i64()?, -5);
/// assert_eq!(buffer.read_buffer(7)?, b"payload");
/// # Ok::<(), codec_buffer::Error>(())
/// ```
///
/// Implementations are not internally synchronized. Exclusive access comes from `&mut self` and,
/// for shared reuse, from [`BufferPool`][crate::BufferPool] leases.
pub trait CodecBuffer {
    /// Offset at which the next read or write happens.
    fn position(&self) -> u64;

    /// Number of valid bytes in the buffer.
    fn size(&self) -> u64;

    /// Whether read operations are permitted.
    fn is_readable(&self) -> bool;

    /// Whether write operations are permitted.
    fn is_writable(&self) -> bool;

    /// Moves the cursor to `position`, which may not exceed [`size()`][Self::size].
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if `position` is beyond the valid contents.
    fn set_position(&mut self, position: u64) -> Result<()>;

    /// Guarantees that at least `additional` bytes can be written at the current position
    /// without further allocation or mapping.
    ///
    /// Every write operation reserves the space it needs by itself. Calling this up front
    /// amortizes the work when the total size of a batch of writes is known.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if the buffer cannot grow that far, or
    /// [`Error::Io`] if backing storage could not be extended.
    fn reserve(&mut self, additional: usize) -> Result<()>;

    /// Switches from writing to reading: the position returns to the start, the size is kept.
    fn flip(&mut self);

    /// Discards the contents so the buffer can be reused. Capacity is not released.
    fn clear(&mut self);

    /// Writes all of `bytes` at the current position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotWritable`] for read-only buffers, otherwise any error of
    /// [`reserve()`][Self::reserve].
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Fills `into` with the next `into.len()` bytes.
    ///
    /// To read into part of a larger array, pass a sub-slice (`&mut array[offset..offset + len]`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if fewer than `into.len()` valid bytes remain, in which
    /// case the position is not moved.
    fn read_bytes(&mut self, into: &mut [u8]) -> Result<()>;

    /// Number of valid bytes between the position and the end of the contents.
    fn remaining(&self) -> u64 {
        self.size().saturating_sub(self.position())
    }

    /// Transfers a contiguous payload (e.g. an already encoded sub-object) in one bulk copy.
    ///
    /// # Errors
    ///
    /// Same as [`write_bytes()`][Self::write_bytes].
    fn write_buffer(&mut self, payload: &[u8]) -> Result<()> {
        self.reserve(payload.len())?;
        self.write_bytes(payload)
    }

    /// Returns a detached copy of the next `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReadable`] if the buffer does not permit reads and
    /// [`Error::OutOfBounds`] if fewer than `len` valid bytes remain.
    fn read_buffer(&mut self, len: usize) -> Result<Vec<u8>> {
        if !self.is_readable() {
            return Err(Error::NotReadable);
        }

        // Check before allocating so a corrupt length prefix cannot trigger a huge allocation.
        ensure_remaining(self.position(), self.size(), len)?;

        let mut payload = vec![0_u8; len];
        self.read_bytes(&mut payload)?;
        Ok(payload)
    }

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Same as [`write_bytes()`][Self::write_bytes].
    fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Same as [`read_bytes()`][Self::read_bytes].
    fn read_i8(&mut self) -> Result<i8> {
        let mut bytes = [0_u8; 1];
        self.read_bytes(&mut bytes)?;
        Ok(i8::from_be_bytes(bytes))
    }

    /// Writes a 32-bit integer as 4 big-endian bytes.
    ///
    /// # Errors
    ///
    /// Same as [`write_bytes()`][Self::write_bytes].
    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Reads a 32-bit integer from 4 big-endian bytes.
    ///
    /// # Errors
    ///
    /// Same as [`read_bytes()`][Self::read_bytes].
    fn read_i32(&mut self) -> Result<i32> {
        let mut bytes = [0_u8; 4];
        self.read_bytes(&mut bytes)?;
        Ok(i32::from_be_bytes(bytes))
    }

    /// Writes a 64-bit integer as 8 big-endian bytes.
    ///
    /// # Errors
    ///
    /// Same as [`write_bytes()`][Self::write_bytes].
    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Reads a 64-bit integer from 8 big-endian bytes.
    ///
    /// # Errors
    ///
    /// Same as [`read_bytes()`][Self::read_bytes].
    fn read_i64(&mut self) -> Result<i64> {
        let mut bytes = [0_u8; 8];
        self.read_bytes(&mut bytes)?;
        Ok(i64::from_be_bytes(bytes))
    }

    /// Writes a 32-bit integer as a varint of 1 to 5 bytes.
    ///
    /// # Errors
    ///
    /// Same as [`write_bytes()`][Self::write_bytes].
    fn write_var_i32(&mut self, value: i32) -> Result<()> {
        self.reserve(MAX_VAR_I32_LEN)?;

        #[expect(
            clippy::cast_sign_loss,
            reason = "we encode the two's-complement bit pattern"
        )]
        let encoded = EncodedVarInt::from_u32(value as u32);
        self.write_bytes(encoded.as_slice())
    }

    /// Reads a varint written by [`write_var_i32()`][Self::write_var_i32].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedVarInt`] if the encoding does not terminate within 5 bytes,
    /// otherwise the errors of [`read_bytes()`][Self::read_bytes].
    fn read_var_i32(&mut self) -> Result<i32> {
        let bits = read_varint(self, MAX_VAR_I32_LEN)?;

        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_possible_wrap,
            reason = "the low 32 bits are the two's-complement pattern we encoded"
        )]
        Ok(bits as u32 as i32)
    }

    /// Writes a 64-bit integer as a varint of 1 to 10 bytes.
    ///
    /// # Errors
    ///
    /// Same as [`write_bytes()`][Self::write_bytes].
    fn write_var_i64(&mut self, value: i64) -> Result<()> {
        self.reserve(MAX_VAR_I64_LEN)?;

        #[expect(
            clippy::cast_sign_loss,
            reason = "we encode the two's-complement bit pattern"
        )]
        let encoded = EncodedVarInt::from_u64(value as u64);
        self.write_bytes(encoded.as_slice())
    }

    /// Reads a varint written by [`write_var_i64()`][Self::write_var_i64].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedVarInt`] if the encoding does not terminate within 10 bytes,
    /// otherwise the errors of [`read_bytes()`][Self::read_bytes].
    fn read_var_i64(&mut self) -> Result<i64> {
        let bits = read_varint(self, MAX_VAR_I64_LEN)?;

        #[expect(
            clippy::cast_possible_wrap,
            reason = "we decode the two's-complement bit pattern"
        )]
        Ok(bits as i64)
    }
}

fn read_varint<B>(buffer: &mut B, max_bytes: usize) -> Result<u64>
where
    B: CodecBuffer + ?Sized,
{
    let mut decoder = VarIntDecoder::new(max_bytes);
    let mut byte = [0_u8; 1];

    loop {
        buffer.read_bytes(&mut byte)?;

        if let Some(bits) = decoder.push(byte[0])? {
            return Ok(bits);
        }
    }
}

/// Fails with [`Error::OutOfBounds`] unless `len` valid bytes follow `position`.
pub(crate) fn ensure_remaining(position: u64, size: u64, len: usize) -> Result<()> {
    let requested = len as u64;

    match position.checked_add(requested) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::OutOfBounds {
            position,
            requested,
            size,
        }),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn ensure_remaining_accepts_exact_fit() {
        ensure_remaining(3, 10, 7).unwrap();
        ensure_remaining(10, 10, 0).unwrap();
    }

    #[test]
    fn ensure_remaining_rejects_overrun() {
        assert!(matches!(
            ensure_remaining(3, 10, 8),
            Err(Error::OutOfBounds {
                position: 3,
                requested: 8,
                size: 10
            })
        ));
    }

    #[test]
    fn ensure_remaining_rejects_overflow() {
        assert!(ensure_remaining(u64::MAX, u64::MAX, 1).is_err());
    }

    #[test]
    fn byte_order_is_big_endian() {
        assert_eq!(BYTE_ORDER, ByteOrder::BigEndian);
    }
}
