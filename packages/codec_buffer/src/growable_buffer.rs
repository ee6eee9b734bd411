use std::fmt;

use tracing::debug;

use crate::contract::ensure_remaining;
use crate::{CodecBuffer, Error, GrowableBufferBuilder, Recycle, Result, Storage, StorageKind};

/// A [`CodecBuffer`] over one contiguous memory region that grows as data is written.
///
/// Growth allocates a larger region of the same [`StorageKind`], copies the existing contents
/// across in one bulk copy and drops the old region. Storage is never partially reallocated.
///
/// Use this for short-lived in-memory encoding and decoding. For data that may become very large
/// or must survive the process, use [`PagedBuffer`][crate::PagedBuffer] instead.
///
/// # Example
///
/// ```
/// use codec_buffer::{CodecBuffer, GrowableBuffer, StorageKind};
///
/// let mut buffer = GrowableBuffer::builder()
///     .kind(StorageKind::Direct)
///     .initial_capacity(4)
///     .build();
///
/// for value in 0..100 {
///     buffer.write_i32(value)?;
/// }
/// assert!(buffer.capacity() >= 400);
///
/// buffer.flip();
/// for value in 0..100 {
///     assert_eq!(buffer.read_i32()?, value);
/// }
/// # Ok::<(), codec_buffer::Error>(())
/// ```
///
/// # Thread safety
///
/// The buffer can be moved between threads but it has exactly one owner at a time. Share it via
/// a [`BufferPool`][crate::BufferPool] lease or external synchronization.
pub struct GrowableBuffer {
    storage: Storage,

    position: usize,

    /// High-water mark of valid bytes. Never exceeds `storage.len()`.
    size: usize,

    /// Lower bound for compaction via `shrink_to_size()`.
    initial_capacity: usize,

    max_capacity: usize,

    readable: bool,
    writable: bool,
}

impl GrowableBuffer {
    pub(crate) fn new_inner(
        kind: StorageKind,
        initial_capacity: usize,
        max_capacity: usize,
        readable: bool,
    ) -> Self {
        Self {
            storage: Storage::allocate(kind, initial_capacity),
            position: 0,
            size: 0,
            initial_capacity,
            max_capacity,
            readable,
            writable: true,
        }
    }

    /// Creates an empty heap-backed buffer with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a buffer with a custom storage kind or capacity limits.
    pub fn builder() -> GrowableBufferBuilder {
        GrowableBufferBuilder::new()
    }

    /// Wraps bytes produced elsewhere for decoding.
    ///
    /// The buffer is positioned at the start with all of `bytes` as valid contents. It rejects
    /// writes with [`Error::NotWritable`].
    ///
    /// # Example
    ///
    /// ```
    /// use codec_buffer::{CodecBuffer, GrowableBuffer};
    ///
    /// let mut buffer = GrowableBuffer::read_only(vec![0xAC, 0x02]);
    ///
    /// assert!(!buffer.is_writable());
    /// assert_eq!(buffer.read_var_i32()?, 300);
    /// # Ok::<(), codec_buffer::Error>(())
    /// ```
    #[must_use]
    pub fn read_only(bytes: impl Into<Box<[u8]>>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len();

        Self {
            storage: Storage::from(bytes),
            position: 0,
            size,
            initial_capacity: size,
            max_capacity: size,
            readable: true,
            writable: false,
        }
    }

    /// The number of bytes the current storage region can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// The largest capacity this buffer may grow to.
    #[must_use]
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// The kind of storage region backing this buffer.
    #[must_use]
    pub fn kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// The valid contents of the buffer, independent of the position.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        #[expect(
            clippy::indexing_slicing,
            reason = "size never exceeds the storage length"
        )]
        &self.storage.as_slice()[..self.size]
    }

    /// Consumes the buffer, returning its valid contents.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Releases excess capacity accumulated by an unusually large payload.
    ///
    /// If the capacity exceeds `max(size, initial capacity)` by more than `threshold` bytes, the
    /// contents are moved into a new region of exactly that size. Returns whether the buffer was
    /// compacted.
    ///
    /// # Example
    ///
    /// ```
    /// use codec_buffer::{CodecBuffer, GrowableBuffer};
    ///
    /// let mut buffer = GrowableBuffer::builder().initial_capacity(64).build();
    /// buffer.write_buffer(&[7; 10_000])?;
    /// buffer.clear();
    ///
    /// assert!(buffer.shrink_to_size(1024));
    /// assert_eq!(buffer.capacity(), 64);
    /// # Ok::<(), codec_buffer::Error>(())
    /// ```
    pub fn shrink_to_size(&mut self, threshold: usize) -> bool {
        let target = self.size.max(self.initial_capacity);
        let capacity = self.capacity();

        if capacity.saturating_sub(target) <= threshold {
            return false;
        }

        debug!(capacity, target, "compacting growable buffer");
        self.replace_storage(target);
        true
    }

    /// Sets the capacity to exactly `required` bytes, or to the current size if that is larger.
    ///
    /// This is used to pre-size a buffer before handing its storage to a writer that reported
    /// how much space it needs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] if `required` is beyond the maximum capacity.
    pub fn resize_to(&mut self, required: usize) -> Result<()> {
        self.check_max_capacity(required)?;

        let target = required.max(self.size);
        if target != self.capacity() {
            debug!(
                capacity = self.capacity(),
                target, "resizing growable buffer"
            );
            self.replace_storage(target);
        }

        Ok(())
    }

    fn check_max_capacity(&self, required: usize) -> Result<()> {
        if required > self.max_capacity {
            return Err(Error::CapacityExceeded {
                requested: required as u64,
                max: self.max_capacity as u64,
            });
        }

        Ok(())
    }

    fn replace_storage(&mut self, capacity: usize) {
        let replacement = self.storage.reallocated(capacity, self.size);
        self.storage = replacement;
    }

    fn ensure_readable(&self) -> Result<()> {
        if self.readable {
            Ok(())
        } else {
            Err(Error::NotReadable)
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::NotWritable)
        }
    }
}

/// Geometric growth: starting from at least 2 bytes, keep adding twice the current capacity
/// until `required` fits, then clamp the overshoot to `max_capacity`.
fn grown_capacity(current: usize, required: usize, max_capacity: usize) -> usize {
    let mut capacity = current.max(2);

    while capacity < required {
        capacity = capacity.saturating_add(capacity.saturating_mul(2));
    }

    capacity.min(max_capacity)
}

impl CodecBuffer for GrowableBuffer {
    fn position(&self) -> u64 {
        self.position as u64
    }

    fn size(&self) -> u64 {
        self.size as u64
    }

    fn is_readable(&self) -> bool {
        self.readable
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        ensure_remaining(position, self.size as u64, 0)?;

        #[expect(
            clippy::cast_possible_truncation,
            reason = "bounded by size, which is a usize"
        )]
        let position = position as usize;
        self.position = position;
        Ok(())
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        self.ensure_writable()?;

        let required = self
            .position
            .checked_add(additional)
            .ok_or(Error::CapacityExceeded {
                requested: u64::MAX,
                max: self.max_capacity as u64,
            })?;

        if required <= self.capacity() {
            return Ok(());
        }

        self.check_max_capacity(required)?;

        let capacity = grown_capacity(self.capacity(), required, self.max_capacity);
        debug!(
            from = self.capacity(),
            to = capacity,
            kind = ?self.kind(),
            "growing buffer"
        );
        self.replace_storage(capacity);

        Ok(())
    }

    fn flip(&mut self) {
        self.position = 0;
    }

    fn clear(&mut self) {
        self.position = 0;
        self.size = 0;
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;

        // Cannot overflow, reserve() checked it.
        let end = self.position.wrapping_add(bytes.len());

        #[expect(
            clippy::indexing_slicing,
            reason = "reserve() guarantees the storage extends to `end`"
        )]
        self.storage.as_mut_slice()[self.position..end].copy_from_slice(bytes);

        self.position = end;
        self.size = self.size.max(end);
        Ok(())
    }

    fn read_bytes(&mut self, into: &mut [u8]) -> Result<()> {
        self.ensure_readable()?;
        ensure_remaining(self.position as u64, self.size as u64, into.len())?;

        // Cannot overflow, the bounds check above proved it ends within `size`.
        let end = self.position.wrapping_add(into.len());

        #[expect(
            clippy::indexing_slicing,
            reason = "bounds checked against size above"
        )]
        into.copy_from_slice(&self.storage.as_slice()[self.position..end]);

        self.position = end;
        Ok(())
    }
}

impl Recycle for GrowableBuffer {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl Default for GrowableBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GrowableBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowableBuffer")
            .field("storage", &self.storage)
            .field("position", &self.position)
            .field("size", &self.size)
            .field("initial_capacity", &self.initial_capacity)
            .field("max_capacity", &self.max_capacity)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .finish()
    }
}
