use crate::{GrowableBuffer, StorageKind};

/// Capacity of a [`GrowableBuffer`] that was not given an explicit initial capacity.
pub const DEFAULT_INITIAL_CAPACITY: usize = 256;

/// The largest capacity any [`GrowableBuffer`] may reach unless configured lower.
pub const MAX_BUFFER_LEN: usize = usize::MAX >> 1;

/// Builder for creating an instance of [`GrowableBuffer`].
///
/// The default configuration used by [`GrowableBuffer::new()`] is a heap-backed buffer of
/// [`DEFAULT_INITIAL_CAPACITY`] bytes that may grow up to [`MAX_BUFFER_LEN`].
///
/// # Examples
///
/// ```
/// use codec_buffer::{GrowableBuffer, StorageKind};
///
/// let buffer = GrowableBuffer::builder()
///     .kind(StorageKind::Direct)
///     .initial_capacity(1024 * 1024)
///     .max_capacity(16 * 1024 * 1024)
///     .build();
///
/// assert_eq!(buffer.capacity(), 1024 * 1024);
/// ```
#[derive(Debug)]
#[must_use]
pub struct GrowableBufferBuilder {
    kind: StorageKind,
    initial_capacity: Option<usize>,
    max_capacity: usize,
    readable: bool,
}

impl GrowableBufferBuilder {
    pub(crate) fn new() -> Self {
        Self {
            kind: StorageKind::default(),
            initial_capacity: None,
            max_capacity: MAX_BUFFER_LEN,
            readable: true,
        }
    }

    /// Sets the kind of storage region the buffer allocates, now and whenever it grows.
    pub fn kind(mut self, kind: StorageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the capacity allocated up front. This is also the floor for
    /// [`shrink_to_size()`][GrowableBuffer::shrink_to_size].
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Sets the capacity beyond which writes fail with
    /// [`Error::CapacityExceeded`][crate::Error::CapacityExceeded].
    pub fn max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Makes the buffer reject reads with [`Error::NotReadable`][crate::Error::NotReadable].
    ///
    /// Use this for buffers whose contents are only ever handed out through
    /// [`as_bytes()`][GrowableBuffer::as_bytes] or [`into_bytes()`][GrowableBuffer::into_bytes],
    /// so that decoding from them by mistake fails instead of yielding stale data.
    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }

    /// Builds the buffer with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if the maximum capacity is below the initial capacity or above [`MAX_BUFFER_LEN`].
    #[must_use]
    pub fn build(self) -> GrowableBuffer {
        assert!(
            self.max_capacity <= MAX_BUFFER_LEN,
            "max capacity {} is above the supported limit {MAX_BUFFER_LEN}",
            self.max_capacity
        );

        // The default initial capacity yields to a small maximum, an explicit one does not.
        let initial_capacity = self
            .initial_capacity
            .unwrap_or_else(|| DEFAULT_INITIAL_CAPACITY.min(self.max_capacity));

        assert!(
            initial_capacity <= self.max_capacity,
            "initial capacity {initial_capacity} is above the max capacity {}",
            self.max_capacity
        );

        GrowableBuffer::new_inner(
            self.kind,
            initial_capacity,
            self.max_capacity,
            self.readable,
        )
    }
}
