use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::fmt;
use std::ptr::NonNull;
use std::slice;

/// Alignment of [`StorageKind::Direct`] regions, matching the smallest common virtual memory
/// page size so the region can be handed to I/O APIs that require page-aligned buffers.
pub const DIRECT_ALIGNMENT: usize = 4096;

/// Where a [`GrowableBuffer`][crate::GrowableBuffer] keeps its bytes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum StorageKind {
    /// An ordinary heap-allocated byte slice.
    #[default]
    Heap,

    /// A separately allocated region aligned to [`DIRECT_ALIGNMENT`], released as soon as the
    /// owning buffer drops it.
    Direct,
}

/// One contiguous, zero-initialized storage region. Replaced wholesale when a buffer grows.
pub(crate) enum Storage {
    Heap(Box<[u8]>),
    Direct(DirectRegion),
}

impl Storage {
    pub(crate) fn allocate(kind: StorageKind, capacity: usize) -> Self {
        match kind {
            StorageKind::Heap => Self::Heap(vec![0_u8; capacity].into_boxed_slice()),
            StorageKind::Direct => Self::Direct(DirectRegion::new(capacity)),
        }
    }

    pub(crate) fn kind(&self) -> StorageKind {
        match self {
            Self::Heap(_) => StorageKind::Heap,
            Self::Direct(_) => StorageKind::Direct,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            Self::Heap(bytes) => bytes,
            Self::Direct(region) => region.as_slice(),
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Self::Heap(bytes) => bytes,
            Self::Direct(region) => region.as_mut_slice(),
        }
    }

    /// Allocates a region of the same kind with `capacity` bytes and copies the first
    /// `preserve` bytes of `self` into it in one bulk copy.
    ///
    /// # Panics
    ///
    /// Panics if `preserve` exceeds the length of either region.
    pub(crate) fn reallocated(&self, capacity: usize, preserve: usize) -> Self {
        let mut replacement = Self::allocate(self.kind(), capacity);

        #[expect(
            clippy::indexing_slicing,
            reason = "callers only preserve bytes that fit in both regions"
        )]
        replacement.as_mut_slice()[..preserve].copy_from_slice(&self.as_slice()[..preserve]);

        replacement
    }
}

impl From<Box<[u8]>> for Storage {
    fn from(bytes: Box<[u8]>) -> Self {
        Self::Heap(bytes)
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}

/// A zeroed allocation aligned to [`DIRECT_ALIGNMENT`].
pub(crate) struct DirectRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl DirectRegion {
    fn new(len: usize) -> Self {
        if len == 0 {
            return Self {
                ptr: NonNull::dangling(),
                len,
            };
        }

        let layout = Self::layout(len);

        // SAFETY: The layout has a non-zero size, checked above.
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) })
            .expect("we do not intend to handle allocation failure as a real possibility - OOM results in panic");

        Self { ptr, len }
    }

    fn layout(len: usize) -> Layout {
        Layout::from_size_align(len, DIRECT_ALIGNMENT)
            .expect("buffer lengths are capped far below the point where alignment padding overflows")
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: The region is `len` initialized (zeroed) bytes owned by `self`. For `len == 0`
        // the dangling pointer is well-aligned and non-null, which is all an empty slice needs.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: As in `as_slice()`, and `&mut self` guarantees the slice is the only reference.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for DirectRegion {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }

        // SAFETY: We allocated `ptr` in `new()` with this same layout and it has not been
        // deallocated yet, as drop runs at most once.
        unsafe {
            dealloc(self.ptr.as_ptr(), Self::layout(self.len));
        }
    }
}

// SAFETY: The region is exclusively owned plain bytes; moving it to another thread is no
// different from moving a `Box<[u8]>`.
unsafe impl Send for DirectRegion {}

// SAFETY: Shared access only hands out `&[u8]`, which is safe to use from many threads.
unsafe impl Sync for DirectRegion {}
