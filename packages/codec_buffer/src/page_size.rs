/// Size of one page of a [`PagedBuffer`][crate::PagedBuffer], always a power of two.
///
/// Addresses are resolved with shifts and masks instead of division:
///
/// * page index = `position >> shift`
/// * offset within page = `position & (size - 1)`
///
/// The page size is a persisted format parameter: a file must be reopened with the same
/// page size it was written with.
///
/// # Example
///
/// ```
/// use codec_buffer::PageSize;
///
/// assert_eq!(PageSize::DEFAULT.bytes(), 32 * 1024 * 1024);
///
/// let small = PageSize::from_shift(12).unwrap();
/// assert_eq!(small.bytes(), 4096);
///
/// assert!(PageSize::from_shift(PageSize::MAX_SHIFT + 1).is_none());
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PageSize {
    shift: u32,
}

impl PageSize {
    /// The largest supported shift, giving 1 GiB pages.
    pub const MAX_SHIFT: u32 = 30;

    /// 32 MiB pages.
    pub const DEFAULT: Self = Self { shift: 25 };

    /// Creates a page size of `1 << shift` bytes, or `None` if `shift` exceeds
    /// [`MAX_SHIFT`][Self::MAX_SHIFT].
    #[must_use]
    pub const fn from_shift(shift: u32) -> Option<Self> {
        if shift > Self::MAX_SHIFT {
            return None;
        }

        Some(Self { shift })
    }

    /// The base-2 logarithm of the page size.
    #[must_use]
    pub const fn shift(self) -> u32 {
        self.shift
    }

    /// The page size in bytes.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        1 << self.shift
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "MAX_SHIFT keeps pages within the address space of 32-bit targets"
    )]
    pub(crate) const fn bytes_usize(self) -> usize {
        self.bytes() as usize
    }

    pub(crate) const fn page_index(self, position: u64) -> u64 {
        position >> self.shift
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "an offset within a page is below the page size, which fits in usize"
    )]
    pub(crate) const fn page_offset(self, position: u64) -> usize {
        (position & (self.bytes() - 1)) as usize
    }

    /// File offset of the first byte of page `index`, or `None` if it cannot be addressed.
    pub(crate) const fn page_start(self, index: u64) -> Option<u64> {
        index.checked_mul(self.bytes())
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}
