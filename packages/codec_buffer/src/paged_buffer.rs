use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem;

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, warn};

use crate::contract::ensure_remaining;
use crate::paged_format::{TRAILER_LEN, Trailer, corrupt};
use crate::{CodecBuffer, Error, PageSize, Result};

/// A [`CodecBuffer`] whose address space is split into fixed-size memory-mapped pages of one
/// file.
///
/// Page `i` always maps the file bytes `[i * page_size, (i + 1) * page_size)`. Pages are mapped
/// lazily on first touch, strictly in increasing index order, and stay mapped until the buffer
/// is dropped. Operations that cross a page boundary are split into one copy per page, so the
/// cost of any single step is bounded by the page size no matter how large the file grows.
///
/// The file ends with a small trailer that records the page size and the logical size of the
/// contents. [`flush()`][Self::flush] writes it, together with all mapped pages, to durable
/// storage. Reopening a file with a page size other than the one it was created with fails with
/// [`Error::PageSizeMismatch`].
///
/// # Example
///
/// ```
/// use codec_buffer::{CodecBuffer, PageSize, PagedBuffer};
///
/// let file = tempfile::tempfile()?;
/// let page_size = PageSize::from_shift(12).unwrap();
///
/// let mut buffer = PagedBuffer::create(file.try_clone()?, page_size)?;
/// buffer.write_buffer(&[42; 10_000])?;
/// buffer.close()?;
///
/// let mut buffer = PagedBuffer::open(file, page_size)?;
/// assert_eq!(buffer.size(), 10_000);
/// assert_eq!(buffer.page_count(), 0);
///
/// assert_eq!(buffer.read_buffer(10_000)?, vec![42; 10_000]);
/// assert_eq!(buffer.page_count(), 3);
/// # Ok::<(), codec_buffer::Error>(())
/// ```
///
/// # Thread safety
///
/// Page mapping is not synchronized. The buffer may be moved between threads but it must only
/// be used by one thread at a time, and there must be only one writer of the backing file.
pub struct PagedBuffer {
    file: File,
    page_size: PageSize,

    /// `pages[i]` maps page `i`. Only ever appended to.
    pages: Vec<MmapMut>,

    /// Number of whole pages the file currently holds, mapped or not.
    file_pages: u64,

    position: u64,

    /// High-water mark of valid bytes. Only grows, except through `clear()`.
    size: u64,

    /// Whether the trailer on disk no longer describes the file.
    trailer_stale: bool,
}

impl PagedBuffer {
    /// Turns `file` into an empty paged buffer, discarding any previous contents.
    ///
    /// The file must be opened for both reading and writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be truncated or written.
    pub fn create(file: File, page_size: PageSize) -> Result<Self> {
        file.set_len(0)?;

        let mut buffer = Self {
            file,
            page_size,
            pages: Vec::new(),
            file_pages: 0,
            position: 0,
            size: 0,
            trailer_stale: true,
        };

        buffer.write_trailer()?;

        debug!(page_shift = page_size.shift(), "created paged buffer");
        Ok(buffer)
    }

    /// Reopens a file previously written by a paged buffer, positioned at the start.
    ///
    /// No pages are mapped until they are first accessed. Pages are always mapped writable, so
    /// the file must be opened for both reading and writing, same as for
    /// [`create()`][Self::create], even if the buffer is only going to be read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PageSizeMismatch`] if the file was written with a different page size,
    /// [`Error::CorruptFile`] if it does not end with a valid trailer and [`Error::Io`] if it
    /// cannot be read.
    pub fn open(mut file: File, page_size: PageSize) -> Result<Self> {
        let file_len = file.metadata()?.len();

        let Some(data_len) = file_len.checked_sub(TRAILER_LEN as u64) else {
            return Err(corrupt(format!(
                "file of {file_len} bytes is too short to hold a trailer"
            )));
        };

        let mut bytes = [0_u8; TRAILER_LEN];
        file.seek(SeekFrom::Start(data_len))?;
        file.read_exact(&mut bytes)?;
        let trailer = Trailer::decode(&bytes)?;

        if trailer.page_shift != page_size.shift() {
            return Err(Error::PageSizeMismatch {
                expected_shift: page_size.shift(),
                found_shift: trailer.page_shift,
            });
        }

        if page_size.page_start(trailer.page_count) != Some(data_len) {
            return Err(corrupt(format!(
                "{data_len} data bytes do not hold exactly {} pages",
                trailer.page_count
            )));
        }

        if trailer.size > data_len {
            return Err(corrupt(format!(
                "recorded size {} exceeds the {data_len} data bytes",
                trailer.size
            )));
        }

        debug!(
            page_shift = page_size.shift(),
            size = trailer.size,
            file_pages = trailer.page_count,
            "opened paged buffer"
        );

        Ok(Self {
            file,
            page_size,
            pages: Vec::new(),
            file_pages: trailer.page_count,
            position: 0,
            size: trailer.size,
            trailer_stale: false,
        })
    }

    /// The page size this buffer was created or opened with.
    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    /// The number of pages currently mapped into memory.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Forces every mapped page and the format trailer to durable storage.
    ///
    /// This is the only durability point: data written since the last flush may be lost if the
    /// process or machine fails, and a file whose trailer was not flushed after it grew cannot be
    /// reopened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the operating system reports a write failure.
    pub fn flush(&mut self) -> Result<()> {
        for page in &self.pages {
            page.flush()?;
        }

        if self.trailer_stale {
            self.write_trailer()?;
        }

        self.file.sync_data()?;
        Ok(())
    }

    /// Flushes and releases the buffer, reporting errors that dropping it would only log.
    ///
    /// # Errors
    ///
    /// Same as [`flush()`][Self::flush].
    pub fn close(mut self) -> Result<()> {
        let result = self.flush();

        // Whatever happened, there is nothing left for Drop to retry.
        self.trailer_stale = false;
        result
    }

    /// Makes sure every page overlapping `[position, position + len)` is mapped, extending the
    /// file if the range reaches past its end.
    fn ensure_mapped(&mut self, position: u64, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }

        let last_byte = position
            .checked_add(len as u64 - 1)
            .ok_or_else(|| self.address_space_exhausted(u64::MAX))?;
        let required_pages = self
            .page_size
            .page_index(last_byte)
            .checked_add(1)
            .ok_or_else(|| self.address_space_exhausted(u64::MAX))?;

        if required_pages > self.file_pages {
            self.extend_file(required_pages)?;
        }

        while (self.pages.len() as u64) < required_pages {
            self.map_next_page()?;
        }

        Ok(())
    }

    fn extend_file(&mut self, page_count: u64) -> Result<()> {
        let Some(new_len) = self.page_size.page_start(page_count) else {
            return Err(self.address_space_exhausted(u64::MAX));
        };

        let Some(old_len) = self.page_size.page_start(self.file_pages) else {
            return Err(self.address_space_exhausted(u64::MAX));
        };

        // From here on the trailer is gone from disk until it is rewritten, even if extending
        // fails halfway.
        self.trailer_stale = true;

        // Cut the trailer off first so the new pages start out zeroed.
        self.file.set_len(old_len)?;
        self.file.set_len(new_len)?;

        debug!(
            from_pages = self.file_pages,
            to_pages = page_count,
            "extended paged file"
        );

        self.file_pages = page_count;
        Ok(())
    }

    fn map_next_page(&mut self) -> Result<()> {
        let index = self.pages.len() as u64;
        let offset = self
            .page_size
            .page_start(index)
            .ok_or_else(|| self.address_space_exhausted(u64::MAX))?;

        // SAFETY: Mapping a file is unsafe because other processes may modify or truncate it
        // while it is mapped. The paged file format assumes a single writer and this buffer only
        // ever grows the file, so every mapped page stays backed by the file for as long as the
        // mapping exists. The mapping is owned by `self.pages` and dropped with the buffer.
        let page = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(self.page_size.bytes_usize())
                .map_mut(&self.file)?
        };

        debug!(index, offset, "mapped page");
        self.pages.push(page);
        Ok(())
    }

    /// The mapped bytes from `position` to the end of its page.
    fn page_tail(&self, position: u64) -> &[u8] {
        let index = self.page_index_usize(position);
        let offset = self.page_size.page_offset(position);

        self.pages
            .get(index)
            .and_then(|page| page.get(offset..))
            .expect("callers map every page of an access range before touching it")
    }

    fn page_tail_mut(&mut self, position: u64) -> &mut [u8] {
        let index = self.page_index_usize(position);
        let offset = self.page_size.page_offset(position);

        self.pages
            .get_mut(index)
            .and_then(|page| page.get_mut(offset..))
            .expect("callers map every page of an access range before touching it")
    }

    fn page_index_usize(&self, position: u64) -> usize {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "mapped pages are held in a Vec, so their indexes fit in usize"
        )]
        let index = self.page_size.page_index(position) as usize;
        index
    }

    fn address_space_exhausted(&self, requested: u64) -> Error {
        Error::CapacityExceeded {
            requested,
            max: u64::MAX & !(self.page_size.bytes() - 1),
        }
    }

    fn write_trailer(&mut self) -> Result<()> {
        let Some(data_len) = self.page_size.page_start(self.file_pages) else {
            return Err(self.address_space_exhausted(u64::MAX));
        };

        let trailer = Trailer {
            page_shift: self.page_size.shift(),
            size: self.size,
            page_count: self.file_pages,
        };

        self.file.seek(SeekFrom::Start(data_len))?;
        self.file.write_all(&trailer.encode())?;

        self.trailer_stale = false;
        Ok(())
    }
}

impl CodecBuffer for PagedBuffer {
    fn position(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_readable(&self) -> bool {
        true
    }

    fn is_writable(&self) -> bool {
        true
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        ensure_remaining(position, self.size, 0)?;
        self.position = position;
        Ok(())
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        self.ensure_mapped(self.position, additional)
    }

    fn flip(&mut self) {
        self.position = 0;
    }

    fn clear(&mut self) {
        self.position = 0;
        self.size = 0;
        self.trailer_stale = true;
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;

        let mut position = self.position;
        let mut rest = bytes;

        while !rest.is_empty() {
            let tail = self.page_tail_mut(position);
            let chunk_len = tail.len().min(rest.len());
            let (chunk, remainder) = rest.split_at(chunk_len);

            #[expect(
                clippy::indexing_slicing,
                reason = "chunk_len is clipped to the tail length"
            )]
            tail[..chunk_len].copy_from_slice(chunk);

            rest = remainder;
            // Cannot overflow, ensure_mapped() validated the whole range.
            position = position.wrapping_add(chunk_len as u64);
        }

        self.position = position;
        if position > self.size {
            self.size = position;
            self.trailer_stale = true;
        }

        Ok(())
    }

    fn read_bytes(&mut self, into: &mut [u8]) -> Result<()> {
        ensure_remaining(self.position, self.size, into.len())?;
        self.ensure_mapped(self.position, into.len())?;

        let mut position = self.position;
        let mut rest = into;

        while !rest.is_empty() {
            let tail = self.page_tail(position);
            let chunk_len = tail.len().min(rest.len());
            let (chunk, remainder) = mem::take(&mut rest).split_at_mut(chunk_len);

            #[expect(
                clippy::indexing_slicing,
                reason = "chunk_len is clipped to the tail length"
            )]
            chunk.copy_from_slice(&tail[..chunk_len]);

            rest = remainder;
            // Cannot overflow, bounded by size.
            position = position.wrapping_add(chunk_len as u64);
        }

        self.position = position;
        Ok(())
    }
}

impl Drop for PagedBuffer {
    fn drop(&mut self) {
        if !self.trailer_stale {
            return;
        }

        if let Err(error) = self.flush() {
            warn!(%error, "failed to flush paged buffer on drop, the file may not be reopenable");
        }
    }
}

impl fmt::Debug for PagedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedBuffer")
            .field("page_size", &self.page_size)
            .field("mapped_pages", &self.pages.len())
            .field("file_pages", &self.file_pages)
            .field("position", &self.position)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
