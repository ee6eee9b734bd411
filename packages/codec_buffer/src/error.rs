use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when encoding into or decoding from a buffer, or when leasing
/// buffers from a pool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A read (or a reposition) tried to touch bytes beyond the valid contents of the buffer.
    #[error(
        "out of bounds: {requested} bytes requested at position {position} but buffer size is {size}"
    )]
    OutOfBounds {
        /// The position at which the access started.
        position: u64,

        /// The number of bytes the caller tried to access.
        requested: u64,

        /// The number of valid bytes in the buffer.
        size: u64,
    },

    /// The buffer would have to grow beyond the largest size it is allowed to reach.
    #[error("capacity exceeded: {requested} bytes requested but the limit is {max}")]
    CapacityExceeded {
        /// The capacity that would have been needed to satisfy the request.
        requested: u64,

        /// The largest capacity the buffer may have.
        max: u64,
    },

    /// The buffer was opened for reading only.
    #[error("buffer is not writable")]
    NotWritable,

    /// The buffer was opened for writing only.
    #[error("buffer is not readable")]
    NotReadable,

    /// A variable-length integer still had its continuation bit set after the maximum number of
    /// bytes its type can occupy.
    #[error("malformed varint: continuation bit set after {max_bytes} bytes")]
    MalformedVarInt {
        /// How many bytes the encoding of the target type may occupy at most.
        max_bytes: usize,
    },

    /// No pooled buffer became available in time.
    ///
    /// `timeout` is `None` if the caller did not permit any waiting.
    #[error("buffer pool exhausted (waited {timeout:?})")]
    PoolExhausted {
        /// How long the caller waited before giving up.
        timeout: Option<Duration>,
    },

    /// A paged file was reopened with a different page size than it was written with.
    #[error(
        "page size mismatch: file was written with page shift {found_shift} but opened with {expected_shift}"
    )]
    PageSizeMismatch {
        /// The page shift the caller asked for.
        expected_shift: u32,

        /// The page shift recorded in the file.
        found_shift: u32,
    },

    /// A paged file does not carry a valid format trailer.
    #[error("corrupt paged file: {reason}")]
    CorruptFile {
        /// A human-readable description of the problem.
        reason: String,
    },

    /// The operating system reported an I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A specialized `Result` type for buffer operations, returning the crate's [`Error`] type as
/// the error value.
pub type Result<T> = std::result::Result<T, Error>;
