#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Byte buffers for serialization codecs, with growable, file-backed and pooled variants.
//!
//! Every buffer implements [`CodecBuffer`]: a cursor over a byte region with symmetric
//! write/read pairs for varints, fixed-width big-endian integers and raw byte ranges. A caller
//! writes a sequence of values, calls [`flip()`][CodecBuffer::flip] and reads the same sequence
//! back in the same order.
//!
//! * [`GrowableBuffer`] - one contiguous heap or aligned direct region that grows geometrically.
//! * [`PagedBuffer`] - a file mapped lazily in fixed-size power-of-two pages, for data that is
//!   too large for one allocation or must survive a restart.
//! * [`BufferPool`] - a bounded, blocking pool of reusable buffers handed out as [`Lease`]s.
//! * [`ResourceCleaner`] - runs cleanup callbacks for resources whose owners were dropped
//!   without releasing them.
//!
//! # Example
//!
//! ```
//! use codec_buffer::{CodecBuffer, GrowableBuffer};
//!
//! let mut buffer = GrowableBuffer::new();
//!
//! buffer.write_var_i32(16384)?;
//! buffer.write_i64(i64::MIN)?;
//! buffer.write_buffer(b"payload")?;
//!
//! buffer.flip();
//!
//! assert_eq!(buffer.read_var_i32()?, 16384);
//! assert_eq!(buffer.read_i64()?, i64::MIN);
//! assert_eq!(buffer.read_buffer(7)?, b"payload");
//! # Ok::<(), codec_buffer::Error>(())
//! ```
//!
//! # Format
//!
//! Varints are unsigned LEB128 of the two's-complement bit pattern, without zig-zag, so negative
//! values always take the maximum length. Fixed-width integers are big-endian, see
//! [`BYTE_ORDER`]. Files written by [`PagedBuffer`] carry their page size and must be reopened
//! with the same one.
//!
//! # Thread safety
//!
//! Buffers are not internally synchronized. [`BufferPool`] and [`ResourceCleaner`] are safe to
//! share between threads.

mod buffer_pool;
mod cleaner;
mod cleaner_builder;
mod cleanup_token;
mod contract;
mod error;
mod growable_buffer;
mod growable_builder;
mod lease;
mod page_size;
mod paged_buffer;
mod paged_format;
mod pool_builder;
mod storage;
mod varint;

pub use buffer_pool::*;
pub use cleaner::*;
pub use cleaner_builder::*;
pub use cleanup_token::*;
pub use contract::*;
pub use error::*;
pub use growable_buffer::*;
pub use growable_builder::*;
pub use lease::*;
pub use page_size::*;
pub use paged_buffer::*;
pub use pool_builder::*;
pub(crate) use storage::Storage;
pub use storage::*;
pub use varint::*;
