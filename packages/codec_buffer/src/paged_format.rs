//! Trailer that follows the last page of a paged file and pins its format parameters.
//!
//! ```text
//! offset  len  field
//!      0    8  magic "CBPAGED\0"
//!      8    4  format version
//!     12    4  page shift
//!     16    8  logical size in bytes
//!     24    8  page count
//! ```
//!
//! All integers are big-endian, like everything else this crate writes.

use crate::{Error, Result};

pub(crate) const TRAILER_LEN: usize = 32;

const MAGIC: [u8; 8] = *b"CBPAGED\0";
const FORMAT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Trailer {
    pub(crate) page_shift: u32,
    pub(crate) size: u64,
    pub(crate) page_count: u64,
}

impl Trailer {
    pub(crate) fn encode(&self) -> [u8; TRAILER_LEN] {
        let mut bytes = [0_u8; TRAILER_LEN];
        let (magic, rest) = bytes.split_at_mut(8);
        let (version, rest) = rest.split_at_mut(4);
        let (shift, rest) = rest.split_at_mut(4);
        let (size, page_count) = rest.split_at_mut(8);

        magic.copy_from_slice(&MAGIC);
        version.copy_from_slice(&FORMAT_VERSION.to_be_bytes());
        shift.copy_from_slice(&self.page_shift.to_be_bytes());
        size.copy_from_slice(&self.size.to_be_bytes());
        page_count.copy_from_slice(&self.page_count.to_be_bytes());

        bytes
    }

    pub(crate) fn decode(bytes: &[u8; TRAILER_LEN]) -> Result<Self> {
        let (magic, rest) = bytes.split_at(8);
        let (version, rest) = rest.split_at(4);
        let (shift, rest) = rest.split_at(4);
        let (size, page_count) = rest.split_at(8);

        if magic != MAGIC {
            return Err(corrupt("trailer magic not found"));
        }

        let version = u32::from_be_bytes(to_array(version));
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {version}")));
        }

        Ok(Self {
            page_shift: u32::from_be_bytes(to_array(shift)),
            size: u64::from_be_bytes(to_array(size)),
            page_count: u64::from_be_bytes(to_array(page_count)),
        })
    }
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    bytes
        .try_into()
        .expect("split points above match the field widths")
}

pub(crate) fn corrupt(reason: impl Into<String>) -> Error {
    Error::CorruptFile {
        reason: reason.into(),
    }
}
