//! Log record framing and the fold checksum.
//!
//! Log file layout, all integers big-endian:
//!
//! ```text
//! [global checksum: u32] ([size: u32] [checksum: u32] [payload: size bytes])*
//! ```

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

/// Multiplier of the fold checksum.
pub const SEED: u32 = 13331;

/// Length of the file header holding the global checksum.
pub const LOG_HEADER_LEN: u64 = 4;

const OF_SIZE: usize = 0;
const OF_CHECKSUM: usize = OF_SIZE + 4;
/// Offset of the payload within a record frame.
pub const OF_DATA: usize = OF_CHECKSUM + 4;

/// Folds `bytes` into `acc`: `acc = acc * 13331 + b` with 32-bit wraparound.
pub fn fold(acc: u32, bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(acc, |acc, &b| acc.wrapping_mul(SEED).wrapping_add(b as u32))
}

/// Frames a payload as `[size][checksum][payload]`.
pub fn encode(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(OF_DATA + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_u32(fold(0, payload));
    buf.put_slice(payload);
    buf.freeze()
}

/// Fixed-size prefix of a record frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub size: u32,
    pub checksum: u32,
}

impl FrameHeader {
    pub fn parse(raw: &[u8; OF_DATA]) -> Self {
        Self {
            size: BigEndian::read_u32(&raw[OF_SIZE..OF_CHECKSUM]),
            checksum: BigEndian::read_u32(&raw[OF_CHECKSUM..OF_DATA]),
        }
    }

    /// Length of the whole frame, header included.
    pub fn frame_len(&self) -> u64 {
        OF_DATA as u64 + self.size as u64
    }

    pub fn verifies(&self, payload: &[u8]) -> bool {
        payload.len() == self.size as usize && fold(0, payload) == self.checksum
    }
}
