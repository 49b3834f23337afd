//! Write-ahead log.
//!
//! - [`record`]: record framing and the fold checksum
//! - [`logger`]: the durable append-only log with bad-tail removal and replay

pub mod logger;
pub mod record;

pub use logger::{Logger, LOG_SUFFIX};
pub use record::{fold, FrameHeader, LOG_HEADER_LEN};
