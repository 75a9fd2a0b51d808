//! Error types for segment access.

use std::io;
use std::str::Utf8Error;

use crate::layout::MAX_TEXT_LEN;

/// Errors surfaced by [`crate::StateBus`] operations.
///
/// Every error is local to the operation that produced it; no operation
/// retries or poisons other fields.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Neither creating nor attaching the shared segment succeeded.
    ///
    /// This is fatal for the calling process: without a segment there is
    /// nothing to read or write.
    #[error("shared state segment unavailable: {0}")]
    Segment(#[from] io::Error),

    /// A text payload exceeded the 255-byte field limit. The field was
    /// left untouched.
    #[error("text payload is {len} bytes, fields hold at most {MAX_TEXT_LEN}")]
    TextTooLong { len: usize },

    /// The stored state byte is outside the known range. The segment was
    /// either never initialized or written by an incompatible peer.
    #[error("stored state byte {0} does not map to a known host state")]
    UnknownState(u8),

    /// A stored text payload is not valid UTF-8. Only reachable when a
    /// writer raced this read at the region level.
    #[error("stored text is not valid UTF-8: {0}")]
    Utf8(#[from] Utf8Error),

    /// A free-window access would cross the end of the window.
    #[error("free window access at offset {offset} with length {len} is out of bounds")]
    OutOfBounds { offset: usize, len: usize },
}
