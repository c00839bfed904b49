//! Protocol error types.

use crate::message::CorrelationId;
use thiserror::Error;

/// Protocol-level errors that can occur during framing.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("checksum mismatch on frame {correlation_id}: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch {
        correlation_id: CorrelationId,
        expected: u16,
        actual: u16,
    },

    #[error("unknown message type: {0}")]
    UnknownMessageType(u16),

    #[error("unknown result code: {0}")]
    UnknownResultCode(u16),

    #[error("invalid public key: {reason}")]
    InvalidPublicKey { reason: String },
}

impl ProtocolError {
    /// Returns whether the byte stream can no longer be trusted to be aligned
    /// on frame boundaries after this error.
    ///
    /// A checksum mismatch counts: the corrupt bytes may include the length
    /// field the decoder used to find the end of the frame.
    pub fn desynchronizes_stream(&self) -> bool {
        matches!(
            self,
            ProtocolError::FrameTooLarge { .. } | ProtocolError::ChecksumMismatch { .. }
        )
    }
}
