//! Client error types.

use nesigner_crypto::CryptoError;
use nesigner_protocol::{MessageType, ProtocolError, ResultCode};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("not connected")]
    NotConnected,

    #[error("transport closed")]
    TransportClosed,

    #[error("request timeout")]
    Timeout,

    #[error("device rejected {message_type}: result {}", display_result(.result))]
    Rejected {
        message_type: MessageType,
        result: u16,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

fn display_result(result: &u16) -> String {
    match ResultCode::try_from(*result) {
        Ok(code) => code.to_string(),
        Err(_) => result.to_string(),
    }
}

impl ClientError {
    /// Returns the device result code carried by a rejection.
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            ClientError::Rejected { result, .. } => ResultCode::try_from(*result).ok(),
            _ => None,
        }
    }

    /// Returns whether the session can no longer be used after this error.
    ///
    /// A checksum mismatch ends the session. Padding and envelope failures
    /// only abort the operation that hit them.
    pub fn is_session_fatal(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::TransportClosed => true,
            ClientError::NotConnected => true,
            ClientError::Protocol(e) => e.desynchronizes_stream(),
            _ => false,
        }
    }
}
