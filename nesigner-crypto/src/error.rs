//! Crypto error types.

use thiserror::Error;

/// Errors raised by the session cipher, NIP-44 envelope and key handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid PKCS7 padding or ciphertext length")]
    Padding,

    #[error("invalid NIP-44 payload: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
}

/// Reasons a NIP-44 payload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("invalid payload length: {0}")]
    PayloadLength(usize),

    #[error("unknown encryption version {0}")]
    UnknownVersion(u8),

    #[error("unsupported encryption version marker")]
    UnsupportedMarker,

    #[error("invalid base64: {0}")]
    Base64(String),

    #[error("invalid data length: {0}")]
    DataLength(usize),

    #[error("invalid MAC")]
    InvalidMac,

    #[error("associated data must be 32 bytes, got {0}")]
    AadLength(usize),

    #[error("invalid plaintext size {0}: must be between 1 and 65535 bytes")]
    PlaintextSize(usize),

    #[error("invalid padding")]
    Padding,

    #[error("plaintext is not valid UTF-8")]
    Utf8,

    #[error("key derivation failed")]
    KeyDerivation,
}
