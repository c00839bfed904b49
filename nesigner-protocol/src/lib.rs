//! # nesigner-protocol
//!
//! Wire protocol implementation for nesigner hardware signers.
//!
//! This crate provides:
//! - CRC16 (CCITT, init 0xFFFF) frame checksums
//! - Request and response frame layouts (they are not symmetric)
//! - A streaming decoder that reassembles frames from arbitrary chunks
//! - Message type and result code tables

pub mod codec;
pub mod crc16;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::Decoder;
pub use crc16::{crc16, Crc16};
pub use error::ProtocolError;
pub use frame::{
    RequestFrame, ResponseFrame, WireFrame, CHECKSUM_SIZE, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE,
};
pub use message::{CorrelationId, MessageType, PublicKey, ResultCode};

/// Size of the per-frame initialization vector in bytes.
pub const IV_SIZE: usize = 16;

/// Size of a correlation ID in bytes.
pub const CORRELATION_ID_SIZE: usize = 16;

/// Size of an x-only public key in bytes.
pub const PUBKEY_SIZE: usize = 32;

/// Maximum frame payload size accepted by default (128 KiB).
///
/// Large enough for an AES-wrapped maximal NIP-44 payload (87472 bytes).
pub const MAX_PAYLOAD_SIZE: u32 = 128 * 1024;
