//! Binary frame formats.
//!
//! Requests and responses use different layouts. Both end in a CRC16 over
//! every preceding byte of the frame.
//!
//! Request (70 bytes header + payload + 2 bytes checksum):
//!
//! ```text
//! +----------+----------------+---------+---------+-------------+
//! | msg_type | correlation_id | pubkey  | iv      | payload_len |
//! | 2 bytes  | 16 bytes       | 32 bytes| 16 bytes| 4 bytes     |
//! +----------+----------------+---------+---------+-------------+
//! | payload                                      | crc16        |
//! | payload_len bytes                            | 2 bytes      |
//! +----------------------------------------------+--------------+
//! ```
//!
//! Response (72 bytes header + payload + 2 bytes checksum):
//!
//! ```text
//! +----------+----------------+---------+---------+---------+-------------+
//! | msg_type | correlation_id | result  | pubkey  | iv      | payload_len |
//! | 2 bytes  | 16 bytes       | 2 bytes | 32 bytes| 16 bytes| 4 bytes     |
//! +----------+----------------+---------+---------+---------+-------------+
//! | payload                                              | crc16          |
//! | payload_len bytes                                    | 2 bytes        |
//! +------------------------------------------------------+----------------+
//! ```

use crate::crc16::crc16;
use crate::error::ProtocolError;
use crate::message::{CorrelationId, MessageType, PublicKey, ResultCode};
use crate::{CORRELATION_ID_SIZE, IV_SIZE, MAX_PAYLOAD_SIZE, PUBKEY_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the request header in bytes (2+16+32+16+4 = 70).
pub const REQUEST_HEADER_SIZE: usize = 70;

/// Size of the response header in bytes (2+16+2+32+16+4 = 72).
pub const RESPONSE_HEADER_SIZE: usize = 72;

/// Size of the trailing checksum in bytes.
pub const CHECKSUM_SIZE: usize = 2;

/// A frame shape the streaming decoder can reassemble.
///
/// Every shape keeps the correlation ID at offset 2 and ends its header with
/// the big-endian payload length.
pub trait WireFrame: Sized {
    /// Fixed header size, excluding payload and checksum.
    const HEADER_SIZE: usize;

    /// Reads the payload length from a complete header.
    fn payload_len(header: &[u8]) -> u32 {
        let n = Self::HEADER_SIZE;
        u32::from_be_bytes([header[n - 4], header[n - 3], header[n - 2], header[n - 1]])
    }

    /// Reads the correlation ID from a complete header.
    fn correlation_id(header: &[u8]) -> CorrelationId {
        let mut id = [0u8; CORRELATION_ID_SIZE];
        id.copy_from_slice(&header[2..2 + CORRELATION_ID_SIZE]);
        CorrelationId::from_bytes(id)
    }

    /// Builds the frame from a verified header and payload.
    fn from_parts(header: &[u8], payload: Bytes) -> Result<Self, ProtocolError>;

    /// Encodes the frame, checksum included.
    fn encode(&self) -> Result<BytesMut, ProtocolError>;
}

fn checked_payload_len(len: usize) -> Result<u32, ProtocolError> {
    let size = u32::try_from(len).unwrap_or(u32::MAX);
    if size > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(size)
}

fn seal(mut buf: BytesMut) -> BytesMut {
    let crc = crc16(&buf);
    buf.put_u16(crc);
    buf
}

/// A frame sent from the host to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub message_type: MessageType,
    pub correlation_id: CorrelationId,
    /// Counterparty or active key; `PublicKey::SENTINEL` when none applies.
    pub pubkey: PublicKey,
    pub iv: [u8; IV_SIZE],
    pub payload: Bytes,
}

impl RequestFrame {
    pub fn new(
        message_type: MessageType,
        correlation_id: CorrelationId,
        pubkey: PublicKey,
        iv: [u8; IV_SIZE],
        payload: Bytes,
    ) -> Self {
        Self {
            message_type,
            correlation_id,
            pubkey,
            iv,
            payload,
        }
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        REQUEST_HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }
}

impl WireFrame for RequestFrame {
    const HEADER_SIZE: usize = REQUEST_HEADER_SIZE;

    fn from_parts(mut header: &[u8], payload: Bytes) -> Result<Self, ProtocolError> {
        let message_type = MessageType::try_from(header.get_u16())?;

        let mut id = [0u8; CORRELATION_ID_SIZE];
        header.copy_to_slice(&mut id);

        let mut pubkey = [0u8; PUBKEY_SIZE];
        header.copy_to_slice(&mut pubkey);

        let mut iv = [0u8; IV_SIZE];
        header.copy_to_slice(&mut iv);

        Ok(Self {
            message_type,
            correlation_id: CorrelationId::from_bytes(id),
            pubkey: PublicKey::from_bytes(pubkey),
            iv,
            payload,
        })
    }

    fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let payload_len = checked_payload_len(self.payload.len())?;
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        buf.put_u16(self.message_type.as_u16());
        buf.put_slice(self.correlation_id.as_bytes());
        buf.put_slice(self.pubkey.as_bytes());
        buf.put_slice(&self.iv);
        buf.put_u32(payload_len);
        buf.put_slice(&self.payload);

        Ok(seal(buf))
    }
}

/// A frame sent from the device back to the host.
///
/// Message type and result are kept as raw codes so that a response carrying
/// a code this host does not know can still be routed to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub message_type: u16,
    pub correlation_id: CorrelationId,
    pub result: u16,
    pub pubkey: PublicKey,
    pub iv: [u8; IV_SIZE],
    pub payload: Bytes,
}

impl ResponseFrame {
    pub fn new(
        message_type: MessageType,
        correlation_id: CorrelationId,
        result: ResultCode,
        pubkey: PublicKey,
        iv: [u8; IV_SIZE],
        payload: Bytes,
    ) -> Self {
        Self {
            message_type: message_type.as_u16(),
            correlation_id,
            result: result.as_u16(),
            pubkey,
            iv,
            payload,
        }
    }

    /// Returns the result code, if it is one this host knows.
    pub fn result_code(&self) -> Option<ResultCode> {
        ResultCode::try_from(self.result).ok()
    }

    pub fn is_ok(&self) -> bool {
        self.result == ResultCode::Ok.as_u16()
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        RESPONSE_HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }
}

impl WireFrame for ResponseFrame {
    const HEADER_SIZE: usize = RESPONSE_HEADER_SIZE;

    fn from_parts(mut header: &[u8], payload: Bytes) -> Result<Self, ProtocolError> {
        let message_type = header.get_u16();

        let mut id = [0u8; CORRELATION_ID_SIZE];
        header.copy_to_slice(&mut id);

        let result = header.get_u16();

        let mut pubkey = [0u8; PUBKEY_SIZE];
        header.copy_to_slice(&mut pubkey);

        let mut iv = [0u8; IV_SIZE];
        header.copy_to_slice(&mut iv);

        Ok(Self {
            message_type,
            correlation_id: CorrelationId::from_bytes(id),
            result,
            pubkey: PublicKey::from_bytes(pubkey),
            iv,
            payload,
        })
    }

    fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let payload_len = checked_payload_len(self.payload.len())?;
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        buf.put_u16(self.message_type);
        buf.put_slice(self.correlation_id.as_bytes());
        buf.put_u16(self.result);
        buf.put_slice(self.pubkey.as_bytes());
        buf.put_slice(&self.iv);
        buf.put_u32(payload_len);
        buf.put_slice(&self.payload);

        Ok(seal(buf))
    }
}
