//! Streaming frame decoder.

use crate::crc16::Crc16;
use crate::error::ProtocolError;
use crate::frame::{ResponseFrame, WireFrame, CHECKSUM_SIZE};
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, Bytes, BytesMut};
use std::marker::PhantomData;

#[derive(Debug)]
enum DecodeState {
    /// Collecting the fixed-size header.
    AwaitingHeader,
    /// Header parsed; collecting payload and checksum.
    AwaitingPayload { header: Bytes, payload_len: usize },
}

/// Reassembles frames of shape `F` from arbitrarily sized chunks.
///
/// Chunk boundaries may fall anywhere. Bytes beyond the current frame are
/// kept for the next one. Defaults to decoding device responses.
pub struct Decoder<F = ResponseFrame> {
    buffer: BytesMut,
    state: DecodeState,
    max_payload: u32,
    _shape: PhantomData<F>,
}

impl<F: WireFrame> Decoder<F> {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            state: DecodeState::AwaitingHeader,
            max_payload: MAX_PAYLOAD_SIZE,
            _shape: PhantomData,
        }
    }

    /// Sets the largest payload length accepted from a header.
    pub fn with_max_payload(mut self, max_payload: u32) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    ///
    /// Returns `Ok(None)` when more data is needed. A checksum mismatch
    /// consumes as many bytes as the header claimed; whether the next frame
    /// starts there depends on the length field having arrived intact.
    pub fn decode_frame(&mut self) -> Result<Option<F>, ProtocolError> {
        loop {
            match std::mem::replace(&mut self.state, DecodeState::AwaitingHeader) {
                DecodeState::AwaitingHeader => {
                    if self.buffer.len() < F::HEADER_SIZE {
                        return Ok(None);
                    }

                    let header = self.buffer.split_to(F::HEADER_SIZE).freeze();
                    let payload_len = F::payload_len(&header);
                    if payload_len > self.max_payload {
                        return Err(ProtocolError::FrameTooLarge {
                            size: payload_len,
                            max: self.max_payload,
                        });
                    }

                    self.state = DecodeState::AwaitingPayload {
                        header,
                        payload_len: payload_len as usize,
                    };
                }
                DecodeState::AwaitingPayload {
                    header,
                    payload_len,
                } => {
                    if self.buffer.len() < payload_len + CHECKSUM_SIZE {
                        self.state = DecodeState::AwaitingPayload {
                            header,
                            payload_len,
                        };
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(payload_len).freeze();
                    let expected = self.buffer.get_u16();

                    // Empty frames are accepted without checksum verification.
                    if payload_len > 0 {
                        let mut crc = Crc16::new();
                        crc.update(&header);
                        crc.update(&payload);
                        let actual = crc.finish();
                        if actual != expected {
                            return Err(ProtocolError::ChecksumMismatch {
                                correlation_id: F::correlation_id(&header),
                                expected,
                                actual,
                            });
                        }
                    }

                    return F::from_parts(&header, payload).map(Some);
                }
            }
        }
    }

    /// Returns whether the decoder sits on a frame boundary with nothing
    /// buffered.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::AwaitingHeader) && self.buffer.is_empty()
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer and any partially parsed frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = DecodeState::AwaitingHeader;
    }
}

impl<F: WireFrame> Default for Decoder<F> {
    fn default() -> Self {
        Self::new()
    }
}
