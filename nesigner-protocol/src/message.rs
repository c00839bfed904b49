//! Message types, result codes and the identifiers carried in frame headers.

use crate::error::ProtocolError;
use crate::{CORRELATION_ID_SIZE, PUBKEY_SIZE};
use std::fmt;
use std::str::FromStr;

/// Operation requested by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    Ping = 0,
    NostrGetPublicKey = 1,
    NostrSignEvent = 2,
    NostrGetRelays = 3,
    NostrNip04Encrypt = 4,
    NostrNip04Decrypt = 5,
    NostrNip44Encrypt = 6,
    NostrNip44Decrypt = 7,
    Echo = 11,
    UpdateKey = 12,
    RemoveKey = 13,
    GetTempPubkey = 14,
}

impl MessageType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Ping),
            1 => Ok(MessageType::NostrGetPublicKey),
            2 => Ok(MessageType::NostrSignEvent),
            3 => Ok(MessageType::NostrGetRelays),
            4 => Ok(MessageType::NostrNip04Encrypt),
            5 => Ok(MessageType::NostrNip04Decrypt),
            6 => Ok(MessageType::NostrNip44Encrypt),
            7 => Ok(MessageType::NostrNip44Decrypt),
            11 => Ok(MessageType::Echo),
            12 => Ok(MessageType::UpdateKey),
            13 => Ok(MessageType::RemoveKey),
            14 => Ok(MessageType::GetTempPubkey),
            _ => Err(ProtocolError::UnknownMessageType(value)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Ping => write!(f, "PING"),
            MessageType::NostrGetPublicKey => write!(f, "NOSTR_GET_PUBLIC_KEY"),
            MessageType::NostrSignEvent => write!(f, "NOSTR_SIGN_EVENT"),
            MessageType::NostrGetRelays => write!(f, "NOSTR_GET_RELAYS"),
            MessageType::NostrNip04Encrypt => write!(f, "NOSTR_NIP04_ENCRYPT"),
            MessageType::NostrNip04Decrypt => write!(f, "NOSTR_NIP04_DECRYPT"),
            MessageType::NostrNip44Encrypt => write!(f, "NOSTR_NIP44_ENCRYPT"),
            MessageType::NostrNip44Decrypt => write!(f, "NOSTR_NIP44_DECRYPT"),
            MessageType::Echo => write!(f, "ECHO"),
            MessageType::UpdateKey => write!(f, "UPDATE_KEY"),
            MessageType::RemoveKey => write!(f, "REMOVE_KEY"),
            MessageType::GetTempPubkey => write!(f, "GET_TEMP_PUBKEY"),
        }
    }
}

/// Result code reported by the device in a response frame.
///
/// These codes are part of the device contract and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResultCode {
    Fail = 0,
    Ok = 1,
    KeyNotFound = 101,
    ContentNotAllowEmpty = 102,
    ContentIllegal = 103,
}

impl ResultCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }
}

impl TryFrom<u16> for ResultCode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResultCode::Fail),
            1 => Ok(ResultCode::Ok),
            101 => Ok(ResultCode::KeyNotFound),
            102 => Ok(ResultCode::ContentNotAllowEmpty),
            103 => Ok(ResultCode::ContentIllegal),
            _ => Err(ProtocolError::UnknownResultCode(value)),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Fail => write!(f, "FAIL"),
            ResultCode::Ok => write!(f, "OK"),
            ResultCode::KeyNotFound => write!(f, "KEY_NOT_FOUND"),
            ResultCode::ContentNotAllowEmpty => write!(f, "CONTENT_NOT_ALLOW_EMPTY"),
            ResultCode::ContentIllegal => write!(f, "CONTENT_ILLEGAL"),
        }
    }
}

/// Random token linking a request to its response.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub [u8; CORRELATION_ID_SIZE]);

impl CorrelationId {
    /// Generates a fresh random correlation ID.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn from_bytes(bytes: [u8; CORRELATION_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CORRELATION_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({})", self)
    }
}

/// A 32-byte x-only Nostr public key as carried in frame headers.
///
/// The all-zero value is the "no specific counterparty" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PublicKey(pub [u8; PUBKEY_SIZE]);

impl PublicKey {
    /// The all-zero sentinel key.
    pub const SENTINEL: PublicKey = PublicKey([0u8; PUBKEY_SIZE]);

    pub fn from_bytes(bytes: [u8; PUBKEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a key from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let bytes: [u8; PUBKEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| ProtocolError::InvalidPublicKey {
                    reason: format!("expected {} bytes, got {}", PUBKEY_SIZE, bytes.len()),
                })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_SIZE] {
        &self.0
    }

    pub fn is_sentinel(&self) -> bool {
        self.0 == [0u8; PUBKEY_SIZE]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for PublicKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| ProtocolError::InvalidPublicKey {
            reason: e.to_string(),
        })?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}
