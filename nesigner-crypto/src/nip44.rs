//! NIP-44 v2 envelope.
//!
//! ```text
//! base64( version=0x02 | nonce (32) | chacha20 ciphertext | hmac-sha256 (32) )
//! ```
//!
//! The plaintext is length-prefixed and zero padded to a bucket size before
//! encryption, and the MAC is always checked before anything is decrypted.

use crate::error::{CryptoError, EnvelopeError};
use crate::keys::SecretKey;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const VERSION: u8 = 2;
const SALT: &[u8] = b"nip44-v2";

const NONCE_SIZE: usize = 32;
const MAC_SIZE: usize = 32;

pub const MIN_PLAINTEXT_SIZE: usize = 1;
pub const MAX_PLAINTEXT_SIZE: usize = 65535;

const MIN_ENCODED_SIZE: usize = 132;
const MAX_ENCODED_SIZE: usize = 87472;
const MIN_DECODED_SIZE: usize = 99;
const MAX_DECODED_SIZE: usize = 65603;

/// Symmetric key shared by two parties, derived once per key pair.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ConversationKey([u8; 32]);

#[derive(Zeroize, ZeroizeOnDrop)]
struct MessageKeys {
    chacha_key: [u8; 32],
    chacha_nonce: [u8; 12],
    hmac_key: [u8; 32],
}

impl ConversationKey {
    /// ECDH between `secret` and the x-only `remote` key (lifted with an
    /// even-y prefix), followed by HKDF-extract.
    pub fn derive(secret: &SecretKey, remote: &[u8; 32]) -> Result<Self, CryptoError> {
        let mut sec1 = [0u8; 33];
        sec1[0] = 0x02;
        sec1[1..].copy_from_slice(remote);
        let public = k256::PublicKey::from_sec1_bytes(&sec1)
            .map_err(|_| CryptoError::InvalidPublicKey(hex::encode(remote)))?;

        let shared =
            k256::ecdh::diffie_hellman(secret.to_k256()?.to_nonzero_scalar(), public.as_affine());
        let (prk, _) = Hkdf::<Sha256>::extract(Some(SALT), shared.raw_secret_bytes().as_slice());
        Ok(Self(prk.into()))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypts with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce: [u8; NONCE_SIZE] = rand::random();
        self.encrypt_with_nonce(plaintext, &nonce)
    }

    pub fn encrypt_with_nonce(
        &self,
        plaintext: &str,
        nonce: &[u8; NONCE_SIZE],
    ) -> Result<String, CryptoError> {
        let keys = self.message_keys(nonce)?;

        let mut buf = pad(plaintext.as_bytes())?;
        ChaCha20::new((&keys.chacha_key).into(), (&keys.chacha_nonce).into())
            .apply_keystream(&mut buf);
        let mac = hmac_aad(&keys.hmac_key, &buf, nonce)?;

        let mut data = Vec::with_capacity(1 + NONCE_SIZE + buf.len() + MAC_SIZE);
        data.push(VERSION);
        data.extend_from_slice(nonce);
        data.extend_from_slice(&buf);
        data.extend_from_slice(&mac);

        let encoded = STANDARD.encode(&data);
        if !(MIN_ENCODED_SIZE..=MAX_ENCODED_SIZE).contains(&encoded.len()) {
            return Err(EnvelopeError::PayloadLength(encoded.len()).into());
        }
        Ok(encoded)
    }

    /// Validates and decrypts a base64 envelope.
    pub fn decrypt(&self, payload: &str) -> Result<String, CryptoError> {
        if payload.starts_with('#') {
            return Err(EnvelopeError::UnsupportedMarker.into());
        }
        if !(MIN_ENCODED_SIZE..=MAX_ENCODED_SIZE).contains(&payload.len()) {
            return Err(EnvelopeError::PayloadLength(payload.len()).into());
        }

        let data = STANDARD
            .decode(payload)
            .map_err(|e| EnvelopeError::Base64(e.to_string()))?;
        if !(MIN_DECODED_SIZE..=MAX_DECODED_SIZE).contains(&data.len()) {
            return Err(EnvelopeError::DataLength(data.len()).into());
        }
        if data[0] != VERSION {
            return Err(EnvelopeError::UnknownVersion(data[0]).into());
        }

        let mac_start = data.len() - MAC_SIZE;
        let nonce: &[u8; NONCE_SIZE] = data[1..1 + NONCE_SIZE]
            .try_into()
            .map_err(|_| EnvelopeError::DataLength(data.len()))?;
        let ciphertext = &data[1 + NONCE_SIZE..mac_start];
        let mac = &data[mac_start..];

        let keys = self.message_keys(nonce)?;
        let expected = hmac_aad(&keys.hmac_key, ciphertext, nonce)?;
        if !bool::from(expected.as_slice().ct_eq(mac)) {
            return Err(EnvelopeError::InvalidMac.into());
        }

        let mut padded = Zeroizing::new(ciphertext.to_vec());
        ChaCha20::new((&keys.chacha_key).into(), (&keys.chacha_nonce).into())
            .apply_keystream(&mut padded);
        let plaintext = unpad(&padded)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| EnvelopeError::Utf8.into())
    }

    fn message_keys(&self, nonce: &[u8; NONCE_SIZE]) -> Result<MessageKeys, EnvelopeError> {
        let hk = Hkdf::<Sha256>::from_prk(&self.0).map_err(|_| EnvelopeError::KeyDerivation)?;
        let mut okm = Zeroizing::new([0u8; 76]);
        hk.expand(nonce, okm.as_mut_slice())
            .map_err(|_| EnvelopeError::KeyDerivation)?;

        let mut keys = MessageKeys {
            chacha_key: [0; 32],
            chacha_nonce: [0; 12],
            hmac_key: [0; 32],
        };
        keys.chacha_key.copy_from_slice(&okm[..32]);
        keys.chacha_nonce.copy_from_slice(&okm[32..44]);
        keys.hmac_key.copy_from_slice(&okm[44..]);
        Ok(keys)
    }
}

impl fmt::Debug for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConversationKey(..)")
    }
}

/// Bucketed length a plaintext of `len` bytes is padded to.
pub fn calc_padded_len(len: usize) -> usize {
    if len <= 32 {
        return 32;
    }
    let next_power = 1usize << (usize::BITS - (len - 1).leading_zeros());
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((len - 1) / chunk + 1)
}

/// Big-endian u16 length prefix, plaintext, then zeros up to the bucket size.
pub fn pad(plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let len = plaintext.len();
    if !(MIN_PLAINTEXT_SIZE..=MAX_PLAINTEXT_SIZE).contains(&len) {
        return Err(EnvelopeError::PlaintextSize(len));
    }

    let mut padded = vec![0u8; 2 + calc_padded_len(len)];
    padded[..2].copy_from_slice(&(len as u16).to_be_bytes());
    padded[2..2 + len].copy_from_slice(plaintext);
    Ok(padded)
}

/// Strips padding, rejecting a prefix or total length that disagrees with
/// the bucket size.
pub fn unpad(padded: &[u8]) -> Result<&[u8], EnvelopeError> {
    if padded.len() < 2 {
        return Err(EnvelopeError::Padding);
    }
    let len = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    if len < MIN_PLAINTEXT_SIZE
        || padded.len() < 2 + len
        || padded.len() != 2 + calc_padded_len(len)
    {
        return Err(EnvelopeError::Padding);
    }
    Ok(&padded[2..2 + len])
}

/// HMAC-SHA256 over `aad | message`. The associated data is the nonce and
/// must be exactly 32 bytes.
pub fn hmac_aad(key: &[u8], message: &[u8], aad: &[u8]) -> Result<[u8; MAC_SIZE], EnvelopeError> {
    if aad.len() != NONCE_SIZE {
        return Err(EnvelopeError::AadLength(aad.len()));
    }
    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(key).map_err(|_| EnvelopeError::KeyDerivation)?;
    mac.update(aad);
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}
