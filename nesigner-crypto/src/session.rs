//! PIN-derived session cipher (AES-128-CBC with PKCS7 padding).
//!
//! The session key is the raw MD5 digest of the UTF-8 PIN. This is not a
//! slow hash; the device rate-limits PIN attempts on its side.

use crate::error::CryptoError;
use crate::BLOCK_SIZE;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// 16-byte symmetric key shared with the device for routine operations.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; BLOCK_SIZE]);

impl SessionKey {
    /// Derives the session key for a PIN.
    pub fn from_pin(pin: &str) -> Self {
        Self(Md5::digest(pin.as_bytes()).into())
    }

    pub fn from_bytes(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.0
    }

    /// Lowercase hex form, as embedded in the provisioning plaintext.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Encrypts `plaintext` under this key and `iv`, PKCS7-padded.
    pub fn encrypt(&self, iv: &[u8; BLOCK_SIZE], plaintext: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.0.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Decrypts `ciphertext` and strips its PKCS7 padding.
    ///
    /// Fails with [`CryptoError::Padding`] if the ciphertext is not a whole
    /// number of blocks or the padding bytes are malformed.
    pub fn decrypt(&self, iv: &[u8; BLOCK_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Aes128CbcDec::new(&self.0.into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CryptoError::Padding)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}
