//! Secret key parsing and x-only public key derivation.

use crate::error::CryptoError;
use bech32::Hrp;
use k256::elliptic_curve::point::AffineCoordinates;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const NSEC_HRP: Hrp = Hrp::parse_unchecked("nsec");

/// A secp256k1 secret key held only for the duration of a provisioning call.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    /// Parses a key given as 64 hex characters or as a bech32 `nsec1...`
    /// string.
    pub fn parse(input: &str) -> Result<Self, CryptoError> {
        let input = input.trim();
        let is_nsec = input
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("nsec1"));
        if is_nsec && input.len() > 5 {
            Self::from_nsec(input)
        } else {
            Self::from_hex(input)
        }
    }

    pub fn from_hex(input: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            hex::decode(input).map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))?,
        );
        Self::from_slice(&bytes)
    }

    pub fn from_nsec(input: &str) -> Result<Self, CryptoError> {
        let (hrp, data) =
            bech32::decode(input).map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))?;
        let data = Zeroizing::new(data);
        if hrp != NSEC_HRP {
            return Err(CryptoError::InvalidSecretKey(format!(
                "expected nsec prefix, got {}",
                hrp.to_lowercase()
            )));
        }
        Self::from_slice(&data)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSecretKey(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Self::from_bytes(bytes)
    }

    /// Accepts any scalar in `[1, n)`.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let key = Self(bytes);
        key.to_k256()?;
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form, as embedded in the provisioning plaintext.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }

    /// BIP-340 x-only public key (the Nostr public key).
    pub fn x_only_public_key(&self) -> Result<[u8; 32], CryptoError> {
        let public = self.to_k256()?.public_key();
        Ok(public.as_affine().x().into())
    }

    pub(crate) fn to_k256(&self) -> Result<k256::SecretKey, CryptoError> {
        k256::SecretKey::from_bytes((&self.0).into())
            .map_err(|_| CryptoError::InvalidSecretKey("scalar out of range".to_string()))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}
