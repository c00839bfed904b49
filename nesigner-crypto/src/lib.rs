//! # nesigner-crypto
//!
//! Cryptographic envelopes used between a host and a nesigner device.
//!
//! - [`session`]: PIN-derived AES-128-CBC cipher for routine operations
//! - [`nip44`]: NIP-44 v2 envelope used once per key provisioning
//! - [`keys`]: secret key parsing and x-only public key derivation

pub mod error;
pub mod keys;
pub mod nip44;
pub mod session;

pub use error::{CryptoError, EnvelopeError};
pub use keys::SecretKey;
pub use nip44::ConversationKey;
pub use session::SessionKey;

/// AES block and IV size in bytes.
pub const BLOCK_SIZE: usize = 16;
