//! Command execution.

use crate::Commands;
use colored::Colorize;
use nesigner_client::{Nesigner, Signer};
use nesigner_crypto::SecretKey;
use nesigner_protocol::PublicKey;

/// Executes a device command and returns the formatted output.
pub async fn execute(
    signer: &Nesigner,
    pin: &str,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::DerivePubkey { key } => derive_pubkey(&key),

        Commands::Ping => {
            let latency = signer.ping().await?;
            Ok(format!("{} ({} ms)", "PONG".green(), latency.as_millis()))
        }

        Commands::Pubkey => match signer.get_public_key().await? {
            Some(pubkey) => Ok(pubkey.to_hex()),
            None => Ok("No key installed".yellow().to_string()),
        },

        Commands::TempPubkey => Ok(signer.get_temp_pubkey().await?.to_hex()),

        Commands::Nip04Encrypt { pubkey, plaintext } => {
            let pubkey: PublicKey = pubkey.parse()?;
            Ok(signer.nip04_encrypt(&pubkey, &plaintext).await?)
        }

        Commands::Nip04Decrypt { pubkey, ciphertext } => {
            let pubkey: PublicKey = pubkey.parse()?;
            Ok(signer.nip04_decrypt(&pubkey, &ciphertext).await?)
        }

        Commands::Nip44Encrypt { pubkey, plaintext } => {
            let pubkey: PublicKey = pubkey.parse()?;
            Ok(signer.nip44_encrypt(&pubkey, &plaintext).await?)
        }

        Commands::Nip44Decrypt { pubkey, ciphertext } => {
            let pubkey: PublicKey = pubkey.parse()?;
            Ok(signer.nip44_decrypt(&pubkey, &ciphertext).await?)
        }

        Commands::Sign { event_id } => {
            let event_id = parse_event_id(&event_id)?;
            let signature = signer.sign(&event_id).await?;
            Ok(hex::encode(signature))
        }

        Commands::Echo { message } => Ok(signer.echo(pin, &message).await?),

        Commands::UpdateKey { new_pin, key } => {
            signer.update_key(&new_pin, &key).await?;
            let pubkey = signer.get_public_key().await?.unwrap_or_default();
            Ok(format!("{} key {}", "Installed".green(), pubkey.to_hex().cyan()))
        }

        Commands::RemoveKey => {
            signer.remove_key(pin).await?;
            Ok("Removed key".green().to_string())
        }
    }
}

/// Derives the public key for a secret key without touching a device.
pub fn derive_pubkey(key: &str) -> Result<String, Box<dyn std::error::Error>> {
    let secret = SecretKey::parse(key)?;
    Ok(hex::encode(secret.x_only_public_key()?))
}

fn parse_event_id(input: &str) -> Result<[u8; 32], Box<dyn std::error::Error>> {
    let bytes = hex::decode(input)?;
    let event_id: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("event ID must be 32 bytes, got {}", b.len()))?;
    Ok(event_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_pubkey() {
        let pubkey = derive_pubkey(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(
            pubkey,
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );

        assert!(derive_pubkey("zz").is_err());
    }

    #[test]
    fn test_parse_event_id() {
        let id = parse_event_id(&"ab".repeat(32)).unwrap();
        assert_eq!(id, [0xab; 32]);

        let err = parse_event_id("abcd").unwrap_err();
        assert!(err.to_string().contains("32 bytes"));
        assert!(parse_event_id("xyz").is_err());
    }
}
