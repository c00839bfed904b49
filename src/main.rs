//! nesigner - Command-line client for nesigner hardware signers
//!
//! Talks to a device through a serial-over-TCP bridge and runs one operation
//! per invocation.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use nesigner_client::{connect_tcp, Nesigner, Signer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nesigner")]
#[command(about = "Command-line client for nesigner hardware Nostr signers")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = "NESIGNER_CONFIG")]
    config: Option<PathBuf>,

    /// Device bridge address (overrides config)
    #[arg(short, long)]
    addr: Option<SocketAddr>,

    /// Device PIN
    #[arg(short, long, env = "NESIGNER_PIN", hide_env_values = true)]
    pin: Option<String>,

    /// Request timeout in seconds, 0 waits forever (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Measure round trip latency
    Ping,

    /// Print the device public key
    Pubkey,

    /// Print the device's one-time provisioning key
    TempPubkey,

    /// NIP-04 encrypt a message for a counterparty
    Nip04Encrypt {
        /// Counterparty public key (hex)
        pubkey: String,
        plaintext: String,
    },

    /// NIP-04 decrypt a message from a counterparty
    Nip04Decrypt {
        /// Counterparty public key (hex)
        pubkey: String,
        ciphertext: String,
    },

    /// NIP-44 encrypt a message for a counterparty
    Nip44Encrypt {
        /// Counterparty public key (hex)
        pubkey: String,
        plaintext: String,
    },

    /// NIP-44 decrypt a message from a counterparty
    Nip44Decrypt {
        /// Counterparty public key (hex)
        pubkey: String,
        ciphertext: String,
    },

    /// Sign an event ID
    Sign {
        /// Event ID (64 hex characters)
        event_id: String,
    },

    /// Send a message through the device and back
    Echo { message: String },

    /// Install a private key under a new PIN
    UpdateKey {
        /// PIN that will protect the installed key
        #[arg(long, env = "NESIGNER_NEW_PIN", hide_env_values = true)]
        new_pin: String,

        /// Private key (hex or nsec1...)
        key: String,
    },

    /// Remove the installed key
    RemoveKey,

    /// Derive the public key for a private key locally
    DerivePubkey {
        /// Private key (hex or nsec1...)
        key: String,
    },
}

impl Commands {
    /// Whether the command needs the session PIN.
    fn needs_pin(&self) -> bool {
        !matches!(
            self,
            Commands::Ping
                | Commands::TempPubkey
                | Commands::UpdateKey { .. }
                | Commands::DerivePubkey { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Handle derive-pubkey locally (no device needed)
    if let Commands::DerivePubkey { key } = &cli.command {
        match commands::derive_pubkey(key) {
            Ok(pubkey) => println!("{}", pubkey),
            Err(e) => {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref()).map_err(|e| {
        tracing::error!("Failed to load config: {}", e);
        e
    })?;
    if let Some(addr) = cli.addr {
        config.device.addr = addr;
    }
    if let Some(secs) = cli.timeout {
        config.session.request_timeout_secs = secs;
    }

    let pin = match cli.pin {
        Some(pin) => pin,
        None if cli.command.needs_pin() => {
            eprintln!(
                "{}: this command needs the device PIN (--pin or NESIGNER_PIN)",
                "Error".red()
            );
            std::process::exit(2);
        }
        None => String::new(),
    };

    let stream = connect_tcp(config.device.addr, config.device.connect_timeout())
        .await
        .map_err(|e| {
            eprintln!("{}: {}", "Connection failed".red(), e);
            e
        })?;
    let signer = Nesigner::with_config(stream, &pin, config.connection_config());

    let outcome = commands::execute(&signer, &pin, cli.command).await;
    if let Err(e) = signer.close().await {
        tracing::debug!("Close failed: {}", e);
    }

    match outcome {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
