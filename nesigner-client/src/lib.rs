//! # nesigner-client
//!
//! Host-side session engine for nesigner hardware signers.
//!
//! This crate provides:
//! - Request/response correlation over a single byte-stream transport
//! - Serialized writes so concurrent requests never interleave on the wire
//! - The [`Signer`] operation set backed by a device session

pub mod client;
pub mod connection;
pub mod error;
pub mod transport;

#[cfg(test)]
mod mock;

pub use client::{Nesigner, Signer};
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
pub use transport::{connect_tcp, TransportReader, TransportWriter};
