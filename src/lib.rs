//! MOCO certificate reloader
//!
//! Keeps the mutual-TLS credentials of a mounted secret directory loaded
//! while cert-manager rotates them, and hands out rustls configurations for
//! outbound dials and inbound listeners.
//!
//! # Features
//!
//! - **Hot reload**: polls `ca.crt`, `tls.crt`, `tls.key` and swaps all three
//!   atomically; a broken rotation keeps the last good set
//! - **Per-handshake resolution**: listeners pick up new material without
//!   being rebuilt
//! - **Peer identity**: inbound clients must present a certificate whose
//!   Common Name is `moco-controller`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod mtls;

pub use error::{Error, Result};
pub use mtls::{Material, PeerPolicy, Phase, Reloader, TlsServerConfig};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install subscriber: {e}"))),
        _ => subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to install subscriber: {e}"))),
    }
}
