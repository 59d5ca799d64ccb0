//! Error types for the certificate reloader

use std::io;

use thiserror::Error;

/// Result type alias for the certificate reloader
pub type Result<T> = std::result::Result<T, Error>;

/// Certificate reloader errors
#[derive(Error, Debug)]
pub enum Error {
    /// `ca.crt` could not be read
    #[error("failed to load ca.crt: {0}")]
    CaRead(#[source] io::Error),

    /// `tls.crt` / `tls.key` could not be read, parsed, or do not match
    #[error("failed to load cert/key pair: {0}")]
    KeyPairLoad(String),

    /// The peer finished its handshake without presenting a certificate
    #[error("no client cert")]
    NoClientCert,

    /// The peer's leaf certificate carries an unexpected common name
    #[error("invalid certificate: common name is not valid: {0}")]
    InvalidPeerIdentity(String),

    /// TLS protocol error
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// `run` was called while a refresher is already active
    #[error("certificate refresher is already running")]
    AlreadyRunning,

    /// `run` was called after the refresher was cancelled
    #[error("certificate refresher has been stopped")]
    Stopped,
}

impl Error {
    /// Returns `true` for rejections decided by the peer policy.
    #[must_use]
    pub fn is_peer_rejection(&self) -> bool {
        matches!(self, Self::NoClientCert | Self::InvalidPeerIdentity(_))
    }
}
