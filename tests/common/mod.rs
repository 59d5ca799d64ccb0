//! Shared fixtures for the integration tests
//!
//! - `Authority` / `Leaf`: rcgen-issued certificates
//! - `SecretDir`: a certificate directory laid out like a mounted
//!   Kubernetes secret (`..data` symlink swapped on every publish)
//! - `capture_logs`: thread-local log capture for `#[tokio::test]`
//! - `handshake`: one mTLS handshake over an in-memory duplex pipe

#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    SerialNumber,
};
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tempfile::TempDir;
use tokio_rustls::TlsConnector;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use moco_certreload::Reloader;
use moco_certreload::TlsServerConfig;
use moco_certreload::mtls::{CA_FILE, CERT_FILE, KEY_FILE};

// ─────────────────────────────────────────────────────────────────────────────
// Certificates
// ─────────────────────────────────────────────────────────────────────────────

/// Self-signed CA
pub struct Authority {
    cert: Certificate,
    key: KeyPair,
}

/// Leaf certificate and its key
pub struct Leaf {
    cert: Certificate,
    key: KeyPair,
}

impl Authority {
    pub fn new(cn: &str) -> Self {
        let mut params = CertificateParams::default();
        params.distinguished_name = subject(cn);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    /// Issue a leaf valid for `localhost`
    pub fn issue(&self, cn: &str, serial: &[u8]) -> Leaf {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        params.distinguished_name = subject(cn);
        params.serial_number = Some(SerialNumber::from_slice(serial));

        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        Leaf { cert, key }
    }
}

impl Leaf {
    pub fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }
}

fn subject(cn: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    dn
}

// ─────────────────────────────────────────────────────────────────────────────
// Secret directory
// ─────────────────────────────────────────────────────────────────────────────

/// Certificate directory rotated the way the kubelet rotates a secret
/// volume: every version lands in its own `..N` directory, `..data` is
/// repointed with a rename, and the visible files are symlinks through
/// `..data`.
pub struct SecretDir {
    root: TempDir,
    version: u32,
}

impl SecretDir {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
            version: 0,
        }
    }

    /// Directory to hand to `Reloader::new`
    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Publish a CA bundle and a leaf as the next version
    pub fn publish(&mut self, ca_bundle: &str, leaf: &Leaf) {
        self.publish_files(&[
            (CA_FILE, ca_bundle.to_string()),
            (CERT_FILE, leaf.cert_pem()),
            (KEY_FILE, leaf.key_pem()),
        ]);
    }

    /// Publish arbitrary file contents as the next version
    pub fn publish_files(&mut self, files: &[(&str, String)]) {
        self.version += 1;
        let version = format!("..{}", self.version);
        let versioned = self.path().join(&version);
        fs::create_dir(&versioned).unwrap();
        for (name, contents) in files {
            fs::write(versioned.join(name), contents).unwrap();
        }

        let tmp = self.path().join("..data_tmp");
        std::os::unix::fs::symlink(&version, &tmp).unwrap();
        fs::rename(&tmp, self.path().join("..data")).unwrap();

        for (name, _) in files {
            let visible = self.path().join(name);
            if fs::symlink_metadata(&visible).is_err() {
                std::os::unix::fs::symlink(PathBuf::from("..data").join(name), &visible).unwrap();
            }
        }
    }
}

/// Write the three files directly into `dir`
pub fn write_plain(dir: &Path, ca_bundle: &str, leaf: &Leaf) {
    fs::write(dir.join(CA_FILE), ca_bundle).unwrap();
    fs::write(dir.join(CERT_FILE), leaf.cert_pem()).unwrap();
    fs::write(dir.join(KEY_FILE), leaf.key_pem()).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Log capture
// ─────────────────────────────────────────────────────────────────────────────

/// Formatted log output collected in memory
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture every event on the current thread until the guard is dropped.
///
/// Spans handed to a `Reloader` must be created after this call.
pub fn capture_logs() -> (LogCapture, DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshakes
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one handshake, seen from both ends
pub struct Handshake {
    pub server: moco_certreload::Result<()>,
    pub client: io::Result<()>,
}

/// Handshake between `server` and a client dialing with `client`'s material
pub async fn handshake(server: &TlsServerConfig, client: &Reloader) -> Handshake {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (server, client) = tokio::join!(
        server.accept(server_io),
        client.connect(localhost(), client_io)
    );
    Handshake {
        server: server.map(drop),
        client: client.map(drop).map_err(io::Error::other),
    }
}

/// Handshake between `server` and a client using an arbitrary configuration
pub async fn handshake_with(server: &TlsServerConfig, client: Arc<ClientConfig>) -> Handshake {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let connector = TlsConnector::from(client);
    let (server, client) = tokio::join!(
        server.accept(server_io),
        connector.connect(localhost(), client_io)
    );
    Handshake {
        server: server.map(drop),
        client: client.map(drop),
    }
}

fn localhost() -> ServerName<'static> {
    ServerName::try_from("localhost").unwrap()
}

/// Poll `check` every 10ms until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
