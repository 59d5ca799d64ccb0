//! Credential material: loading the CA bundle and key pair from a directory.
//!
//! Provides:
//! - [`Material::load`]: read `ca.crt`, `tls.crt`, `tls.key` and derive the
//!   outbound `rustls::ClientConfig`
//! - [`CA_FILE`] / [`CERT_FILE`] / [`KEY_FILE`]: the file names of the
//!   mounted-secret layout
//!
//! # File format
//!
//! All files are expected in **PEM format**, the layout cert-manager writes
//! into a `kubernetes.io/tls` secret.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::{CryptoProvider, aws_lc_rs};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, RootCertStore};

use crate::mtls::identity::LeafInfo;
use crate::{Error, Result};

/// CA bundle used to verify peers.
pub const CA_FILE: &str = "ca.crt";
/// Leaf certificate, optionally followed by intermediates.
pub const CERT_FILE: &str = "tls.crt";
/// Private key of the leaf.
pub const KEY_FILE: &str = "tls.key";

// ─────────────────────────────────────────────────────────────────────────────
// Material
// ─────────────────────────────────────────────────────────────────────────────

/// One consistent set of credentials: trusted roots, leaf key pair, and the
/// client configuration derived from them.
///
/// A `Material` is immutable. The reloader replaces it as a whole, so the
/// pool, the key pair and the client config always come from the same load.
#[derive(Debug)]
pub struct Material {
    roots: Arc<RootCertStore>,
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_config: Arc<ClientConfig>,
    leaf: LeafInfo,
    provider: Arc<CryptoProvider>,
}

impl Material {
    /// Load material from `dir`.
    ///
    /// An empty or unparseable `ca.crt` is accepted and yields an empty pool
    /// that trusts nothing.
    ///
    /// # Errors
    ///
    /// - `Error::CaRead` if `ca.crt` cannot be read
    /// - `Error::KeyPairLoad` if `tls.crt` / `tls.key` cannot be read or
    ///   parsed, or the private key does not match the leaf
    pub fn load(dir: &Path) -> Result<Self> {
        let provider = Arc::new(aws_lc_rs::default_provider());

        let ca_pem = fs::read(dir.join(CA_FILE)).map_err(Error::CaRead)?;
        let roots = Arc::new(parse_pool(&ca_pem));

        let chain = load_certs(&dir.join(CERT_FILE))?;
        let key = load_private_key(&dir.join(KEY_FILE))?;
        check_key_pair(&provider, &chain, &key)?;
        let leaf = LeafInfo::from_der(&chain[0])?;

        let client_config = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .and_then(|builder| {
                builder
                    .with_root_certificates(Arc::clone(&roots))
                    .with_client_auth_cert(chain.clone(), key.clone_key())
            })
            .map_err(|e| Error::KeyPairLoad(format!("TLS client config error: {e}")))?;

        Ok(Self {
            roots,
            chain,
            key,
            client_config: Arc::new(client_config),
            leaf,
            provider,
        })
    }

    /// Trusted roots parsed from `ca.crt`.
    pub fn roots(&self) -> &Arc<RootCertStore> {
        &self.roots
    }

    /// Leaf certificate followed by any intermediates from `tls.crt`.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Private key from `tls.key`.
    pub fn key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }

    /// Outbound configuration: trusts [`roots`](Self::roots) and presents the
    /// leaf as client certificate.
    pub fn client_config(&self) -> &Arc<ClientConfig> {
        &self.client_config
    }

    /// Summary of the leaf certificate.
    pub fn leaf(&self) -> &LeafInfo {
        &self.leaf
    }

    /// Crypto provider every configuration of this material is built with.
    pub fn provider(&self) -> &Arc<CryptoProvider> {
        &self.provider
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PEM loading
// ─────────────────────────────────────────────────────────────────────────────

/// Parse every certificate block of a PEM bundle into a pool, skipping
/// blocks that do not parse.
fn parse_pool(pem: &[u8]) -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader).filter_map(std::result::Result::ok);
    roots.add_parsable_certificates(certs);
    roots
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem_data = read_file(path)?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut pem_data.as_slice())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            Error::KeyPairLoad(format!(
                "failed to parse certificates from '{}': {e}",
                path.display()
            ))
        })?;

    if certs.is_empty() {
        return Err(Error::KeyPairLoad(format!(
            "no certificates found in '{}'",
            path.display()
        )));
    }

    Ok(certs)
}

/// Load the first private key; RSA, PKCS#8 and SEC1 blocks are accepted.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem_data = read_file(path)?;
    rustls_pemfile::private_key(&mut pem_data.as_slice())
        .map_err(|e| {
            Error::KeyPairLoad(format!(
                "failed to parse private key from '{}': {e}",
                path.display()
            ))
        })?
        .ok_or_else(|| {
            Error::KeyPairLoad(format!("no private key found in '{}'", path.display()))
        })
}

/// The private key must be usable by the provider and match the leaf's
/// public key.
fn check_key_pair(
    provider: &CryptoProvider,
    chain: &[CertificateDer<'static>],
    key: &PrivateKeyDer<'static>,
) -> Result<()> {
    let signing_key = provider
        .key_provider
        .load_private_key(key.clone_key())
        .map_err(|e| Error::KeyPairLoad(format!("unsupported private key: {e}")))?;

    CertifiedKey::new(chain.to_vec(), signing_key)
        .keys_match()
        .map_err(|e| Error::KeyPairLoad(format!("private key does not match public key: {e}")))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path)
        .map_err(|e| Error::KeyPairLoad(format!("cannot read '{}': {e}", path.display())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
