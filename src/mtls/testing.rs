//! Certificate fixtures for unit tests.

use std::fs;
use std::path::Path;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    SerialNumber,
};

use super::material::{CA_FILE, CERT_FILE, KEY_FILE};

/// A self-signed CA able to issue leaves.
pub(crate) struct Authority {
    cert: Certificate,
    key: KeyPair,
}

/// A leaf certificate and its private key.
pub(crate) struct Leaf {
    cert: Certificate,
    key: KeyPair,
}

impl Authority {
    pub(crate) fn new(cn: &str) -> Self {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub(crate) fn pem(&self) -> String {
        self.cert.pem()
    }

    pub(crate) fn issue(&self, cn: &str, serial: &[u8]) -> Leaf {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;
        params.serial_number = Some(SerialNumber::from_slice(serial));

        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        Leaf { cert, key }
    }
}

impl Leaf {
    pub(crate) fn der(&self) -> &[u8] {
        self.cert.der()
    }

    pub(crate) fn cert_pem(&self) -> String {
        self.cert.pem()
    }

    pub(crate) fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }
}

/// Write `ca.crt`, `tls.crt` and `tls.key` into `dir`.
pub(crate) fn write_dir(dir: &Path, ca: &Authority, leaf: &Leaf) {
    fs::write(dir.join(CA_FILE), ca.pem()).unwrap();
    fs::write(dir.join(CERT_FILE), leaf.cert_pem()).unwrap();
    fs::write(dir.join(KEY_FILE), leaf.key_pem()).unwrap();
}
