//! Certificate identity extraction.
//!
//! Parses X.509 DER certificates and extracts the fields the reloader cares
//! about: the subject Common Name (peer policy) and the serial number and
//! validity window of the loaded leaf (reload logging, `check` output).

use serde::Serialize;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Leaf summary
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of a leaf certificate, computed once when material is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafInfo {
    /// Subject Common Name, empty when the subject has none.
    pub common_name: String,

    /// Serial number as colon-separated hex (`"0b:01"`).
    pub serial: String,

    /// Start of the validity window.
    pub not_before: String,

    /// End of the validity window.
    pub not_after: String,
}

impl LeafInfo {
    /// Parse a DER-encoded certificate and summarise it.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyPairLoad` if the certificate cannot be parsed.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::KeyPairLoad(format!("failed to parse leaf certificate: {e}")))?;

        let validity = cert.validity();
        Ok(Self {
            common_name: extract_cn(&cert).unwrap_or_default(),
            serial: cert.raw_serial_as_string(),
            not_before: validity.not_before.to_string(),
            not_after: validity.not_after.to_string(),
        })
    }
}

/// Subject Common Name of a DER certificate.
///
/// Returns `None` when the certificate does not parse or has no CN.
pub fn common_name(der: &[u8]) -> Option<String> {
    let (_, cert) = X509Certificate::from_der(der).ok()?;
    extract_cn(&cert)
}

fn extract_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}
