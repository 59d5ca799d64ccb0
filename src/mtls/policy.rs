//! Peer identity policy.
//!
//! The agent only serves the controller. After the chain has been verified
//! against the current CA pool, the leaf's subject Common Name must equal
//! the allow-listed name. SANs are not consulted.

use rustls::pki_types::CertificateDer;

use crate::mtls::identity;
use crate::{Error, Result};

/// Common Name the controller's client certificate is issued with.
pub const CONTROLLER_COMMON_NAME: &str = "moco-controller";

/// Allow-list of the peer's subject Common Name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPolicy {
    common_name: String,
}

impl Default for PeerPolicy {
    fn default() -> Self {
        Self {
            common_name: CONTROLLER_COMMON_NAME.to_string(),
        }
    }
}

impl PeerPolicy {
    /// Accept peers whose leaf carries `common_name` instead of
    /// [`CONTROLLER_COMMON_NAME`].
    #[must_use]
    pub fn with_common_name(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
        }
    }

    /// The allow-listed Common Name.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Check a peer certificate list, end-entity first.
    ///
    /// # Errors
    ///
    /// - `Error::NoClientCert` if the list is empty
    /// - `Error::InvalidPeerIdentity` with the observed CN (empty when the
    ///   leaf has none) if it differs from the allow-listed name
    pub fn check(&self, peer_certs: &[CertificateDer<'_>]) -> Result<()> {
        let Some(leaf) = peer_certs.first() else {
            return Err(Error::NoClientCert);
        };

        let cn = identity::common_name(leaf).unwrap_or_default();
        if cn != self.common_name {
            return Err(Error::InvalidPeerIdentity(cn));
        }
        Ok(())
    }
}
