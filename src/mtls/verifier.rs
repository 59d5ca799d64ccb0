//! Client certificate verifier enforcing the peer policy.
//!
//! Chain validation is delegated to rustls' `WebPkiClientVerifier` built from
//! the pool of one [`Material`](crate::mtls::Material); the [`PeerPolicy`]
//! runs on the end-entity afterwards. The verifier captures its pool, so a
//! handshake verifies against the same material that supplied the server's
//! own certificate.

use std::sync::Arc;

use rustls::client::danger::HandshakeSignatureValid;
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{
    CertificateError, DigitallySignedStruct, DistinguishedName, Error as TlsError, OtherError,
    RootCertStore, SignatureScheme,
};
use tracing::{Span, error};

use crate::mtls::policy::PeerPolicy;

/// `ClientCertVerifier` that requires a client certificate, validates it
/// against a fixed pool, then applies a [`PeerPolicy`].
#[derive(Debug)]
pub struct PeerPolicyVerifier {
    chain: Option<Arc<dyn ClientCertVerifier>>,
    algorithms: WebPkiSupportedAlgorithms,
    policy: PeerPolicy,
    span: Span,
}

impl PeerPolicyVerifier {
    /// Build a verifier over `roots`. Rejections are logged inside `span`.
    pub fn new(
        roots: Arc<RootCertStore>,
        provider: &Arc<CryptoProvider>,
        policy: PeerPolicy,
        span: Span,
    ) -> Self {
        // An empty pool has no anchors to build from; it rejects every client.
        let chain = WebPkiClientVerifier::builder_with_provider(roots, Arc::clone(provider))
            .build()
            .ok();

        Self {
            chain,
            algorithms: provider.signature_verification_algorithms,
            policy,
            span,
        }
    }
}

impl ClientCertVerifier for PeerPolicyVerifier {
    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        match &self.chain {
            Some(chain) => chain.root_hint_subjects(),
            None => &[],
        }
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, TlsError> {
        let Some(chain) = &self.chain else {
            return Err(TlsError::InvalidCertificate(CertificateError::UnknownIssuer));
        };
        chain.verify_client_cert(end_entity, intermediates, now)?;

        if let Err(err) = self.policy.check(std::slice::from_ref(end_entity)) {
            self.span
                .in_scope(|| error!(error = %err, "connection refused"));
            return Err(TlsError::InvalidCertificate(CertificateError::Other(
                OtherError(Arc::new(err)),
            )));
        }

        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
