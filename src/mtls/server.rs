//! Inbound TLS: per-handshake configuration.
//!
//! A listener built once keeps serving across rotations because it never
//! holds a `ServerConfig` itself. [`TlsServerConfig`] reads the client hello,
//! asks the [`Reloader`] for the configuration of the current material, and
//! only then continues the handshake with it.

use std::io;
use std::sync::Arc;

use rustls::server::{Acceptor, ClientHello};
use rustls::{CertificateError, ServerConfig};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::LazyConfigAcceptor;
use tokio_rustls::server::TlsStream;
use tracing::{Span, debug, error};

use crate::mtls::material::Material;
use crate::mtls::policy::PeerPolicy;
use crate::mtls::reloader::Reloader;
use crate::mtls::verifier::PeerPolicyVerifier;
use crate::{Error, Result};

/// Build the server configuration of one material: present its chain,
/// require a client certificate issued by its pool, apply `policy`.
pub(crate) fn build_server_config(
    material: &Material,
    policy: PeerPolicy,
    span: Span,
) -> Result<ServerConfig> {
    let verifier = PeerPolicyVerifier::new(
        Arc::clone(material.roots()),
        material.provider(),
        policy,
        span,
    );

    ServerConfig::builder_with_provider(Arc::clone(material.provider()))
        .with_safe_default_protocol_versions()
        .and_then(|builder| {
            builder
                .with_client_cert_verifier(Arc::new(verifier))
                .with_single_cert(material.chain().to_vec(), material.key().clone_key())
        })
        .map_err(|e| Error::KeyPairLoad(format!("TLS server config error: {e}")))
}

/// Trampoline server configuration returned by
/// [`Reloader::tls_server_config`].
#[derive(Debug, Clone)]
pub struct TlsServerConfig {
    reloader: Reloader,
}

impl TlsServerConfig {
    pub(crate) fn new(reloader: Reloader) -> Self {
        Self { reloader }
    }

    /// Configuration for one handshake, resolved from the material current
    /// at the time of the call. The client hello is not consulted.
    pub fn config_for_client(&self, _hello: &ClientHello<'_>) -> Arc<ServerConfig> {
        Arc::clone(&self.reloader.current().server_config)
    }

    /// Accept one inbound connection.
    ///
    /// # Errors
    ///
    /// - `Error::NoClientCert` if the peer sent no certificate
    /// - `Error::InvalidPeerIdentity` if the peer policy rejected the leaf
    /// - `Error::Tls` for any other TLS failure, `Error::Io` for transport
    ///   failures
    pub async fn accept<IO>(&self, io: IO) -> Result<TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let start = LazyConfigAcceptor::new(Acceptor::default(), io)
            .await
            .map_err(handshake_error)?;
        let config = self.config_for_client(&start.client_hello());

        start.into_stream(config).await.map_err(|e| {
            let err = handshake_error(e);
            // The verifier already logged policy rejections it decided itself.
            self.reloader.span().in_scope(|| match &err {
                Error::NoClientCert => error!(error = %err, "connection refused"),
                err if !err.is_peer_rejection() => debug!(error = %err, "TLS handshake failed"),
                _ => {}
            });
            err
        })
    }
}

/// Recover the rustls error, and a peer-policy verdict inside it, from the
/// `io::Error` tokio-rustls reports.
fn handshake_error(err: io::Error) -> Error {
    let tls = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .cloned();
    let Some(tls) = tls else {
        return Error::Io(err);
    };

    if let rustls::Error::InvalidCertificate(CertificateError::Other(other)) = &tls {
        if let Some(Error::InvalidPeerIdentity(cn)) = other.0.downcast_ref::<Error>() {
            return Error::InvalidPeerIdentity(cn.clone());
        }
    }

    match tls {
        rustls::Error::NoCertificatesPresented => Error::NoClientCert,
        tls => Error::Tls(tls),
    }
}
