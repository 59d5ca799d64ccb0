//! Outbound TLS dialing with the material current at dial time.

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::Result;
use crate::mtls::reloader::Reloader;

impl Reloader {
    /// Run a client handshake over `io` to `server_name`.
    ///
    /// The client configuration is fetched for this dial, so connections
    /// opened after a rotation present the new leaf.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the handshake fails.
    pub async fn connect<IO>(&self, server_name: ServerName<'static>, io: IO) -> Result<TlsStream<IO>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let connector = TlsConnector::from(self.tls_client_config());
        Ok(connector.connect(server_name, io).await?)
    }
}
