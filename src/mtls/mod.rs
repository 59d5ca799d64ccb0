//! Hot-reloading mutual TLS credentials.
//!
//! The MOCO agent serves the controller over mTLS with credentials that
//! cert-manager rotates inside a mounted secret. This module keeps the
//! credentials of such a directory loaded and hands out rustls
//! configurations for both directions.
//!
//! # Architecture
//!
//! ```text
//! Reloader::run (every interval)
//!   → Material::load(dir)        ca.crt, tls.crt, tls.key → pool, key pair, ClientConfig
//!   → build_server_config        pool → PeerPolicyVerifier, chain → ServerConfig
//!   → publish under write lock   (failure: log, keep previous)
//!
//! TlsServerConfig::accept        client hello → current ServerConfig → handshake
//!   → WebPki chain check         against the pool of that same material
//!   → PeerPolicy                 leaf CN == "moco-controller"
//!
//! Reloader::tls_client_config    current ClientConfig (snapshot)
//! ```
//!
//! # Modules
//!
//! - [`material`]: directory loading (`Material`)
//! - [`identity`]: X.509 field extraction (`LeafInfo`)
//! - [`policy`]: peer Common Name allow-list (`PeerPolicy`)
//! - [`verifier`]: rustls `ClientCertVerifier` applying the policy
//! - [`reloader`]: shared state and the refresher (`Reloader`, `Phase`)
//! - [`server`]: per-handshake server configuration (`TlsServerConfig`)

mod client;
pub mod identity;
pub mod material;
pub mod policy;
pub mod reloader;
pub mod server;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use identity::LeafInfo;
pub use material::{CA_FILE, CERT_FILE, KEY_FILE, Material};
pub use policy::{CONTROLLER_COMMON_NAME, PeerPolicy};
pub use reloader::{Phase, Reloader};
pub use server::TlsServerConfig;
pub use verifier::PeerPolicyVerifier;
