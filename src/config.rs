//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::mtls::PeerPolicy;
use crate::{Error, Result};

/// Mount path of the agent's gRPC certificate secret.
pub const DEFAULT_CERT_DIR: &str = "/grpc-cert";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding `ca.crt`, `tls.crt` and `tls.key`
    pub cert_dir: PathBuf,
    /// Poll interval of the refresher
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Allow-listed peer Common Name; `None` keeps `moco-controller`
    pub common_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
            interval: Duration::from_secs(3600),
            common_name: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Later sources win: defaults, then the YAML file, then
    /// `MOCO_CERTRELOAD_*` environment variables. The result is not
    /// validated; apply command-line overrides first, then call
    /// [`Config::validate`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("MOCO_CERTRELOAD_").split("__"));

        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply command-line overrides on top of the loaded values.
    pub fn apply_overrides(&mut self, cert_dir: Option<&Path>, interval: Option<Duration>) {
        if let Some(dir) = cert_dir {
            self.cert_dir = dir.to_path_buf();
        }
        if let Some(interval) = interval {
            self.interval = interval;
        }
    }

    /// Reject values the refresher cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero interval or an empty Common Name.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Config("interval must be non-zero".to_string()));
        }
        if self.common_name.as_deref().is_some_and(str::is_empty) {
            return Err(Error::Config("common_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Peer policy for inbound handshakes.
    pub fn peer_policy(&self) -> PeerPolicy {
        self.common_name
            .as_deref()
            .map_or_else(PeerPolicy::default, PeerPolicy::with_common_name)
    }
}
