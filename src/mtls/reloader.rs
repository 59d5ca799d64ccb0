//! Hot-reloading credential holder.
//!
//! [`Reloader`] owns the current [`Material`] of one certificate directory
//! together with the server configuration derived from it. A refresher task
//! ([`Reloader::run`]) polls the directory at a fixed interval; every
//! successful load replaces the whole set under a write lock, every failed
//! load is logged and leaves the previous set authoritative.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use moco_certreload::Reloader;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> moco_certreload::Result<()> {
//! let reloader = Reloader::new("/grpc-cert", tracing::info_span!("agent-client"))?;
//! let cancel = CancellationToken::new();
//! let refresher = reloader.spawn(cancel.clone(), Duration::from_secs(3600));
//!
//! let client_config = reloader.tls_client_config();
//! # drop(client_config);
//! cancel.cancel();
//! # let _ = refresher.await;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustls::{ClientConfig, ServerConfig};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info};

use crate::mtls::material::Material;
use crate::mtls::policy::PeerPolicy;
use crate::mtls::server::{TlsServerConfig, build_server_config};
use crate::{Error, Result};

/// Longest period the refresher schedules; larger intervals mean "never"
/// in practice and are clamped so the deadline stays representable.
const MAX_PERIOD: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a [`Reloader`].
///
/// A reloader only exists once its initial load succeeded, so it starts in
/// `Loaded`. Reload failures do not change the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, refresher not started.
    Loaded,
    /// Refresher running.
    Running,
    /// Refresher cancelled; material stays readable.
    Stopped,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reloader
// ─────────────────────────────────────────────────────────────────────────────

/// Holder of the current credentials of a certificate directory.
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Debug, Clone)]
pub struct Reloader {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    dir: PathBuf,
    span: Span,
    policy: PeerPolicy,
    current: RwLock<Arc<Current>>,
    phase: Mutex<Phase>,
    // Held across load and publish so overlapping reloads publish in order.
    reload_lock: Mutex<()>,
}

/// Everything derived from one load, published as a single pointer.
#[derive(Debug)]
pub(crate) struct Current {
    pub(crate) material: Arc<Material>,
    pub(crate) server_config: Arc<ServerConfig>,
}

impl Reloader {
    /// Load credentials from `dir` and accept only the controller as peer.
    ///
    /// All log events of the reloader are emitted inside `span`.
    ///
    /// # Errors
    ///
    /// Returns the loader's error (`Error::CaRead` or `Error::KeyPairLoad`)
    /// when the directory does not hold valid material.
    pub fn new(dir: impl Into<PathBuf>, span: Span) -> Result<Self> {
        Self::with_policy(dir, span, PeerPolicy::default())
    }

    /// Like [`Reloader::new`] with an explicit peer policy.
    ///
    /// # Errors
    ///
    /// Same as [`Reloader::new`].
    pub fn with_policy(dir: impl Into<PathBuf>, span: Span, policy: PeerPolicy) -> Result<Self> {
        let dir = dir.into();
        let current = load_current(&dir, &policy, &span)?;
        log_reloaded(&span, &current.material);

        Ok(Self {
            shared: Arc::new(Shared {
                dir,
                span,
                policy,
                current: RwLock::new(Arc::new(current)),
                phase: Mutex::new(Phase::Loaded),
                reload_lock: Mutex::new(()),
            }),
        })
    }

    /// Directory the material is loaded from.
    pub fn dir(&self) -> &Path {
        &self.shared.dir
    }

    /// Peer policy enforced on inbound handshakes.
    pub fn policy(&self) -> &PeerPolicy {
        &self.shared.policy
    }

    pub(crate) fn span(&self) -> &Span {
        &self.shared.span
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *self.shared.phase.lock()
    }

    /// Snapshot of the current material.
    pub fn material(&self) -> Arc<Material> {
        Arc::clone(&self.current().material)
    }

    pub(crate) fn current(&self) -> Arc<Current> {
        Arc::clone(&self.shared.current.read())
    }

    /// Client configuration of the current material.
    ///
    /// The returned configuration is a snapshot. Callers that keep it across
    /// a rotation keep using the old credentials; call this at dial time.
    pub fn tls_client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(self.current().material.client_config())
    }

    /// Server-side trampoline resolving the current material on every
    /// handshake.
    pub fn tls_server_config(&self) -> TlsServerConfig {
        TlsServerConfig::new(self.clone())
    }

    /// Load the directory once and, on success, publish the result.
    ///
    /// File reads and config building happen before the write lock is taken,
    /// so readers are not blocked by I/O. Concurrent calls, including the
    /// refresher's, are serialized: the last load to finish is the newest.
    ///
    /// # Errors
    ///
    /// Returns the loader's error; the current material is left untouched.
    pub fn reload(&self) -> Result<()> {
        let shared = &self.shared;
        let _serialized = shared.reload_lock.lock();
        let current = Arc::new(load_current(&shared.dir, &shared.policy, &shared.span)?);
        let material = Arc::clone(&current.material);

        *shared.current.write() = current;

        log_reloaded(&shared.span, &material);
        Ok(())
    }

    /// Reload every `interval` until `cancel` fires.
    ///
    /// The first reload happens one interval after the call. Cancellation is
    /// checked before each reload, so a cancelled token never triggers
    /// another load.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if `interval` is zero
    ///
    /// Intervals longer than thirty years are clamped.
    /// - `Error::AlreadyRunning` if another `run` is active
    /// - `Error::Stopped` if a previous `run` was cancelled
    pub async fn run(&self, cancel: CancellationToken, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::Config("reload interval must be non-zero".to_string()));
        }
        let _running = self.start()?;

        self.refresh_loop(&cancel, interval)
            .instrument(self.shared.span.clone())
            .await;
        Ok(())
    }

    /// Spawn [`Reloader::run`] onto the current tokio runtime.
    pub fn spawn(&self, cancel: CancellationToken, interval: Duration) -> JoinHandle<Result<()>> {
        let reloader = self.clone();
        tokio::spawn(async move { reloader.run(cancel, interval).await })
    }

    fn start(&self) -> Result<RunningGuard<'_>> {
        let mut phase = self.shared.phase.lock();
        match *phase {
            Phase::Loaded => {
                *phase = Phase::Running;
                Ok(RunningGuard(&self.shared))
            }
            Phase::Running => Err(Error::AlreadyRunning),
            Phase::Stopped => Err(Error::Stopped),
        }
    }

    async fn refresh_loop(&self, cancel: &CancellationToken, interval: Duration) {
        let period = interval.min(MAX_PERIOD);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(dir = %self.shared.dir.display(), ?interval, "certificate refresher started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.reload() {
                error!(error = %e, "failed to reload certificates");
            }
        }
        debug!("certificate refresher stopped");
    }
}

/// Moves the phase to `Stopped` when `run` returns or its future is dropped.
struct RunningGuard<'a>(&'a Shared);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        *self.0.phase.lock() = Phase::Stopped;
    }
}

fn load_current(dir: &Path, policy: &PeerPolicy, span: &Span) -> Result<Current> {
    let material = Material::load(dir)?;
    let server_config = build_server_config(&material, policy.clone(), span.clone())?;
    Ok(Current {
        material: Arc::new(material),
        server_config: Arc::new(server_config),
    })
}

fn log_reloaded(span: &Span, material: &Material) {
    let leaf = material.leaf();
    span.in_scope(|| {
        info!(
            serial = %leaf.serial,
            common_name = %leaf.common_name,
            "certificate reloaded"
        );
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
