//! Upstream endpoint management.
//!
//! A [`Backend`] owns one upstream address: it dials traffic connections,
//! probes the upstream for liveness on a fixed interval, and tracks the
//! upstream-side handles of live connection pairs.
//!
//! Health is two-sided: the periodic probe both promotes and demotes, while a
//! failed traffic dial only demotes. A backend demoted by traffic stays out
//! of selection until the next successful probe, so a borderline upstream
//! cannot flap back in on a single lucky connect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::conn::{ConnHandle, ConnManager};
use super::error::{ProxyError, ProxyResult};
use crate::config::{parse_host_port, ConfigResult};

/// Default timeout for traffic and probe dials.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Default interval between health probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// One upstream endpoint.
pub struct Backend {
    /// Upstream address as `host:port`; resolved at dial time.
    addr: String,

    /// Timeout applied to every dial.
    dial_timeout: Duration,

    /// Interval between health probes.
    probe_interval: Duration,

    /// Last observed health state. Starts false; the initial probe runs
    /// immediately on start.
    active: AtomicBool,

    /// Live upstream-side handles keyed by identifier.
    connections: RwLock<HashMap<u64, Arc<ConnHandle>>>,

    /// Identifier source for wrapped connections.
    next_id: AtomicU64,

    /// Shutdown token shared with the owning application.
    shutdown: CancellationToken,
}

impl Backend {
    /// Create a backend for the given upstream address.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::config::ConfigError`] if `address` does not split
    /// as `host:port`.
    pub fn new(address: &str, shutdown: CancellationToken) -> ConfigResult<Self> {
        parse_host_port(address)?;

        Ok(Self {
            addr: address.to_string(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            active: AtomicBool::new(false),
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            shutdown,
        })
    }

    /// Override dial timeout and probe interval.
    #[must_use]
    pub fn with_timing(mut self, dial_timeout: Duration, probe_interval: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self.probe_interval = probe_interval;
        self
    }

    /// Get the upstream address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.addr
    }

    /// Last observed health state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Number of live connections tracked by this backend.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .expect("connections lock poisoned")
            .len()
    }

    /// Run the backend until shutdown.
    ///
    /// Spawns the health-probe loop, waits for cancellation, then closes and
    /// drains every tracked connection.
    pub async fn run(self: Arc<Self>) {
        let probe = tokio::spawn(Arc::clone(&self).probe_loop());

        self.shutdown.cancelled().await;

        info!(backend = %self.addr, "closing backend connections");
        let drained: Vec<Arc<ConnHandle>> = {
            let mut conns = self.connections.write().expect("connections lock poisoned");
            conns.drain().map(|(_, conn)| conn).collect()
        };
        for conn in &drained {
            conn.close();
        }

        let _ = probe.await;
    }

    /// Periodic liveness probe; the first check fires immediately on start.
    async fn probe_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.probe_interval);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => self.probe().await,
            }
        }
    }

    /// One probe dial. The probe socket is dropped either way; a probe
    /// failure never touches established traffic connections.
    async fn probe(&self) {
        match self.try_dial().await {
            Ok(stream) => {
                drop(stream);
                self.set_active(true);
            },
            Err(e) => {
                debug!(backend = %self.addr, error = %e, "health probe failed");
                self.set_active(false);
            },
        }
    }

    /// Open a new upstream connection for traffic.
    ///
    /// A failure demotes the backend immediately (passive health marking);
    /// success does NOT promote it; only the probe does.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Dial`] on connect failure or timeout.
    pub async fn dial(&self) -> ProxyResult<TcpStream> {
        match self.try_dial().await {
            Ok(stream) => {
                debug!(backend = %self.addr, "new upstream connection");
                Ok(stream)
            },
            Err(e) => {
                debug!(backend = %self.addr, error = %e, "upstream dial failed");
                self.set_active(false);
                Err(ProxyError::Dial {
                    address: self.addr.clone(),
                    source: e,
                })
            },
        }
    }

    async fn try_dial(&self) -> std::io::Result<TcpStream> {
        match timeout(self.dial_timeout, TcpStream::connect(self.addr.as_str())).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timeout",
            )),
        }
    }

    /// Flip the health flag; logs only on an actual transition.
    pub(crate) fn set_active(&self, active: bool) {
        if self
            .active
            .compare_exchange(!active, active, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            info!(backend = %self.addr, active, "backend health changed");
        }
    }
}

impl ConnManager for Backend {
    fn next_conn_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn add_conn(&self, conn: Arc<ConnHandle>) {
        let mut conns = self.connections.write().expect("connections lock poisoned");

        // Checked under the lock so a registration cannot slip past the
        // shutdown drain.
        if self.shutdown.is_cancelled() {
            drop(conns);
            conn.close();
            return;
        }

        conns.insert(conn.id(), conn);
    }

    fn del_conn(&self, conn: &ConnHandle) {
        if self.shutdown.is_cancelled() {
            return;
        }

        let mut conns = self.connections.write().expect("connections lock poisoned");
        conns.remove(&conn.id());
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("addr", &self.addr)
            .field("active", &self.is_active())
            .field("connections", &self.connection_count())
            .finish()
    }
}
