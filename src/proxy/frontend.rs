//! Listening endpoints.
//!
//! A [`Frontend`] owns one listening port for an application. It binds with
//! indefinite retry, accepts clients, pairs each accepted socket with an
//! upstream connection chosen by the application, and launches the two relay
//! tasks serving the pair. On shutdown it closes the listener, closes every
//! tracked client handle, and waits for all connection tasks to return.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::application::Application;
use super::buffer::BufferPool;
use super::conn::{Conn, ConnHandle, ConnManager};
use super::error::ProxyError;
use super::relay::{relay, CloseAll};
use crate::config::{ConfigError, ConfigResult};

/// Delay between bind attempts.
pub const BIND_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Pause after an unclassified accept error before retrying.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// One listening port of an application.
pub struct Frontend {
    /// Wildcard listening address.
    laddr: SocketAddr,

    /// Owning application; supplies the upstream connection per accept.
    app: Weak<Application>,

    /// Shared relay buffer pool.
    buf_pool: Arc<BufferPool>,

    /// Live client-side handles keyed by identifier.
    connections: RwLock<HashMap<u64, Arc<ConnHandle>>>,

    /// Identifier source for wrapped connections.
    next_id: AtomicU64,

    /// Total connections accepted.
    total_accepted: AtomicU64,

    /// Whether the listener is currently bound.
    bound: AtomicBool,

    /// Tracks handler and relay tasks so shutdown can await them.
    tasks: TaskTracker,

    /// Shutdown token shared with the owning application.
    shutdown: CancellationToken,
}

impl Frontend {
    /// Create a frontend listening on the given port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPort`] for port 0.
    pub fn new(
        port: u16,
        app: Weak<Application>,
        buf_pool: Arc<BufferPool>,
        shutdown: CancellationToken,
    ) -> ConfigResult<Self> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }

        Ok(Self {
            laddr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            app,
            buf_pool,
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            total_accepted: AtomicU64::new(0),
            bound: AtomicBool::new(false),
            tasks: TaskTracker::new(),
            shutdown,
        })
    }

    /// Get the listening address.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        self.laddr
    }

    /// Whether the listener is currently bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    /// Number of live client connections tracked by this frontend.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .expect("connections lock poisoned")
            .len()
    }

    /// Total connections accepted since start.
    #[must_use]
    pub fn total_accepted(&self) -> u64 {
        self.total_accepted.load(Ordering::Relaxed)
    }

    /// Run the frontend until shutdown: bind (with retry), accept, tear down.
    pub async fn run(self: Arc<Self>) {
        let listener = match self.bind_loop().await {
            Some(listener) => listener,
            None => return,
        };
        self.bound.store(true, Ordering::Release);
        info!(frontend = %self.laddr, "listening");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.total_accepted.fetch_add(1, Ordering::Relaxed);
                        debug!(frontend = %self.laddr, peer = %peer, "accepted connection");

                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %peer, error = %e, "failed to set nodelay");
                        }

                        let frontend = Arc::clone(&self);
                        self.tasks.spawn(async move {
                            frontend.handle_connection(stream).await;
                        });
                    },
                    Err(e) => {
                        let err = ProxyError::Accept {
                            address: self.laddr,
                            source: e,
                        };
                        warn!(error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    },
                },
            }
        }

        // Dropping the listener closes it; nothing new is accepted past here.
        drop(listener);
        self.bound.store(false, Ordering::Release);
        info!(frontend = %self.laddr, "closing listener and connections");

        let drained: Vec<Arc<ConnHandle>> = {
            let mut conns = self.connections.write().expect("connections lock poisoned");
            conns.drain().map(|(_, conn)| conn).collect()
        };
        for conn in &drained {
            conn.close();
        }

        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Try to bind until it succeeds or shutdown is requested.
    async fn bind_loop(&self) -> Option<TcpListener> {
        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }

            match TcpListener::bind(self.laddr).await {
                Ok(listener) => return Some(listener),
                Err(e) => {
                    let err = ProxyError::Bind {
                        address: self.laddr,
                        source: e,
                    };
                    error!(error = %err, "bind failed, retrying");

                    tokio::select! {
                        _ = self.shutdown.cancelled() => return None,
                        _ = tokio::time::sleep(BIND_RETRY_DELAY) => {},
                    }
                },
            }
        }
    }

    /// Pair an accepted client with an upstream connection and start the two
    /// relay directions. Dropping the client stream on any failure path
    /// closes it.
    async fn handle_connection(self: Arc<Self>, client_stream: TcpStream) {
        let Some(app) = self.app.upgrade() else {
            return;
        };

        let (upstream_stream, backend) = match app.create_remote_connection().await {
            Ok(connected) => connected,
            Err(e) => {
                warn!(frontend = %self.laddr, error = %e, "no upstream, dropping client");
                return;
            },
        };
        if let Err(e) = upstream_stream.set_nodelay(true) {
            debug!(frontend = %self.laddr, error = %e, "failed to set nodelay on upstream");
        }

        // One token per pair: the first close of either handle cancels it,
        // unblocking both relay directions.
        let pair = self.shutdown.child_token();

        let backend_mgr: Arc<dyn ConnManager> = backend;
        let upstream = match Conn::wrap(upstream_stream, &backend_mgr, pair.clone()) {
            Ok(conn) => conn,
            Err(e) => {
                debug!(frontend = %self.laddr, error = %e, "upstream connection vanished");
                return;
            },
        };
        backend_mgr.add_conn(upstream.handle());

        let frontend_mgr: Arc<dyn ConnManager> = self.clone() as Arc<dyn ConnManager>;
        let client = match Conn::wrap(client_stream, &frontend_mgr, pair.clone()) {
            Ok(conn) => conn,
            Err(e) => {
                debug!(frontend = %self.laddr, error = %e, "client connection vanished");
                let handle = upstream.handle();
                handle.close();
                backend_mgr.del_conn(&handle);
                return;
            },
        };
        frontend_mgr.add_conn(client.handle());

        let close_all = Arc::new(CloseAll::new(client.handle(), upstream.handle()));
        let (client_read, client_write) = client.split();
        let (upstream_read, upstream_write) = upstream.split();

        self.tasks.spawn(relay(
            client_read,
            upstream_write,
            Arc::clone(&self.buf_pool),
            pair.clone(),
            Arc::clone(&close_all),
        ));
        self.tasks.spawn(relay(
            upstream_read,
            client_write,
            Arc::clone(&self.buf_pool),
            pair,
            close_all,
        ));
    }
}

impl ConnManager for Frontend {
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

impl std::fmt::Debug for Frontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frontend")
            .field("laddr", &self.laddr)
            .field("bound", &self.is_bound())
            .field("connections", &self.connection_count())
            .finish()
    }
}
