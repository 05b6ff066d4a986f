//! Applications (tenants).
//!
//! An application bundles the frontends and backends of one tenant behind a
//! shared shutdown token and picks the upstream for every accepted client:
//! the active backend with the fewest live connections, ties broken by
//! configuration order.

use std::sync::{Arc, RwLock};

use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::backend::Backend;
use super::buffer::BufferPool;
use super::error::{ProxyError, ProxyResult};
use super::frontend::Frontend;
use crate::config::{AppConfig, ConfigResult};

/// One tenant: a named bundle of frontends and backends.
pub struct Application {
    /// Application name.
    name: String,

    /// Upstream endpoints in configuration (selection) order.
    backends: Vec<Arc<Backend>>,

    /// Listening endpoints. Filled during construction; read-only afterwards.
    frontends: RwLock<Vec<Arc<Frontend>>>,
}

impl Application {
    /// Build an application from its configuration entry.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::config::ConfigError`] if any backend address or
    /// frontend port is invalid.
    pub fn new(
        config: &AppConfig,
        buf_pool: Arc<BufferPool>,
        shutdown: CancellationToken,
    ) -> ConfigResult<Arc<Self>> {
        let backends = config
            .backends
            .iter()
            .map(|b| Backend::new(&b.address, shutdown.clone()).map(Arc::new))
            .collect::<ConfigResult<Vec<_>>>()?;

        let app = Arc::new(Self {
            name: config.name.clone(),
            backends,
            frontends: RwLock::new(Vec::new()),
        });

        let mut frontends = Vec::with_capacity(config.frontends.len());
        for frontend in &config.frontends {
            frontends.push(Arc::new(Frontend::new(
                frontend.port,
                Arc::downgrade(&app),
                Arc::clone(&buf_pool),
                shutdown.clone(),
            )?));
        }
        *app.frontends.write().expect("frontends lock poisoned") = frontends;

        Ok(app)
    }

    /// Get the application name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the backends in selection order.
    #[must_use]
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Get the frontends.
    #[must_use]
    pub fn frontends(&self) -> Vec<Arc<Frontend>> {
        self.frontends
            .read()
            .expect("frontends lock poisoned")
            .clone()
    }

    /// An application is serving iff at least one frontend is bound.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.frontends().iter().any(|f| f.is_bound())
    }

    /// Run every backend and frontend until shutdown; returns when all of
    /// them have wound down.
    pub async fn run(self: Arc<Self>) {
        let mut tasks = JoinSet::new();

        for backend in &self.backends {
            tasks.spawn(Arc::clone(backend).run());
        }
        for frontend in self.frontends() {
            tasks.spawn(frontend.run());
        }

        info!(
            app = %self.name,
            backends = self.backends.len(),
            frontends = self.frontends().len(),
            "application started"
        );

        while tasks.join_next().await.is_some() {}
        info!(app = %self.name, "application stopped");
    }

    /// Open an upstream connection for a newly accepted client.
    ///
    /// Picks the least-loaded active backend and dials it. A dial failure is
    /// returned as-is: no second backend is tried within one accept. The
    /// failed dial has already demoted the backend, so the next accept routes
    /// around it.
    ///
    /// # Errors
    ///
    /// [`ProxyError::NoBackend`] if no backend is active,
    /// [`ProxyError::Dial`] if the chosen backend cannot be reached.
    pub async fn create_remote_connection(&self) -> ProxyResult<(TcpStream, Arc<Backend>)> {
        let backend = self.pick_backend()?;
        let stream = backend.dial().await?;
        Ok((stream, Arc::clone(backend)))
    }

    /// Least-loaded selection over the active backends.
    ///
    /// Counts are independent relaxed reads per backend; the snapshot need
    /// not be consistent across backends. Strict `<` keeps ties on the
    /// earliest configured backend.
    fn pick_backend(&self) -> ProxyResult<&Arc<Backend>> {
        let mut best: Option<&Arc<Backend>> = None;
        let mut min_conns = usize::MAX;

        for backend in &self.backends {
            if !backend.is_active() {
                continue;
            }
            let count = backend.connection_count();
            if count < min_conns {
                min_conns = count;
                best = Some(backend);
            }
        }

        best.ok_or_else(|| ProxyError::NoBackend {
            app: self.name.clone(),
        })
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("backends", &self.backends.len())
            .finish()
    }
}
