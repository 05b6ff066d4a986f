//! Process-wide orchestration.
//!
//! The supervisor builds one application per configuration entry, hands each
//! a child of the root shutdown token, and drives them to completion. The
//! binary wires process signals to the root token; tests cancel it directly.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::application::Application;
use super::buffer::BufferPool;
use crate::config::{ConfigResult, ProxyConfig};

/// Owns every application and the root shutdown token.
pub struct Supervisor {
    /// Applications, one per configuration entry.
    apps: Vec<Arc<Application>>,

    /// Root shutdown token; every application holds a child of it.
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Build the supervisor from a validated configuration.
    ///
    /// No task is spawned here; a failure leaves nothing to unwind.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::config::ConfigError`] if any application entry is
    /// invalid.
    pub fn new(config: &ProxyConfig) -> ConfigResult<Self> {
        let shutdown = CancellationToken::new();
        let buf_pool = Arc::new(BufferPool::new());

        let apps = config
            .apps
            .iter()
            .map(|app| Application::new(app, Arc::clone(&buf_pool), shutdown.child_token()))
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self { apps, shutdown })
    }

    /// Get the applications.
    #[must_use]
    pub fn applications(&self) -> &[Arc<Application>] {
        &self.apps
    }

    /// Token that winds the whole process down when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run every application and wait until all of them have wound down.
    pub async fn run(&self) {
        info!(apps = self.apps.len(), "starting applications");

        let mut tasks = JoinSet::new();
        for app in &self.apps {
            tasks.spawn(Arc::clone(app).run());
        }

        while tasks.join_next().await.is_some() {}
        info!("shutdown complete");
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("apps", &self.apps.len())
            .finish()
    }
}
