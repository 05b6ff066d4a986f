//! # Connection-Lifecycle Engine
//!
//! The proxy core: frontends accept clients, applications pick the
//! least-loaded healthy backend, backends dial upstreams and probe their
//! health, and relay tasks splice each connection pair with pooled buffers.
//! A single cancellation token per application winds everything down;
//! teardown of a pair happens exactly once regardless of which side closes
//! first.
//!
//! Composition, bottom-up:
//!
//! - [`conn`] - tracked connection handles with idempotent close
//! - [`buffer`] - pooled relay buffers
//! - [`backend`] - one upstream endpoint with active/passive health
//! - [`frontend`] - one listening port with bind retry
//! - [`application`] - one tenant and its upstream selection
//! - [`supervisor`] - process-wide orchestration

pub mod application;
pub mod backend;
pub mod buffer;
pub mod conn;
pub mod error;
pub mod frontend;
mod relay;
pub mod supervisor;

pub use application::Application;
pub use backend::{Backend, DEFAULT_DIAL_TIMEOUT, DEFAULT_PROBE_INTERVAL};
pub use buffer::{BufferPool, PooledBuffer, RELAY_BUFFER_SIZE};
pub use conn::{Conn, ConnHandle, ConnManager};
pub use error::{ProxyError, ProxyResult};
pub use frontend::{Frontend, BIND_RETRY_DELAY};
pub use supervisor::Supervisor;
