//! # portway
//!
//! A multi-tenant TCP reverse proxy. Each application (tenant) listens on a
//! set of ports and forwards accepted connections to the least-loaded of its
//! healthy upstream endpoints, relaying bytes transparently at L4.
//!
//! ## Features
//!
//! - Per-tenant listeners with indefinite bind retry
//! - Active TCP health probes plus passive demotion on failed dials
//! - Least-loaded upstream selection with configuration-order tie-breaks
//! - Pooled relay buffers and exactly-once pair teardown
//! - Single-signal graceful shutdown that drains every task
//!
//! ## Architecture
//!
//! A [`proxy::Supervisor`] owns one [`proxy::Application`] per configured
//! tenant; each application owns its [`proxy::Frontend`]s and
//! [`proxy::Backend`]s and shares one cancellation token with them. See the
//! [`proxy`] module documentation for the component breakdown.

pub mod config;
pub mod proxy;
