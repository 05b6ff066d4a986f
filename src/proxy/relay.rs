//! Per-direction relay tasks and paired teardown.
//!
//! Every proxied connection pair is served by two tasks, one per direction.
//! A direction ends on EOF, on any IO error, or when the pair token is
//! cancelled; the first task to finish tears down both sides through a
//! single-shot latch and the other task's attempt is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::buffer::BufferPool;
use super::conn::{ConnHandle, ConnReadHalf, ConnWriteHalf};
use super::error::ProxyError;

/// Single-shot teardown for a connection pair.
///
/// Closes both handles (idempotent) and deregisters them from their
/// managers. Exactly one of the two relay tasks performs the work.
pub(crate) struct CloseAll {
    done: AtomicBool,
    client: Arc<ConnHandle>,
    upstream: Arc<ConnHandle>,
}

impl CloseAll {
    pub(crate) fn new(client: Arc<ConnHandle>, upstream: Arc<ConnHandle>) -> Self {
        Self {
            done: AtomicBool::new(false),
            client,
            upstream,
        }
    }

    pub(crate) fn run(&self) {
        if self
            .done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        debug!(
            client = %self.client.peer_addr(),
            upstream = %self.upstream.peer_addr(),
            "closing connection pair"
        );

        self.client.close();
        self.upstream.close();

        if let Some(manager) = self.client.manager() {
            manager.del_conn(&self.client);
        }
        if let Some(manager) = self.upstream.manager() {
            manager.del_conn(&self.upstream);
        }
    }
}

/// Copy bytes in one direction until EOF, error, or pair shutdown, then run
/// the shared teardown. The borrowed buffer returns to the pool on exit.
pub(crate) async fn relay(
    mut src: ConnReadHalf,
    mut dst: ConnWriteHalf,
    pool: Arc<BufferPool>,
    halt: CancellationToken,
    close_all: Arc<CloseAll>,
) {
    let from = src.handle().peer_addr();
    let to = dst.handle().peer_addr();

    {
        let mut buf = pool.get();
        tokio::select! {
            _ = halt.cancelled() => {},
            result = copy_oneway(&mut src, &mut dst, &mut buf) => match result {
                Ok(bytes) => debug!(from = %from, to = %to, bytes, "relay direction finished"),
                Err(e) => {
                    let err = ProxyError::Relay(e);
                    info!(from = %from, to = %to, error = %err, "relay direction failed");
                },
            },
        }
    }

    close_all.run();
}

/// Read-then-write loop. A short write loops until the read quantum is
/// drained; a 0-byte read is EOF.
async fn copy_oneway(
    src: &mut ConnReadHalf,
    dst: &mut ConnWriteHalf,
    buf: &mut [u8],
) -> std::io::Result<u64> {
    let mut total = 0u64;

    loop {
        let n = src.inner().read(buf).await?;
        if n == 0 {
            return Ok(total);
        }
        dst.inner().write_all(&buf[..n]).await?;
        total += n as u64;
    }
}
