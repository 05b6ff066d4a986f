//! Connection handles and the manager contract.
//!
//! Every socket the proxy owns (accepted client connections on a frontend,
//! dialed upstream connections on a backend) is wrapped in a handle that
//! carries a tracking identifier, a closed flag, and a back-reference to the
//! manager tracking it. Handles close at most once no matter how many tasks
//! race on teardown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// The contract between a connection handle and the component tracking it.
///
/// Frontends implement this for the client side of a pair, backends for the
/// upstream side.
pub trait ConnManager: Send + Sync {
    /// Allocate a tracking identifier for a new handle.
    ///
    /// Identifiers are unique within this manager for the handle's lifetime.
    fn next_conn_id(&self) -> u64;

    /// Register a handle. If the manager is already shutting down the handle
    /// is closed instead of inserted.
    fn add_conn(&self, conn: Arc<ConnHandle>);

    /// Unregister a handle. A no-op once the manager is shutting down (its
    /// own teardown drains the map).
    fn del_conn(&self, conn: &ConnHandle);
}

/// Shared control block for one tracked connection.
///
/// The handle outlives the `TcpStream` it was created from: the stream's
/// halves are owned by the relay tasks, while managers and the teardown path
/// hold the handle.
pub struct ConnHandle {
    /// Identifier issued by the tracking manager.
    id: u64,
    /// Remote peer address.
    peer_addr: SocketAddr,
    /// Local address.
    local_addr: SocketAddr,
    /// Set by the first successful close.
    closed: AtomicBool,
    /// Pair-scoped token; cancelling it unblocks both relay directions so the
    /// underlying socket is dropped promptly.
    halt: CancellationToken,
    /// Manager tracking this handle.
    manager: Weak<dyn ConnManager>,
}

impl ConnHandle {
    pub(crate) fn new(
        id: u64,
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
        halt: CancellationToken,
        manager: Weak<dyn ConnManager>,
    ) -> Self {
        Self {
            id,
            peer_addr,
            local_addr,
            closed: AtomicBool::new(false),
            halt,
            manager,
        }
    }

    /// Get the tracking identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the remote peer address.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the local address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close the connection.
    ///
    /// Idempotent and safe under concurrent callers: exactly one call wins
    /// the closed flag and cancels the pair token; every other call is a
    /// no-op. Returns whether this call performed the close.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.halt.cancel();
            true
        } else {
            false
        }
    }

    /// Whether the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The manager tracking this handle, if it is still alive.
    pub(crate) fn manager(&self) -> Option<Arc<dyn ConnManager>> {
        self.manager.upgrade()
    }
}

impl std::fmt::Debug for ConnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnHandle")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A tracked TCP connection: the stream plus its control block.
#[derive(Debug)]
pub struct Conn {
    stream: TcpStream,
    handle: Arc<ConnHandle>,
}

impl Conn {
    /// Wrap a stream under the given manager.
    ///
    /// The manager issues the tracking identifier; `halt` is the pair token
    /// shared by both connections of a relay pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer or local address cannot be determined
    /// (the socket died between accept/connect and here).
    pub fn wrap(
        stream: TcpStream,
        manager: &Arc<dyn ConnManager>,
        halt: CancellationToken,
    ) -> std::io::Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let handle = Arc::new(ConnHandle::new(
            manager.next_conn_id(),
            peer_addr,
            local_addr,
            halt,
            Arc::downgrade(manager),
        ));

        Ok(Self { stream, handle })
    }

    /// Get the control block.
    #[must_use]
    pub fn handle(&self) -> Arc<ConnHandle> {
        Arc::clone(&self.handle)
    }

    /// Split into read and write halves sharing the control block.
    #[must_use]
    pub fn split(self) -> (ConnReadHalf, ConnWriteHalf) {
        let (read, write) = self.stream.into_split();
        let handle = self.handle;

        (
            ConnReadHalf {
                read,
                handle: Arc::clone(&handle),
            },
            ConnWriteHalf { write, handle },
        )
    }
}

/// Read half of a tracked connection.
pub struct ConnReadHalf {
    read: OwnedReadHalf,
    handle: Arc<ConnHandle>,
}

impl ConnReadHalf {
    /// Get the control block.
    #[must_use]
    pub fn handle(&self) -> &Arc<ConnHandle> {
        &self.handle
    }

    /// Get the underlying read half.
    pub fn inner(&mut self) -> &mut OwnedReadHalf {
        &mut self.read
    }
}

/// Write half of a tracked connection.
pub struct ConnWriteHalf {
    write: OwnedWriteHalf,
    handle: Arc<ConnHandle>,
}

impl ConnWriteHalf {
    /// Get the control block.
    #[must_use]
    pub fn handle(&self) -> &Arc<ConnHandle> {
        &self.handle
    }

    /// Get the underlying write half.
    pub fn inner(&mut self) -> &mut OwnedWriteHalf {
        &mut self.write
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::AtomicU64;

    static TEST_CONN_ID: AtomicU64 = AtomicU64::new(0);

    /// Manager that tracks nothing; used to exercise handles in isolation.
    #[derive(Debug, Default)]
    pub(crate) struct NullManager;

    impl ConnManager for NullManager {
        fn next_conn_id(&self) -> u64 {
            TEST_CONN_ID.fetch_add(1, Ordering::Relaxed)
        }

        fn add_conn(&self, _conn: Arc<ConnHandle>) {}

        fn del_conn(&self, _conn: &ConnHandle) {}
    }

    /// Build a detached handle with placeholder addresses.
    pub(crate) fn detached_handle(manager: &Arc<dyn ConnManager>) -> Arc<ConnHandle> {
        let addr: SocketAddr = "127.0.0.1:0".parse().expect("literal addr");
        Arc::new(ConnHandle::new(
            manager.next_conn_id(),
            addr,
            addr,
            CancellationToken::new(),
            Arc::downgrade(manager),
        ))
    }
}
