//! Pooled relay buffers.
//!
//! Relay loops copy through fixed-size buffers borrowed from a process-wide
//! free list, so steady-state traffic does not allocate per copy. The pool
//! grows to the peak number of concurrent relay directions and is never
//! shrunk.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::BytesMut;

/// Size of a single relay buffer.
pub const RELAY_BUFFER_SIZE: usize = 32 * 1024;

/// Pool statistics.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Buffers served from the free list.
    pub hits: AtomicU64,
    /// Buffers freshly allocated because the free list was empty.
    pub misses: AtomicU64,
    /// Buffers returned to the free list.
    pub returns: AtomicU64,
}

/// A process-wide pool of fixed-size byte buffers.
#[derive(Debug)]
pub struct BufferPool {
    /// Size of every buffer handed out.
    buffer_size: usize,
    /// Free list.
    free: Mutex<Vec<BytesMut>>,
    /// Statistics.
    stats: PoolStats,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    /// Create a pool of [`RELAY_BUFFER_SIZE`] buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer_size(RELAY_BUFFER_SIZE)
    }

    /// Create a pool with a custom buffer size.
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size,
            free: Mutex::new(Vec::new()),
            stats: PoolStats::default(),
        }
    }

    /// Borrow a buffer; it returns to the pool when dropped.
    pub fn get(self: &Arc<Self>) -> PooledBuffer {
        let reused = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop());

        let buf = match reused {
            Some(buf) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                buf
            },
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                BytesMut::zeroed(self.buffer_size)
            },
        };

        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Return a buffer to the free list.
    fn put(&self, buf: BytesMut) {
        if let Ok(mut free) = self.free.lock() {
            self.stats.returns.fetch_add(1, Ordering::Relaxed);
            free.push(buf);
        }
    }

    /// Number of buffers currently on the free list.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }

    /// Get pool statistics.
    #[must_use]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

/// A buffer borrowed from a [`BufferPool`].
pub struct PooledBuffer {
    buf: BytesMut,
    pool: Arc<BufferPool>,
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_has_fixed_size() {
        let pool = Arc::new(BufferPool::new());
        let buf = pool.get();
        assert_eq!(buf.len(), RELAY_BUFFER_SIZE);
    }

    #[test]
    fn test_buffer_returns_on_drop() {
        let pool = Arc::new(BufferPool::with_buffer_size(64));
        assert_eq!(pool.available(), 0);

        let buf = pool.get();
        drop(buf);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.stats().returns.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_buffer_reuse() {
        let pool = Arc::new(BufferPool::with_buffer_size(64));

        drop(pool.get());
        assert_eq!(pool.stats().misses.load(Ordering::Relaxed), 1);

        drop(pool.get());
        assert_eq!(pool.stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(pool.stats().misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_pool_grows_to_peak() {
        let pool = Arc::new(BufferPool::with_buffer_size(64));

        let a = pool.get();
        let b = pool.get();
        let c = pool.get();
        drop(a);
        drop(b);
        drop(c);

        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_returned_buffer_is_reusable_for_io() {
        let pool = Arc::new(BufferPool::with_buffer_size(8));

        {
            let mut buf = pool.get();
            buf.copy_from_slice(b"12345678");
        }

        // A reused buffer keeps its full length; stale contents are
        // overwritten by the next read before anything is written out.
        let buf = pool.get();
        assert_eq!(buf.len(), 8);
    }
}
