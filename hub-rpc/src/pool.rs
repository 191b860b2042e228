//! Reusable accumulation buffers for message reassembly
//!
//! A fragmented message is assembled into a [`PooledBuf`] taken from the
//! pool. Dropping the buffer, on any path, hands it back: cleared, and only
//! if it has not grown beyond the retention limit.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam::queue::ArrayQueue;

#[derive(Debug)]
struct Shared {
    free: ArrayQueue<Vec<u8>>,
    buffer_size: usize,
    max_retained: usize,
}

/// A bounded pool of byte buffers
#[derive(Debug, Clone)]
pub struct BufferPool {
    shared: Arc<Shared>,
}

impl BufferPool {
    /// Create a pool retaining up to `capacity` buffers of initial size `buffer_size`
    ///
    /// Buffers that grew past `max_retained` bytes of capacity are freed on
    /// return instead of being kept.
    pub fn new(capacity: usize, buffer_size: usize, max_retained: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                free: ArrayQueue::new(capacity.max(1)),
                buffer_size,
                max_retained: max_retained.max(buffer_size),
            }),
        }
    }

    /// Take an empty buffer, reusing a returned one when available
    pub fn get(&self) -> PooledBuf {
        let buf = self
            .shared
            .free
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(self.shared.buffer_size));

        PooledBuf {
            buf,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Buffers currently idle in the pool
    pub fn available(&self) -> usize {
        self.shared.free.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }
}

/// A buffer on loan from a [`BufferPool`]
pub struct PooledBuf {
    buf: Vec<u8>,
    shared: Arc<Shared>,
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl AsRef<[u8]> for PooledBuf {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if self.buf.capacity() > self.shared.max_retained {
            return;
        }

        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        // A full pool just frees the buffer
        let _ = self.shared.free.push(buf);
    }
}

impl std::fmt::Debug for PooledBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuf")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .finish()
    }
}
