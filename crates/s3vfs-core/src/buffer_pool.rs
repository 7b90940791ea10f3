//! Capacity-limited pool of upload buffers.
//!
//! Two semaphores bound memory: the pool's, shared by every write handle of
//! a file system, and a per-handle "holders" semaphore limiting how many
//! parts one handle has in flight. A buffer that is still being filled is
//! owned by its handle alone; it is admitted into the pool when it is
//! dispatched for upload, and the permits are returned when the upload task
//! drops them.
//!
//! Permits are only ever held by upload tasks, which finish on their own, so
//! a handle waiting for capacity cannot be blocked by an idle handle.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared pool of upload buffers.
#[derive(Clone)]
pub struct BufferPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

impl BufferPool {
    /// Pool allowing `capacity` buffers in flight.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Maximum number of buffers in flight.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers that can be admitted without waiting.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Admit a filled buffer for upload.
    ///
    /// Waits for a permit from `holders`, then one from the pool.
    pub async fn admit(&self, data: BytesMut, holders: &Arc<Semaphore>) -> PoolBuffer {
        // Neither semaphore is ever closed.
        let holder = Arc::clone(holders)
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("holder semaphore closed"));
        let pooled = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("pool semaphore closed"));
        PoolBuffer {
            data: data.freeze(),
            permits: BufferPermits {
                _holder: holder,
                _pooled: pooled,
            },
        }
    }
}

/// Permits held by an admitted buffer; dropping them returns the capacity.
#[derive(Debug)]
pub struct BufferPermits {
    _holder: OwnedSemaphorePermit,
    _pooled: OwnedSemaphorePermit,
}

/// A buffer admitted into a [`BufferPool`].
#[derive(Debug)]
pub struct PoolBuffer {
    data: Bytes,
    permits: BufferPermits,
}

impl PoolBuffer {
    /// Buffer size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Split into the contents and the permits, which stay taken until the
    /// guard is dropped.
    #[must_use]
    pub fn into_parts(self) -> (Bytes, BufferPermits) {
        (self.data, self.permits)
    }

    /// Give the capacity back to the pool.
    pub fn release(self) {
        drop(self);
    }
}
