use std::fmt;
use std::num::NonZero;
use std::sync::Arc;

use crate::buffer_pool::Factory;
use crate::{BufferPool, GrowableBuffer, Recycle};

/// Number of slots in a pool built without an explicit capacity.
pub const DEFAULT_POOL_CAPACITY: NonZero<usize> = NonZero::new(64).unwrap();

/// Initial capacity of the buffers created by [`BufferPool::new()`].
pub const DEFAULT_POOLED_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Builder for creating an instance of [`BufferPool`].
///
/// Obtained from [`BufferPool::builder()`], which takes the factory that creates the pooled
/// values. The factory runs lazily, at most once per slot unless it panics.
#[must_use]
pub struct BufferPoolBuilder<T> {
    factory: Factory<T>,
    capacity: NonZero<usize>,
}

impl<T> BufferPoolBuilder<T>
where
    T: Recycle,
{
    pub(crate) fn with_factory(factory: Factory<T>) -> Self {
        Self {
            factory,
            capacity: DEFAULT_POOL_CAPACITY,
        }
    }

    /// Sets the number of values the pool may lend out at the same time.
    ///
    /// Defaults to [`DEFAULT_POOL_CAPACITY`].
    pub fn capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builds the pool with the specified configuration. No values are created yet.
    #[must_use]
    pub fn build(self) -> BufferPool<T> {
        BufferPool::new_inner(self.capacity, self.factory)
    }
}

impl Default for BufferPoolBuilder<GrowableBuffer> {
    fn default() -> Self {
        Self::with_factory(Arc::new(|| {
            GrowableBuffer::builder()
                .initial_capacity(DEFAULT_POOLED_BUFFER_CAPACITY)
                .build()
        }))
    }
}

impl<T> fmt::Debug for BufferPoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPoolBuilder")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let pool = BufferPoolBuilder::default().build();

        let stats = pool.statistics();
        assert_eq!(stats.capacity, 64);
        assert_eq!(stats.available, 64);
        assert_eq!(stats.constructed, 0);
    }

    #[test]
    fn custom_capacity() {
        let pool = BufferPool::builder(GrowableBuffer::new)
            .capacity(NonZero::new(3).unwrap())
            .build();

        assert_eq!(pool.statistics().capacity, 3);
        assert_eq!(pool.acquire().capacity(), crate::DEFAULT_INITIAL_CAPACITY);
    }
}
