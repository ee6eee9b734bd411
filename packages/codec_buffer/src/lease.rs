use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::{BufferPool, Recycle};

/// A value borrowed from a [`BufferPool`].
///
/// Dereferences to the value. Dropping the lease recycles the value and returns it to the pool,
/// waking one thread waiting in an acquire call.
pub struct Lease<'a, T>
where
    T: Recycle,
{
    pool: &'a BufferPool<T>,

    // Only `None` after `detach()` or during drop.
    value: Option<T>,

    // Overflow values handed out by `acquire_pair()` on a single-slot pool are not owned by any
    // slot and are dropped instead of returned.
    owned_by_slot: bool,
}

impl<'a, T> Lease<'a, T>
where
    T: Recycle,
{
    pub(crate) fn pooled(pool: &'a BufferPool<T>, value: T) -> Self {
        Self {
            pool,
            value: Some(value),
            owned_by_slot: true,
        }
    }

    pub(crate) fn overflow(pool: &'a BufferPool<T>, value: T) -> Self {
        Self {
            pool,
            value: Some(value),
            owned_by_slot: false,
        }
    }

    /// Takes the value out of the lease without returning it to the pool.
    ///
    /// The slot stays leased until the value is handed back via [`BufferPool::release()`].
    #[must_use]
    pub fn detach(mut self) -> T {
        self.value
            .take()
            .expect("value is only taken by detach() or drop, both consume the lease")
    }
}

impl<T> Deref for Lease<'_, T>
where
    T: Recycle,
{
    type Target = T;

    fn deref(&self) -> &T {
        self.value
            .as_ref()
            .expect("value is only taken by detach() or drop, both consume the lease")
    }
}

impl<T> DerefMut for Lease<'_, T>
where
    T: Recycle,
{
    fn deref_mut(&mut self) -> &mut T {
        self.value
            .as_mut()
            .expect("value is only taken by detach() or drop, both consume the lease")
    }
}

impl<T> Drop for Lease<'_, T>
where
    T: Recycle,
{
    fn drop(&mut self) {
        let Some(value) = self.value.take() else {
            return;
        };

        if self.owned_by_slot {
            self.pool.release(value);
        }
    }
}

impl<T> fmt::Debug for Lease<'_, T>
where
    T: Recycle + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("value", &self.value)
            .field("owned_by_slot", &self.owned_by_slot)
            .finish_non_exhaustive()
    }
}
