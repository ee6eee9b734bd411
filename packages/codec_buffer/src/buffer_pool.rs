use std::collections::VecDeque;
use std::fmt;
use std::num::NonZero;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use scopeguard::ScopeGuard;
use tracing::{debug, trace, warn};

use crate::{BufferPoolBuilder, Error, GrowableBuffer, Lease, Result};

/// Resets a value before it is handed to the next borrower of a [`BufferPool`].
pub trait Recycle {
    /// Discards all state observable by a future borrower. Capacity may be kept.
    fn recycle(&mut self);
}

pub(crate) type Factory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// A slot of the pool, either still waiting for its value to be built or holding an idle value.
enum Slot<T> {
    Cold(Factory<T>),
    Hot(T),
}

struct PoolState<T> {
    idle: VecDeque<Slot<T>>,

    /// Values currently held by borrowers, not counting overflow values.
    leased: usize,

    /// Slots that have been promoted from cold to hot.
    constructed: usize,
}

/// How long an acquire operation may wait for a slot.
#[derive(Clone, Copy, Debug)]
enum Wait {
    Never,
    Until(Instant, Duration),
    Forever,
}

/// A point-in-time snapshot of the state of a [`BufferPool`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct PoolStats {
    /// The maximum number of values the pool lends out at the same time.
    pub capacity: usize,

    /// Idle slots that can be acquired without waiting.
    pub available: usize,

    /// Values currently held by borrowers.
    pub leased: usize,

    /// Slots whose value has been constructed. The rest are still cold.
    pub constructed: usize,
}

/// A bounded pool of reusable heavy values, by default [`GrowableBuffer`]s.
///
/// The pool holds a fixed number of slots. Every slot starts cold and only constructs its value
/// the first time it is acquired. Acquiring blocks while all slots are leased out, which caps how
/// many of these values exist at the same time.
///
/// Leases return their value to the pool when dropped, on every exit path including panics.
/// Before the next borrower sees the value it is reset via [`Recycle`].
///
/// The pool is an ordinary value: create it once and pass it by reference to whatever needs it.
///
/// # Example
///
/// ```
/// use codec_buffer::{BufferPool, CodecBuffer};
///
/// let pool = BufferPool::new();
///
/// let decoded = pool.with(|buffer| {
///     buffer.write_var_i64(-7)?;
///     buffer.flip();
///     buffer.read_var_i64()
/// })?;
///
/// assert_eq!(decoded, -7);
/// # Ok::<(), codec_buffer::Error>(())
/// ```
///
/// # Fairness
///
/// Every returned value wakes all waiters, which then race for the idle slots with no ordering
/// guarantee between them. Single and pair acquisitions wait on the same signal, so a returned
/// value is never withheld from a single waiter while a pair waiter still needs a second slot.
/// A borrower that never returns its value permanently reduces the capacity of the pool.
pub struct BufferPool<T = GrowableBuffer> {
    capacity: NonZero<usize>,
    factory: Factory<T>,
    state: Mutex<PoolState<T>>,
    slot_returned: Condvar,
}

impl BufferPool<GrowableBuffer> {
    /// Creates a pool of [`DEFAULT_POOL_CAPACITY`][crate::DEFAULT_POOL_CAPACITY] heap buffers
    /// with an initial capacity of
    /// [`DEFAULT_POOLED_BUFFER_CAPACITY`][crate::DEFAULT_POOLED_BUFFER_CAPACITY] bytes each.
    #[must_use]
    pub fn new() -> Self {
        BufferPoolBuilder::default().build()
    }
}

impl<T> BufferPool<T>
where
    T: Recycle,
{
    pub(crate) fn new_inner(capacity: NonZero<usize>, factory: Factory<T>) -> Self {
        let idle = (0..capacity.get())
            .map(|_| Slot::Cold(Arc::clone(&factory)))
            .collect();

        Self {
            capacity,
            factory,
            state: Mutex::new(PoolState {
                idle,
                leased: 0,
                constructed: 0,
            }),
            slot_returned: Condvar::new(),
        }
    }

    /// Starts building a pool whose values are created by `factory`.
    ///
    /// # Example
    ///
    /// ```
    /// use std::num::NonZero;
    ///
    /// use codec_buffer::{BufferPool, GrowableBuffer, StorageKind};
    ///
    /// let pool = BufferPool::builder(|| {
    ///     GrowableBuffer::builder()
    ///         .kind(StorageKind::Direct)
    ///         .initial_capacity(64 * 1024)
    ///         .build()
    /// })
    /// .capacity(NonZero::new(8).unwrap())
    /// .build();
    ///
    /// assert_eq!(pool.statistics().capacity, 8);
    /// ```
    pub fn builder<F>(factory: F) -> BufferPoolBuilder<T>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        BufferPoolBuilder::with_factory(Arc::new(factory))
    }

    /// Acquires a value, blocking for as long as it takes for one to become available.
    #[must_use]
    pub fn acquire(&self) -> Lease<'_, T> {
        let value = self
            .take(Wait::Forever)
            .expect("waiting without a deadline only returns once a slot is available");

        Lease::pooled(self, value)
    }

    /// Acquires a value, waiting at most `timeout` for one to become available.
    ///
    /// A zero `timeout` waits without limit, same as [`acquire()`][Self::acquire].
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if the timeout elapses first.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<Lease<'_, T>> {
        let wait = if timeout.is_zero() {
            Wait::Forever
        } else {
            // An unrepresentable deadline is as good as no deadline.
            Instant::now()
                .checked_add(timeout)
                .map_or(Wait::Forever, |deadline| Wait::Until(deadline, timeout))
        };

        Ok(Lease::pooled(self, self.take(wait)?))
    }

    /// Acquires a value only if one is available right now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] if every slot is leased out.
    pub fn try_acquire(&self) -> Result<Lease<'_, T>> {
        Ok(Lease::pooled(self, self.take(Wait::Never)?))
    }

    /// Acquires two values in one step, for code that needs both at the same time.
    ///
    /// The two values are taken together once two slots are idle, so concurrent callers never
    /// hold one value while waiting for a second. If the pool has a single slot, the second
    /// value is built on the spot and discarded when its lease is dropped.
    #[must_use]
    pub fn acquire_pair(&self) -> (Lease<'_, T>, Lease<'_, T>) {
        if self.capacity.get() < 2 {
            let first = self.acquire();
            trace!("pool too small for a pair, building an overflow value");
            let second = Lease::overflow(self, (self.factory)());
            return (first, second);
        }

        let mut state = self.state.lock();
        while state.idle.len() < 2 {
            self.slot_returned.wait(&mut state);
        }

        // Cannot fail, the loop above waited for two idle slots.
        let (Some(first), Some(second)) = (state.idle.pop_front(), state.idle.pop_front()) else {
            unreachable!("two idle slots were present under the same lock");
        };

        // Goes back into the pool if building the first value panics.
        let pending_second = scopeguard::guard(second, |slot| {
            self.state.lock().idle.push_back(slot);
            self.slot_returned.notify_all();
        });

        let first = Lease::pooled(self, self.materialize(state, first));
        let second = self.materialize(self.state.lock(), ScopeGuard::into_inner(pending_second));

        (first, Lease::pooled(self, second))
    }

    /// Runs `f` with a pooled value, returning the value to the pool afterwards even if `f`
    /// returns early or panics.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut lease = self.acquire();
        f(&mut lease)
    }

    /// Runs `f` with two pooled values acquired via [`acquire_pair()`][Self::acquire_pair].
    ///
    /// # Example
    ///
    /// ```
    /// use std::num::NonZero;
    ///
    /// use codec_buffer::{BufferPool, CodecBuffer, GrowableBuffer};
    ///
    /// // Even a single-slot pool can serve a pair without deadlocking.
    /// let pool = BufferPool::builder(GrowableBuffer::new)
    ///     .capacity(NonZero::new(1).unwrap())
    ///     .build();
    ///
    /// pool.with_pair(|key, value| {
    ///     key.write_i32(1)?;
    ///     value.write_i64(2)?;
    ///     Ok::<_, codec_buffer::Error>(())
    /// })?;
    /// # Ok::<(), codec_buffer::Error>(())
    /// ```
    pub fn with_pair<R>(&self, f: impl FnOnce(&mut T, &mut T) -> R) -> R {
        let (mut first, mut second) = self.acquire_pair();
        f(&mut first, &mut second)
    }

    /// Returns a value to the pool without any check of where it came from.
    ///
    /// This is the counterpart of [`Lease::detach()`]. The value is recycled and becomes
    /// available to the next borrower immediately. If the pool already holds as many idle values
    /// as it has slots, the value is dropped instead, keeping the bound intact.
    pub fn release(&self, mut value: T) {
        value.recycle();

        let mut state = self.state.lock();
        state.leased = state.leased.saturating_sub(1);

        if state.idle.len() >= self.capacity.get() {
            drop(state);
            warn!("released value does not fit in the pool and was dropped");
            return;
        }

        state.idle.push_back(Slot::Hot(value));
        drop(state);

        trace!("value returned to pool");
        self.slot_returned.notify_all();
    }

    /// Returns a snapshot of the slot accounting of the pool.
    #[must_use]
    pub fn statistics(&self) -> PoolStats {
        let state = self.state.lock();

        PoolStats {
            capacity: self.capacity.get(),
            available: state.idle.len(),
            leased: state.leased,
            constructed: state.constructed,
        }
    }

    fn take(&self, wait: Wait) -> Result<T> {
        let mut state = self.state.lock();

        loop {
            if let Some(slot) = state.idle.pop_front() {
                return Ok(self.materialize(state, slot));
            }

            match wait {
                Wait::Never => return Err(Error::PoolExhausted { timeout: None }),
                Wait::Forever => self.slot_returned.wait(&mut state),
                Wait::Until(deadline, timeout) => {
                    if self
                        .slot_returned
                        .wait_until(&mut state, deadline)
                        .timed_out()
                        && state.idle.is_empty()
                    {
                        return Err(Error::PoolExhausted {
                            timeout: Some(timeout),
                        });
                    }
                }
            }
        }
    }

    /// Accounts for `slot` as leased and turns it into a value, building it if it is cold.
    ///
    /// The lock is released before the factory runs. If the factory panics, the slot goes back
    /// into the pool as cold.
    fn materialize(&self, mut state: MutexGuard<'_, PoolState<T>>, slot: Slot<T>) -> T {
        state.leased = state.leased.wrapping_add(1);

        let factory = match slot {
            Slot::Hot(value) => return value,
            Slot::Cold(factory) => factory,
        };

        state.constructed = state.constructed.wrapping_add(1);
        drop(state);

        let restore = scopeguard::guard(Arc::clone(&factory), |factory| {
            let mut state = self.state.lock();
            state.leased = state.leased.saturating_sub(1);
            state.constructed = state.constructed.saturating_sub(1);
            state.idle.push_back(Slot::Cold(factory));
            drop(state);
            self.slot_returned.notify_all();
        });

        let value = factory();
        drop(ScopeGuard::into_inner(restore));

        debug!("constructed pooled value for a cold slot");
        value
    }
}

impl Default for BufferPool<GrowableBuffer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BufferPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();

        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("available", &state.idle.len())
            .field("leased", &state.leased)
            .field("constructed", &state.constructed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::CodecBuffer;

    assert_impl_all!(BufferPool: Send, Sync);
    assert_impl_all!(BufferPool<Vec<u8>>: Send, Sync);

    impl Recycle for Vec<u8> {
        fn recycle(&mut self) {
            self.clear();
        }
    }

    fn pool_of(capacity: usize) -> BufferPool<Vec<u8>> {
        BufferPool::builder(Vec::new)
            .capacity(NonZero::new(capacity).unwrap())
            .build()
    }

    #[test]
    fn slots_start_cold() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);

        let pool = BufferPool::builder(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            Vec::<u8>::new()
        })
        .capacity(NonZero::new(3).unwrap())
        .build();

        assert_eq!(built.load(Ordering::Relaxed), 0);
        assert_eq!(pool.statistics().constructed, 0);

        drop(pool.acquire());
        drop(pool.acquire());

        // The second acquire got the value returned by the first, nothing else was built.
        assert_eq!(built.load(Ordering::Relaxed), 1);
        assert_eq!(pool.statistics().constructed, 1);
    }

    #[test]
    fn try_acquire_on_exhausted_pool_fails() {
        let pool = pool_of(1);
        let _held = pool.acquire();

        assert!(matches!(
            pool.try_acquire(),
            Err(Error::PoolExhausted { timeout: None })
        ));
    }

    #[test]
    fn acquire_timeout_elapses() {
        let pool = pool_of(1);
        let _held = pool.acquire();

        let timeout = Duration::from_millis(10);
        assert!(matches!(
            pool.acquire_timeout(timeout),
            Err(Error::PoolExhausted { timeout: Some(t) }) if t == timeout
        ));
    }

    #[test]
    fn lease_drop_recycles() {
        let pool = pool_of(1);

        pool.acquire().extend_from_slice(b"sentinel");

        assert!(pool.acquire().is_empty());
    }

    #[test]
    fn statistics_track_leases() {
        let pool = pool_of(4);
        let first = pool.acquire();
        let second = pool.acquire();

        assert_eq!(
            pool.statistics(),
            PoolStats {
                capacity: 4,
                available: 2,
                leased: 2,
                constructed: 2,
            }
        );

        drop(first);
        drop(second);

        let stats = pool.statistics();
        assert_eq!(stats.available, 4);
        assert_eq!(stats.leased, 0);
    }

    #[test]
    fn detach_and_release() {
        let pool = pool_of(1);

        let mut value = pool.acquire().detach();
        value.push(1);
        assert!(pool.try_acquire().is_err());

        pool.release(value);

        assert!(pool.try_acquire().unwrap().is_empty());
    }

    #[test]
    fn release_into_full_pool_drops_value() {
        let pool = pool_of(2);

        pool.release(vec![1, 2, 3]);

        let stats = pool.statistics();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.leased, 0);
    }

    #[test]
    fn pair_on_single_slot_pool_uses_overflow() {
        let pool = pool_of(1);

        let (first, second) = pool.acquire_pair();
        assert_eq!(pool.statistics().leased, 1);

        drop(second);
        drop(first);

        let stats = pool.statistics();
        assert_eq!(stats.available, 1);
        assert_eq!(stats.leased, 0);
    }

    #[test]
    fn pair_takes_two_slots() {
        let pool = pool_of(2);

        pool.with_pair(|a, b| {
            a.push(1);
            b.push(2);
            assert_eq!(pool.statistics().leased, 2);
        });

        assert_eq!(pool.statistics().available, 2);
    }

    #[test]
    fn with_returns_value_after_panic() {
        let pool = pool_of(1);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pool.with(|value| {
                value.push(1);
                panic!("boom");
            });
        }));

        assert!(result.is_err());
        assert!(pool.try_acquire().unwrap().is_empty());
    }

    #[test]
    fn panicking_factory_keeps_slot_cold() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);

        let pool = BufferPool::builder(move || {
            assert!(
                counter.fetch_add(1, Ordering::Relaxed) > 0,
                "first construction fails"
            );
            Vec::<u8>::new()
        })
        .capacity(NonZero::new(1).unwrap())
        .build();

        let result = panic::catch_unwind(AssertUnwindSafe(|| drop(pool.acquire())));
        assert!(result.is_err());

        assert_eq!(
            pool.statistics(),
            PoolStats {
                capacity: 1,
                available: 1,
                leased: 0,
                constructed: 0,
            }
        );

        drop(pool.acquire());
        assert_eq!(pool.statistics().constructed, 1);
    }

    #[test]
    fn default_pool_lends_growable_buffers() {
        let pool = BufferPool::new();

        let mut lease = pool.acquire();
        lease.write_i32(1).unwrap();
        assert_eq!(lease.capacity(), crate::DEFAULT_POOLED_BUFFER_CAPACITY);
        assert_eq!(pool.statistics().capacity, crate::DEFAULT_POOL_CAPACITY.get());
    }
}
