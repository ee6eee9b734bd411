use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::cleaner::CleanerShared;

/// Keeps a closer registered with a [`ResourceCleaner`][crate::ResourceCleaner] from running.
///
/// Dropping the token queues the closer for the cleaner's worker thread. Use
/// [`close()`][Self::close] to run it right away on the current thread.
#[must_use = "dropping the token immediately schedules its closer"]
pub struct CleanupToken {
    shared: Arc<CleanerShared>,

    // `None` once closed.
    id: Option<u64>,
}

impl CleanupToken {
    pub(crate) fn new(shared: Arc<CleanerShared>, id: u64) -> Self {
        Self {
            shared,
            id: Some(id),
        }
    }

    /// Runs the closer on the current thread before returning.
    ///
    /// A panic in the closer is logged, not propagated, same as on the worker thread.
    pub fn close(mut self) {
        if let Some(id) = self.id.take() {
            self.shared.run(id);
        }
    }
}

impl Drop for CleanupToken {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.shared.notify_dropped(id);
        }
    }
}

impl fmt::Debug for CleanupToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupToken")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A value paired with the [`CleanupToken`] that releases whatever it depends on.
///
/// Dereferences to the value. Dropping the wrapper drops the value first, then the token.
pub struct Tracked<T> {
    value: T,
    token: CleanupToken,
}

impl<T> Tracked<T> {
    pub(crate) fn new(value: T, token: CleanupToken) -> Self {
        Self { value, token }
    }

    /// Runs the closer on the current thread and hands back the value.
    #[must_use]
    pub fn close(self) -> T {
        self.token.close();
        self.value
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> fmt::Debug for Tracked<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("value", &self.value)
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::ResourceCleaner;

    assert_impl_all!(CleanupToken: Send, Sync);
    assert_impl_all!(Tracked<Vec<u8>>: Send, Sync);

    #[test]
    fn close_runs_inline_once() {
        let cleaner = ResourceCleaner::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let closer_counter = Arc::clone(&counter);
        let token = cleaner.register(move || {
            closer_counter.fetch_add(1, Ordering::Relaxed);
        });

        token.close();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert_eq!(cleaner.pending(), 0);

        cleaner.dispose();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn tracked_close_returns_value() {
        let cleaner = ResourceCleaner::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let closer_counter = Arc::clone(&counter);
        let mut tracked = cleaner.track(String::from("mapped"), move || {
            closer_counter.fetch_add(1, Ordering::Relaxed);
        });

        tracked.push_str(" region");
        let value = tracked.close();

        assert_eq!(value, "mapped region");
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn closer_panic_in_close_is_contained() {
        let cleaner = ResourceCleaner::new();

        cleaner.register(|| panic!("closer failure")).close();

        assert_eq!(cleaner.pending(), 0);
    }
}
