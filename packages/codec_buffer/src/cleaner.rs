use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::{CleanupToken, ResourceCleanerBuilder, Tracked};

type Closer = Box<dyn FnOnce() + Send>;

/// State shared between the cleaner, its worker thread and every token it has issued.
pub(crate) struct CleanerShared {
    registry: Mutex<HashMap<u64, Closer>>,
    next_id: AtomicU64,
    disposed: AtomicBool,

    // Ids of tokens that have been dropped and whose closers have not run yet.
    queue_tx: Sender<u64>,
    queue_rx: Receiver<u64>,
}

impl CleanerShared {
    /// Called when a token is dropped without being closed.
    pub(crate) fn notify_dropped(&self, id: u64) {
        // Acquire pairs with the Release in dispose(), after which nobody consumes the queue.
        if self.disposed.load(Ordering::Acquire) || self.queue_tx.send(id).is_err() {
            self.run(id);
            return;
        }

        // The cleaner may have been disposed between the check and the send, in which case the
        // id would sit in the queue forever.
        if self.disposed.load(Ordering::Acquire) {
            self.drain();
        }
    }

    /// Runs the closer registered under `id`, unless it already ran.
    ///
    /// Returns whether a closer was executed.
    pub(crate) fn run(&self, id: u64) -> bool {
        // Removal under the lock is what makes a closer run at most once, whoever gets here first.
        let Some(closer) = self.registry.lock().remove(&id) else {
            return false;
        };

        trace!(id, "running closer");

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(closer)) {
            error!(
                id,
                panic_message = %format_panic_payload(&payload),
                "closer panicked, continuing with the next one"
            );
        }

        true
    }

    fn drain(&self) -> usize {
        let mut executed: usize = 0;

        while let Ok(id) = self.queue_rx.try_recv() {
            if self.run(id) {
                executed = executed.wrapping_add(1);
            }
        }

        executed
    }
}

/// Runs cleanup callbacks for resources whose owners went away without releasing them.
///
/// Each registration hands out a [`CleanupToken`]. When the token is dropped, the cleanup is
/// queued and a background worker thread runs the associated closer. Closing the token
/// explicitly via [`CleanupToken::close()`] runs the closer immediately on the calling thread
/// instead. Either way, every closer runs exactly once.
///
/// This is a fallback for owners that do not follow scoped acquisition. Types with a
/// deterministic `Drop` should release their resources there.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// use codec_buffer::ResourceCleaner;
///
/// let cleaner = ResourceCleaner::new();
/// let released = Arc::new(AtomicBool::new(false));
///
/// let flag = Arc::clone(&released);
/// let handle = cleaner.track(vec![0_u8; 1024], move || flag.store(true, Ordering::Relaxed));
/// assert_eq!(handle.len(), 1024);
///
/// drop(handle);
///
/// // Waits for the worker thread and runs whatever it has not picked up yet.
/// cleaner.dispose();
/// assert!(released.load(Ordering::Relaxed));
/// ```
///
/// # Lifetime
///
/// Dropping the cleaner disposes of it. Tokens outlive the cleaner that issued them: after
/// disposal, dropping a token runs its closer inline on the dropping thread.
pub struct ResourceCleaner {
    shared: Arc<CleanerShared>,

    // Dropping the sender tells the worker to exit.
    stop_tx: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceCleaner {
    /// Creates a cleaner with the default configuration and starts its worker thread.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a cleaner with a custom configuration.
    pub fn builder() -> ResourceCleanerBuilder {
        ResourceCleanerBuilder::new()
    }

    pub(crate) fn new_inner(thread_name: String) -> Self {
        let (queue_tx, queue_rx) = channel::unbounded();
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let shared = Arc::new(CleanerShared {
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            queue_tx,
            queue_rx,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                debug!("cleaner worker started");
                worker_loop(&worker_shared, &stop_rx);
                debug!("cleaner worker exiting");
            })
            .expect("failed to spawn cleaner thread: thread spawning failure is not supported");

        Self {
            shared,
            stop_tx: Mutex::new(Some(stop_tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Registers `closer` to run once the returned token is dropped or closed.
    pub fn register<F>(&self, closer: F) -> CleanupToken
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.registry.lock().insert(id, Box::new(closer));

        CleanupToken::new(Arc::clone(&self.shared), id)
    }

    /// Wraps `value` so that `closer` runs once the wrapper is dropped or closed.
    pub fn track<T, F>(&self, value: T, closer: F) -> Tracked<T>
    where
        F: FnOnce() + Send + 'static,
    {
        Tracked::new(value, self.register(closer))
    }

    /// Runs the closers of all tokens dropped so far that the worker has not picked up yet.
    ///
    /// Does not wait for anything. Returns the number of closers executed by this call.
    pub fn process_queue(&self) -> usize {
        self.shared.drain()
    }

    /// Number of registered closers that have not run yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Stops the worker thread, waits for it to exit and then runs everything still queued.
    ///
    /// Calling this more than once has no further effect. Closers of tokens that are still
    /// alive are not run, they run inline when their token is eventually dropped.
    pub fn dispose(&self) {
        // Release pairs with the Acquire in notify_dropped().
        self.shared.disposed.store(true, Ordering::Release);

        drop(self.stop_tx.lock().take());

        if let Some(worker) = self.worker.lock().take() {
            // The worker traps closer panics, so a panic here means the loop itself is broken.
            if let Err(payload) = worker.join() {
                panic::resume_unwind(payload);
            }
        }

        let executed = self.shared.drain();
        if executed > 0 {
            debug!(executed, "ran queued closers after worker exit");
        }
    }
}

impl Default for ResourceCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceCleaner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ResourceCleaner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCleaner")
            .field("pending", &self.pending())
            .field("disposed", &self.shared.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg_attr(test, mutants::skip)] // Mutations cause the worker to never exit.
fn worker_loop(shared: &CleanerShared, stop_rx: &Receiver<()>) {
    loop {
        select! {
            recv(shared.queue_rx) -> id => match id {
                Ok(id) => {
                    shared.run(id);
                }
                // `shared` holds a sender, so this only happens if it is being torn down.
                Err(_) => break,
            },
            // Nothing is ever sent, the channel only disconnects.
            recv(stop_rx) -> _ => break,
        }
    }
}

fn format_panic_payload(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
