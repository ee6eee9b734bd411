use crate::ResourceCleaner;

const DEFAULT_THREAD_NAME: &str = "codec-buffer-cleaner";

/// Builder for creating an instance of [`ResourceCleaner`].
#[derive(Debug)]
#[must_use]
pub struct ResourceCleanerBuilder {
    thread_name: String,
}

impl ResourceCleanerBuilder {
    pub(crate) fn new() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    /// Sets the name of the worker thread, as shown in debuggers and panic messages.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Builds the cleaner and starts its worker thread.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to start the worker thread.
    #[must_use]
    pub fn build(self) -> ResourceCleaner {
        ResourceCleaner::new_inner(self.thread_name)
    }
}
