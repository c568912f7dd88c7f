//! Single-slot coordination for long-running jobs.
//!
//! Building a distribution, generating data, and running an experiment are
//! CPU-bound and blocking. At most one of them may be in flight per
//! [`RunCoordinator`]; a second submission fails immediately with
//! [`ResourceBusy`] instead of queueing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use sumlab_domain::ProgressSink;
use sumlab_error::ResourceBusy;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Busy(#[from] ResourceBusy),

    #[error("failed to spawn worker thread `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker thread `{name}` panicked")]
    Panicked { name: String },
}

/// Holds the single slot until dropped.
#[derive(Debug)]
pub struct Permit {
    busy: Arc<AtomicBool>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Non-blocking single-permit gate. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct RunCoordinator {
    busy: Arc<AtomicBool>,
}

impl RunCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Take the slot if it is free.
    pub fn try_acquire(&self) -> Result<Permit, ResourceBusy> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ResourceBusy)?;
        Ok(Permit {
            busy: Arc::clone(&self.busy),
        })
    }

    /// Run `job` on a named worker thread while holding the slot.
    ///
    /// The slot is released when the job returns or panics. Progress reported
    /// through the sink handed to `job` is delivered by [`JobHandle::wait`].
    pub fn try_submit<F, T>(&self, name: &str, job: F) -> Result<JobHandle<T>, CoordinatorError>
    where
        F: FnOnce(&ChannelProgress) -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.try_acquire()?;
        let (tx, rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _permit = permit;
                let sink = ChannelProgress { tx };
                job(&sink)
            })
            .map_err(|source| CoordinatorError::Spawn {
                name: name.to_string(),
                source,
            })?;

        debug!(job = name, "worker started");
        Ok(JobHandle {
            name: name.to_string(),
            progress: rx,
            handle,
        })
    }
}

/// Progress sink that forwards percentages to the submitting thread.
#[derive(Debug)]
pub struct ChannelProgress {
    tx: mpsc::Sender<u8>,
}

impl ProgressSink for ChannelProgress {
    fn report(&self, percent: u8) {
        // the caller may have stopped listening; the job keeps going
        let _ = self.tx.send(percent);
    }
}

/// Completion handle for a submitted job.
#[derive(Debug)]
pub struct JobHandle<T> {
    name: String,
    progress: mpsc::Receiver<u8>,
    handle: thread::JoinHandle<T>,
}

impl<T> JobHandle<T> {
    /// Block until the job finishes, feeding every progress update to
    /// `on_progress` in order.
    pub fn wait(self, mut on_progress: impl FnMut(u8)) -> Result<T, CoordinatorError> {
        for percent in self.progress.iter() {
            on_progress(percent);
        }
        self.handle
            .join()
            .map_err(|_| CoordinatorError::Panicked { name: self.name })
    }
}
