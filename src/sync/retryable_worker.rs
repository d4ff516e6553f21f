use std::sync::{Arc, Condvar, Mutex};

use crate::{
    sync::{BackoffCounter, StopSignal, SyncEvent, SyncEventListener, SyncTask},
    Error, Result,
};

/// Lifecycle of a [`RetryableSyncWorker`].
#[derive(Debug, Clone)]
pub enum WorkerState {
    /// The worker thread hasn't picked up the task yet.
    Idle,
    /// The task is being attempted (or the worker waits for the next attempt).
    Running,
    /// The task completed successfully.
    Succeeded,
    /// The worker was stopped before the task completed.
    Stopped,
    /// The task failed with an unrecoverable error or ran out of attempts.
    Failed(Error),
}

impl WorkerState {
    fn is_terminal(&self) -> bool {
        !matches!(self, WorkerState::Idle | WorkerState::Running)
    }
}

/// Runs a [`SyncTask`] until it succeeds, retrying failures with exponential backoff.
///
/// By default, recoverable failures are retried until the worker is stopped. With
/// [`RetryableSyncWorker::with_max_retries`], the worker gives up after that many attempts.
/// Unrecoverable errors (see [`Error::is_recoverable`]) fail the worker immediately.
///
/// A worker is single-use: [`RetryableSyncWorker::start`] consumes it.
pub struct RetryableSyncWorker {
    task: Box<dyn SyncTask>,
    backoff: BackoffCounter,
    max_retries: Option<u32>,
    listener: Arc<dyn SyncEventListener>,
}

/// Shared between a worker thread and its handle.
pub(crate) struct WorkerStatus {
    stop: StopSignal,
    state: Mutex<WorkerState>,
    condvar: Condvar,
}

impl WorkerStatus {
    fn new() -> WorkerStatus {
        WorkerStatus {
            stop: StopSignal::new(),
            state: Mutex::new(WorkerState::Idle),
            condvar: Condvar::new(),
        }
    }

    fn set(&self, state: WorkerState) {
        let mut current = self
            .state
            .lock()
            .expect("thread holding worker state lock should not panic");
        // Terminal states are final.
        if !current.is_terminal() {
            *current = state;
        }
        self.condvar.notify_all();
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.state
            .lock()
            .expect("thread holding worker state lock should not panic")
            .clone()
    }

    pub(crate) fn stop(&self) {
        self.stop.stop();
    }

    /// Block until the worker reaches a terminal state.
    pub(crate) fn wait(&self) -> Result<()> {
        let lock = self
            .state
            .lock()
            .map_err(|_| Error::WorkerThreadPanicked)?;
        let state = self
            .condvar
            .wait_while(lock, |state| !state.is_terminal())
            .map_err(|_| Error::WorkerThreadPanicked)?;
        match &*state {
            WorkerState::Succeeded => Ok(()),
            WorkerState::Failed(err) => Err(err.clone()),
            _ => Err(Error::WorkerStopped),
        }
    }
}

impl RetryableSyncWorker {
    /// Create a worker retrying `task` with delays produced by `backoff`.
    pub fn new(
        task: impl SyncTask + 'static,
        backoff: BackoffCounter,
        listener: Arc<dyn SyncEventListener>,
    ) -> RetryableSyncWorker {
        RetryableSyncWorker {
            task: Box::new(task),
            backoff,
            max_retries: None,
            listener,
        }
    }

    /// Give up after `max_retries` attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> RetryableSyncWorker {
        self.max_retries = Some(max_retries);
        self
    }

    /// Start the worker on a new thread.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the thread could not be spawned.
    pub fn start(mut self) -> std::io::Result<SyncWorkerHandle> {
        let status = Arc::new(WorkerStatus::new());

        let join_handle = {
            // Cloning Arc for move into thread
            let status = Arc::clone(&status);
            std::thread::Builder::new()
                .name(format!("split-{}", self.task.name()))
                .spawn(move || {
                    status.set(WorkerState::Running);
                    let result =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            self.run(&status.stop)
                        }));
                    match result {
                        Ok(state) => status.set(state),
                        // If catch_unwind returns Err, it means a panic occurred.
                        Err(_panic_info) => {
                            log::error!(target: "split", "sync worker thread panicked");
                            status.set(WorkerState::Failed(Error::WorkerThreadPanicked));
                        }
                    }
                })?
        };

        Ok(SyncWorkerHandle {
            join_handle,
            status,
        })
    }

    fn run(&mut self, stop: &StopSignal) -> WorkerState {
        let task_name = self.task.name().to_owned();
        let mut attempts: u32 = 0;

        loop {
            // Checked before every attempt, not only before waiting.
            if stop.is_stopped() {
                log::debug!(target: "split", task = task_name.as_str(); "sync worker received stop command");
                return WorkerState::Stopped;
            }

            attempts += 1;
            let err = match self.task.sync(stop) {
                Ok(()) => {
                    log::debug!(target: "split", task = task_name.as_str(), attempts; "sync task succeeded");
                    self.backoff.reset();
                    self.listener
                        .on_event(SyncEvent::SyncSucceeded { task: task_name });
                    return WorkerState::Succeeded;
                }
                Err(Error::WorkerStopped) => return WorkerState::Stopped,
                Err(err) => err,
            };

            if !err.is_recoverable() {
                log::warn!(target: "split", task = task_name.as_str(); "sync task failed with unrecoverable error: {err}");
                return self.fail(task_name, err);
            }

            if self.max_retries.is_some_and(|max| attempts >= max) {
                log::warn!(target: "split", task = task_name.as_str(), attempts; "giving up sync task: {err}");
                return self.fail(task_name, Error::RetriesExhausted { attempts });
            }

            let delay = self.backoff.next_delay();
            log::warn!(target: "split",
                       task = task_name.as_str(),
                       attempt = attempts,
                       delay_ms = delay.as_millis() as u64;
                       "sync task failed, retrying: {err}");
            self.listener.on_event(SyncEvent::RetryScheduled {
                task: task_name.clone(),
                attempt: attempts,
                delay,
            });

            if stop.wait_timeout(delay) {
                return WorkerState::Stopped;
            }
        }
    }

    fn fail(&self, task: String, error: Error) -> WorkerState {
        self.listener.on_event(SyncEvent::SyncFailed {
            task,
            error: error.clone(),
        });
        WorkerState::Failed(error)
    }
}

/// Handle to a started [`RetryableSyncWorker`].
pub struct SyncWorkerHandle {
    join_handle: std::thread::JoinHandle<()>,
    status: Arc<WorkerStatus>,
}

impl SyncWorkerHandle {
    /// Ask the worker to stop. Safe to call any number of times, in any state.
    ///
    /// This function does not wait for the thread to actually stop. A fetch already in flight is
    /// not aborted but its result is discarded.
    pub fn stop(&self) {
        self.status.stop();
    }

    /// Current state of the worker.
    pub fn state(&self) -> WorkerState {
        self.status.state()
    }

    /// Whether the worker has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Block until the worker succeeds, fails or is stopped.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerStopped`] if the worker was stopped first.
    /// - [`Error::RetriesExhausted`] if a bounded worker gave up.
    /// - the unrecoverable error that failed the worker.
    pub fn wait_for_completion(&self) -> Result<()> {
        self.status.wait()
    }

    pub(crate) fn status(&self) -> Arc<WorkerStatus> {
        Arc::clone(&self.status)
    }

    /// Stop the worker and block waiting for its thread to exit.
    ///
    /// If you don't need to wait for the thread to exit, use [`SyncWorkerHandle::stop`] instead.
    pub fn shutdown(self) -> Result<()> {
        self.stop();

        // Error means that the thread has panicked and there's nothing useful we can do in that
        // case.
        self.join_handle
            .join()
            .map_err(|_| Error::WorkerThreadPanicked)?;

        Ok(())
    }
}
