use std::{
    sync::{Condvar, Mutex},
    time::Duration,
};

/// Cancellation flag shared between a worker and whoever controls it.
///
/// Waiting on the signal is interruptible: [`StopSignal::stop`] wakes up every waiter.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    /// Create a signal that is not stopped.
    pub fn new() -> StopSignal {
        StopSignal::default()
    }

    /// Raise the signal. Safe to call any number of times from any thread.
    pub fn stop(&self) {
        let mut stopped = self
            .stopped
            .lock()
            .expect("thread holding stop signal lock should not panic");
        *stopped = true;
        self.condvar.notify_all();
    }

    /// Whether [`StopSignal::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        *self
            .stopped
            .lock()
            .expect("thread holding stop signal lock should not panic")
    }

    /// Block for up to `timeout`. Returns `true` if the signal was raised before the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let stopped = self
            .stopped
            .lock()
            .expect("thread holding stop signal lock should not panic");
        let (stopped, _) = self
            .condvar
            .wait_timeout_while(stopped, timeout, |stopped| !*stopped)
            .expect("thread holding stop signal lock should not panic");
        *stopped
    }
}
