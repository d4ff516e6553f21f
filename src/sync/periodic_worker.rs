use std::{sync::Arc, time::Duration};

use crate::{
    sync::{PeriodicTimer, StopSignal, SyncEvent, SyncEventListener, SyncTask},
    Error, Result,
};

/// Runs one attempt of a [`SyncTask`] on every tick of a [`PeriodicTimer`].
///
/// Failures are logged and reported to the listener but never end the worker: the next tick tries
/// again. Only [`PeriodicSyncWorker::stop`] ends it.
pub struct PeriodicSyncWorker {
    task: Option<Box<dyn SyncTask>>,
    timer: Box<dyn PeriodicTimer>,
    interval: Duration,
    stop: Arc<StopSignal>,
    listener: Arc<dyn SyncEventListener>,
}

impl PeriodicSyncWorker {
    /// Create a worker running `task` every `interval`.
    pub fn new(
        task: impl SyncTask + 'static,
        timer: impl PeriodicTimer + 'static,
        interval: Duration,
        listener: Arc<dyn SyncEventListener>,
    ) -> PeriodicSyncWorker {
        PeriodicSyncWorker {
            task: Some(Box::new(task)),
            timer: Box::new(timer),
            interval,
            stop: Arc::new(StopSignal::new()),
            listener,
        }
    }

    /// Start ticking. The first attempt happens after one interval, as the initial sync is
    /// expected to have been done by a retryable worker.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerAlreadyStarted`] if the worker has been started before.
    /// - [`Error::Io`] if the timer failed to start.
    pub fn start(&mut self) -> Result<()> {
        let mut task = self.task.take().ok_or(Error::WorkerAlreadyStarted)?;
        let stop = Arc::clone(&self.stop);
        let listener = Arc::clone(&self.listener);

        self.timer.schedule(
            self.interval,
            self.interval,
            Box::new(move || {
                if stop.is_stopped() {
                    return;
                }
                let task_name = task.name().to_owned();
                match task.sync(&stop) {
                    Ok(()) => {
                        log::debug!(target: "split", task = task_name.as_str(); "periodic sync succeeded");
                        listener.on_event(SyncEvent::SyncSucceeded { task: task_name });
                    }
                    Err(Error::WorkerStopped) => {}
                    Err(error) => {
                        log::warn!(target: "split", task = task_name.as_str(); "periodic sync failed: {error}");
                        listener.on_event(SyncEvent::SyncFailed {
                            task: task_name,
                            error,
                        });
                    }
                }
            }),
        )?;

        Ok(())
    }

    /// Ask the worker to stop without waiting for a tick in progress. No fetch starts after this
    /// returns, but the timer keeps running until [`PeriodicSyncWorker::stop`].
    pub fn signal_stop(&self) {
        self.stop.stop();
    }

    /// Stop the worker and wait for a tick in progress to finish. Safe to call multiple times.
    pub fn stop(&mut self) {
        self.stop.stop();
        self.timer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use super::PeriodicSyncWorker;
    use crate::{
        sync::{PeriodicTimer, StopSignal, SyncEvent, SyncTask, TickCallback},
        Error, Result,
    };

    /// Timer ticking only when the test says so.
    #[derive(Clone, Default)]
    struct ManualTimer {
        callback: Arc<Mutex<Option<TickCallback>>>,
        schedule: Arc<Mutex<Option<(Duration, Duration)>>>,
    }

    impl ManualTimer {
        fn tick(&self) {
            if let Some(callback) = self.callback.lock().unwrap().as_mut() {
                callback();
            }
        }
    }

    impl PeriodicTimer for ManualTimer {
        fn schedule(
            &mut self,
            initial_delay: Duration,
            interval: Duration,
            on_tick: TickCallback,
        ) -> std::io::Result<()> {
            *self.schedule.lock().unwrap() = Some((initial_delay, interval));
            *self.callback.lock().unwrap() = Some(on_tick);
            Ok(())
        }

        fn cancel(&mut self) {
            *self.callback.lock().unwrap() = None;
        }
    }

    struct AlwaysFailing(Arc<AtomicU32>);

    impl SyncTask for AlwaysFailing {
        fn name(&self) -> &str {
            "always-failing"
        }

        fn sync(&mut self, _stop: &StopSignal) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(Error::Transport("503 Service Unavailable".to_owned()))
        }
    }

    #[test]
    fn keeps_ticking_after_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let failures = Arc::new(AtomicU32::new(0));
        let timer = ManualTimer::default();
        let listener = {
            let failures = failures.clone();
            move |event: SyncEvent| {
                if let SyncEvent::SyncFailed { .. } = event {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
            }
        };
        let mut worker = PeriodicSyncWorker::new(
            AlwaysFailing(attempts.clone()),
            timer.clone(),
            Duration::from_secs(60),
            Arc::new(listener),
        );

        worker.start().unwrap();
        assert_eq!(
            *timer.schedule.lock().unwrap(),
            Some((Duration::from_secs(60), Duration::from_secs(60)))
        );

        timer.tick();
        timer.tick();
        timer.tick();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(failures.load(Ordering::SeqCst), 3);

        worker.stop();
        worker.stop();
        timer.tick();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn signal_stop_skips_later_ticks() {
        let attempts = Arc::new(AtomicU32::new(0));
        let timer = ManualTimer::default();
        let mut worker = PeriodicSyncWorker::new(
            AlwaysFailing(attempts.clone()),
            timer.clone(),
            Duration::from_secs(60),
            Arc::new(|_: SyncEvent| {}),
        );
        worker.start().unwrap();

        timer.tick();
        worker.signal_stop();
        timer.tick();
        timer.tick();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        worker.stop();
    }

    #[test]
    fn cannot_start_twice() {
        let mut worker = PeriodicSyncWorker::new(
            AlwaysFailing(Arc::new(AtomicU32::new(0))),
            ManualTimer::default(),
            Duration::from_secs(60),
            Arc::new(|_: SyncEvent| {}),
        );
        worker.start().unwrap();
        assert!(matches!(worker.start(), Err(Error::WorkerAlreadyStarted)));
    }
}
