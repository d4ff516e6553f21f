use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

use crate::{
    sync::{
        PeriodicSyncWorker, ReconcileOutcome, SyncEvent, SyncEventListener, SyncWorkerFactory,
        SyncWorkerHandle, UpdateNotification, UpdateReconciler,
    },
    Error, Result,
};

/// Keeps split and segment storage in sync for one user key.
///
/// [`Synchronizer::start`] runs the initial sync on retryable workers and starts periodic
/// refreshes. [`SyncEvent::Ready`] is reported once the initial sync has completed. Push
/// notifications are fed through [`Synchronizer::notify`].
pub struct Synchronizer {
    factory: Arc<SyncWorkerFactory>,
    user_key: String,
    reconciler: UpdateReconciler,
    workers: Mutex<Workers>,
    ready: Arc<AtomicBool>,
}

#[derive(Default)]
struct Workers {
    started: bool,
    bootstrap: Vec<SyncWorkerHandle>,
    /// Reports readiness once every bootstrap worker has succeeded.
    readiness: Option<JoinHandle<()>>,
    on_demand: Vec<SyncWorkerHandle>,
    periodic: Vec<PeriodicSyncWorker>,
}

impl Synchronizer {
    /// Create a synchronizer for `user_key`. Nothing runs until [`Synchronizer::start`].
    pub fn new(factory: Arc<SyncWorkerFactory>, user_key: impl Into<String>) -> Synchronizer {
        Synchronizer {
            reconciler: UpdateReconciler::new(factory.split_storage(), Arc::clone(&factory)),
            factory,
            user_key: user_key.into(),
            workers: Mutex::new(Workers::default()),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the initial sync and periodic refreshes.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerAlreadyStarted`] if called more than once.
    /// - [`Error::Io`] if a worker thread failed to start.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.lock_workers();
        if workers.started {
            return Err(Error::WorkerAlreadyStarted);
        }
        workers.started = true;

        log::debug!(target: "split", user_key = self.user_key.as_str(); "starting synchronization");
        workers
            .bootstrap
            .push(self.factory.splits_sync_worker().start()?);
        workers
            .bootstrap
            .push(self.factory.segments_sync_worker(&self.user_key).start()?);

        let statuses: Vec<_> = workers.bootstrap.iter().map(SyncWorkerHandle::status).collect();
        let ready = Arc::clone(&self.ready);
        let listener = self.factory.listener();
        let user_key = self.user_key.clone();
        workers.readiness = Some(
            std::thread::Builder::new()
                .name("split-readiness".to_owned())
                .spawn(move || {
                    if statuses.iter().all(|status| status.wait().is_ok()) {
                        mark_ready(&ready, listener.as_ref(), &user_key);
                    }
                })?,
        );

        let mut splits = self.factory.periodic_splits_worker();
        splits.start()?;
        workers.periodic.push(splits);

        let mut segments = self.factory.periodic_segments_worker(&self.user_key);
        segments.start()?;
        workers.periodic.push(segments);

        Ok(())
    }

    /// Block until the initial sync of splits and segments has completed.
    ///
    /// # Errors
    ///
    /// Returns the error that failed a bootstrap worker, or [`Error::WorkerStopped`] if the
    /// synchronizer was stopped first.
    pub fn wait_until_ready(&self) -> Result<()> {
        // Not holding the lock while waiting so that `stop()` can get through.
        let statuses: Vec<_> = self
            .lock_workers()
            .bootstrap
            .iter()
            .map(SyncWorkerHandle::status)
            .collect();
        if statuses.is_empty() && !self.ready.load(Ordering::SeqCst) {
            return Err(Error::WorkerStopped);
        }

        for status in statuses {
            status.wait()?;
        }

        mark_ready(&self.ready, self.factory.listener().as_ref(), &self.user_key);
        Ok(())
    }

    /// Whether the initial sync of splits and segments has completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Reconcile a push notification with split storage.
    pub fn notify(&self, notification: UpdateNotification) -> Result<ReconcileOutcome> {
        self.reconciler.notify(notification)
    }

    /// Trigger an immediate split sync (e.g., after the push channel reconnects).
    pub fn synchronize_splits(&self) -> Result<()> {
        let handle = self.factory.splits_sync_worker().start()?;
        self.track(handle);
        Ok(())
    }

    /// Trigger an immediate refresh of the user's segments.
    pub fn synchronize_segments(&self) -> Result<()> {
        let handle = self.factory.segments_sync_worker(&self.user_key).start()?;
        self.track(handle);
        Ok(())
    }

    /// Ask every worker to stop without waiting for them. No worker starts a new fetch after this
    /// returns.
    pub fn stop(&self) {
        let workers = self.lock_workers();
        for handle in workers.bootstrap.iter().chain(&workers.on_demand) {
            handle.stop();
        }
        for worker in &workers.periodic {
            worker.signal_stop();
        }
        self.reconciler.stop();
    }

    /// Stop every worker and wait for their threads to exit. Safe to call multiple times.
    pub fn shutdown(&self) -> Result<()> {
        self.stop();

        let (handles, readiness, periodic) = {
            let mut guard = self.lock_workers();
            let workers = &mut *guard;
            let handles: Vec<_> = workers
                .bootstrap
                .drain(..)
                .chain(workers.on_demand.drain(..))
                .collect();
            (
                handles,
                workers.readiness.take(),
                std::mem::take(&mut workers.periodic),
            )
        };

        for mut worker in periodic {
            worker.stop();
        }
        self.reconciler.shutdown()?;
        for handle in handles {
            handle.shutdown()?;
        }
        // Bootstrap workers are done, so this returns promptly.
        if let Some(readiness) = readiness {
            readiness.join().map_err(|_| Error::WorkerThreadPanicked)?;
        }

        log::debug!(target: "split", user_key = self.user_key.as_str(); "synchronization stopped");
        Ok(())
    }

    fn track(&self, handle: SyncWorkerHandle) {
        let mut workers = self.lock_workers();
        workers.on_demand.retain(|handle| !handle.is_finished());
        workers.on_demand.push(handle);
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Workers> {
        self.workers
            .lock()
            .expect("thread holding synchronizer lock should not panic")
    }
}

fn mark_ready(ready: &AtomicBool, listener: &dyn SyncEventListener, user_key: &str) {
    if !ready.swap(true, Ordering::SeqCst) {
        log::debug!(target: "split", user_key; "synchronizer is ready");
        listener.on_event(SyncEvent::Ready);
    }
}
