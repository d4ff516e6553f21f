use std::{
    sync::mpsc::{RecvTimeoutError, SyncSender},
    thread::JoinHandle,
    time::Duration,
};

use rand::{thread_rng, Rng};

/// Callback invoked on every tick of a [`PeriodicTimer`].
pub type TickCallback = Box<dyn FnMut() + Send>;

/// Invokes a callback repeatedly: first after `initial_delay`, then every `interval`.
///
/// Ticks never overlap: the next delay starts once the callback returns.
pub trait PeriodicTimer: Send {
    /// Start ticking. Scheduling an already scheduled timer replaces the previous schedule.
    fn schedule(
        &mut self,
        initial_delay: Duration,
        interval: Duration,
        on_tick: TickCallback,
    ) -> std::io::Result<()>;

    /// Stop ticking. Safe to call multiple times.
    fn cancel(&mut self);
}

/// A [`PeriodicTimer`] running its callback on a dedicated thread.
pub struct ThreadTimer {
    name: String,
    jitter: Duration,
    running: Option<(SyncSender<()>, JoinHandle<()>)>,
}

impl ThreadTimer {
    /// Create a timer whose thread is called `name`. Every interval is extended by a random
    /// duration up to `jitter`.
    pub fn new(name: impl Into<String>, jitter: Duration) -> ThreadTimer {
        ThreadTimer {
            name: name.into(),
            jitter,
            running: None,
        }
    }
}

impl PeriodicTimer for ThreadTimer {
    fn schedule(
        &mut self,
        initial_delay: Duration,
        interval: Duration,
        mut on_tick: TickCallback,
    ) -> std::io::Result<()> {
        self.cancel();

        // Using `sync_channel` here as it makes the sender `Sync`. Buffer size of 1 is enough as
        // we only ever send a stop command, and `try_send()` can ignore a full buffer.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);
        let jitter_range = self.jitter;

        let join_handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let mut timeout = initial_delay;
                loop {
                    match stop_receiver.recv_timeout(timeout) {
                        Err(RecvTimeoutError::Timeout) => {
                            let result =
                                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| on_tick()));
                            if result.is_err() {
                                log::error!(target: "split", "periodic timer callback panicked");
                            }
                        }
                        Ok(()) => {
                            log::debug!(target: "split", "timer thread received stop command");
                            return;
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            // The timer was dropped without being cancelled.
                            log::debug!(target: "split", "timer thread received disconnected");
                            return;
                        }
                    }
                    timeout = jitter(interval, jitter_range);
                }
            })?;

        self.running = Some((stop_sender, join_handle));
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some((stop_sender, join_handle)) = self.running.take() {
            // A full buffer means a stop command is already pending.
            let _ = stop_sender.try_send(());
            if join_handle.join().is_err() {
                log::warn!(target: "split", timer = self.name.as_str(); "timer thread panicked");
            }
        }
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Apply a random jitter to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return interval;
    }
    interval + thread_rng().gen_range(Duration::ZERO..jitter)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::{jitter, PeriodicTimer, ThreadTimer};

    #[test]
    fn jitter_stays_within_range() {
        let interval = Duration::from_secs(30);
        let max = Duration::from_secs(3);
        for _ in 0..100 {
            let value = jitter(interval, max);
            assert!(value >= interval && value < interval + max);
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let interval = Duration::from_secs(30);
        assert_eq!(jitter(interval, Duration::ZERO), interval);
    }

    #[test]
    fn ticks_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut timer = ThreadTimer::new("test-timer", Duration::ZERO);
        {
            let ticks = ticks.clone();
            timer
                .schedule(
                    Duration::ZERO,
                    Duration::from_millis(1),
                    Box::new(move || {
                        ticks.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
        }

        while ticks.load(Ordering::SeqCst) < 3 {
            std::thread::sleep(Duration::from_millis(1));
        }
        timer.cancel();
        timer.cancel();

        let after_cancel = ticks.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
    }
}
