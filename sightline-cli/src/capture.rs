//! Periodic capture timer

use crate::error::CaptureError;
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Runs a capture cycle immediately and then every `interval`.
///
/// Cycles never overlap: the loop awaits each cycle before waiting for the
/// next tick, and ticks missed while a cycle was running are skipped.
/// Stopping prevents future cycles only; a cycle already running completes.
pub struct CaptureTimer {
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl CaptureTimer {
    pub fn new(interval: Duration) -> Result<Self, CaptureError> {
        if interval.is_zero() {
            return Err(CaptureError::InvalidInterval);
        }
        Ok(Self {
            interval,
            running: Mutex::new(None),
        })
    }

    pub fn from_millis(interval_ms: u64) -> Result<Self, CaptureError> {
        Self::new(Duration::from_millis(interval_ms))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the loop. Returns `false` without side effects when already
    /// running. Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, mut on_tick: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                return false;
            }
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => on_tick().await,
                }
            }
            debug!("Capture loop stopped");
        });

        *running = Some(RunningLoop { shutdown, handle });
        true
    }

    /// Stop future cycles. Returns `false` if the timer was idle.
    pub fn stop(&self) -> bool {
        match self.running.lock().take() {
            Some(current) => {
                let _ = current.shutdown.send(true);
                !current.handle.is_finished()
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .map_or(false, |current| !current.handle.is_finished())
    }
}

impl Drop for CaptureTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
