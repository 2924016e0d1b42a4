use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{GuardError, Result};

use super::controller::{CaptureController, CycleOutcome};

/// Fixed-rate driver for `CaptureController::run_cycle`.
///
/// Waits `initial_delay`, then ticks every `interval`. Ends on `cancel`, when
/// the controller halts (stop or detection), or on a non-retryable error.
/// To resume after a detection, call `CaptureController::restart` and spawn a
/// new scheduler.
pub struct Scheduler {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
    controller: Arc<CaptureController>,
}

impl Scheduler {
    pub fn spawn(
        controller: Arc<CaptureController>,
        initial_delay: Duration,
        interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let worker = controller.clone();
        let handle = thread::Builder::new()
            .name("camguard-scheduler".to_string())
            .spawn(move || {
                let mut next_tick = Instant::now() + initial_delay;
                loop {
                    let wait = next_tick.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    next_tick += interval;

                    match worker.run_cycle() {
                        Ok(CycleOutcome::Halted) => {
                            log::info!("scheduler: controller halted, no further cycles");
                            break;
                        }
                        Ok(outcome) => log::debug!("scheduler: tick -> {:?}", outcome),
                        Err(err) => {
                            log::error!("scheduler: cycle failed: {}", err);
                            worker.report_error(&err);
                            if !err.is_retryable() {
                                log::error!("scheduler: error is not retryable, halting");
                                break;
                            }
                        }
                    }
                }
            })
            .map_err(|err| GuardError::Device(format!("spawn scheduler thread: {}", err)))?;

        log::info!(
            "scheduler started (initial delay {:?}, interval {:?})",
            initial_delay,
            interval
        );
        Ok(Self {
            stop_tx,
            handle: Some(handle),
            controller,
        })
    }

    /// True once the scheduling thread has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }

    /// Stop ticking, stop the controller, and wait for the thread.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        self.controller.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}
