use crate::error::GuardError;

/// Receiver for pipeline notifications (playback surface, UI, tests).
///
/// Callbacks run on the scheduler or camera delivery thread, never while the
/// controller lock is held, so implementations may call back into the
/// controller.
pub trait PipelineObserver: Send + Sync {
    /// A capture cycle began opening the camera.
    fn on_cycle_start(&self) {}

    /// The cycle's camera session is closed (decision reached, failed, or
    /// stopped).
    fn on_cycle_stop(&self) {}

    /// `true` once a camera was detected, `false` when the pipeline is
    /// restarted afterwards.
    fn on_detection_state_changed(&self, detected: bool) {
        let _ = detected;
    }

    /// A session-level error that aborted a cycle.
    fn on_error(&self, error: &GuardError) {
        let _ = error;
    }
}

/// Observer that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_cycle_start(&self) {
        log::info!("capture cycle started");
    }

    fn on_cycle_stop(&self) {
        log::info!("capture cycle stopped");
    }

    fn on_detection_state_changed(&self, detected: bool) {
        if detected {
            log::warn!("camera detected; sampling halted");
        } else {
            log::info!("detection cleared; sampling may resume");
        }
    }

    fn on_error(&self, error: &GuardError) {
        log::error!("capture cycle failed: {}", error);
    }
}
