//! Capture session controller.
//!
//! Drives one camera session per cycle: open, configure, stream decoded
//! frames into the batch, close, inspect, decide. Frame delivery happens on
//! the camera's thread, cycles are started from the scheduler's thread, and
//! both meet under one mutex that guards the `SessionMachine` and the open
//! session handle.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use crate::color::ColorImage;
use crate::detect::ClassifierSlot;
use crate::error::{GuardError, Result};
use crate::frame::{Batch, ChromaLayout, RawFrame, DEFAULT_MAX_CAPTURES};
use crate::ingest::{
    decode_yuv420, Camera, CameraSession, FailureCallback, FrameCallback, OutputTarget,
};
use crate::inspect::{InspectionConfig, Inspector, Verdict};
use crate::store::{encode_jpeg, suggested_name, PersistenceSink, DEFAULT_JPEG_QUALITY, JPEG_MIME};

use super::observer::{LogObserver, PipelineObserver};
use super::state::{PushOutcome, SessionMachine, SessionState};

/// Static parameters of the controller.
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub device_id: String,
    pub width: u32,
    pub height: u32,
    pub layout: ChromaLayout,
    /// Frames collected per cycle.
    pub max_captures: usize,
    pub jpeg_quality: u8,
    pub inspection: InspectionConfig,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            device_id: "stub://front".to_string(),
            width: 640,
            height: 480,
            layout: ChromaLayout::Planar,
            max_captures: DEFAULT_MAX_CAPTURES,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            inspection: InspectionConfig::default(),
        }
    }
}

impl ControllerSettings {
    fn output_target(&self) -> OutputTarget {
        OutputTarget {
            width: self.width,
            height: self.height,
            layout: self.layout,
            max_images: self.max_captures,
        }
    }
}

/// Result of asking the controller to start a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A session is streaming.
    Started,
    /// A previous cycle is still streaming or deciding.
    Busy,
    /// Classifier not loaded; nothing was opened.
    Deferred,
    /// Stopped or terminated by a detection; scheduling should end.
    Halted,
}

struct Shared {
    machine: SessionMachine,
    session: Option<Box<dyn CameraSession>>,
    /// Incremented for every cycle that starts opening.
    cycle: u64,
    stopped: bool,
    decisions: u64,
    last_verdict: Option<Verdict>,
}

pub struct CaptureController {
    camera: Arc<dyn Camera>,
    classifier: ClassifierSlot,
    sink: Option<Arc<dyn PersistenceSink>>,
    observer: Arc<dyn PipelineObserver>,
    settings: ControllerSettings,
    inspector: Inspector,
    shared: Mutex<Shared>,
    changed: Condvar,
}

impl CaptureController {
    pub fn new(
        camera: Arc<dyn Camera>,
        classifier: ClassifierSlot,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            camera,
            classifier,
            sink: None,
            observer: Arc::new(LogObserver),
            inspector: Inspector::new(settings.inspection),
            shared: Mutex::new(Shared {
                machine: SessionMachine::new(settings.max_captures),
                session: None,
                cycle: 0,
                stopped: false,
                decisions: 0,
                last_verdict: None,
            }),
            changed: Condvar::new(),
            settings,
        }
    }

    /// Archive every accepted frame through `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.lock().machine.state()
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Number of completed decisions.
    pub fn decisions(&self) -> u64 {
        self.lock().decisions
    }

    pub fn last_verdict(&self) -> Option<Verdict> {
        self.lock().last_verdict.clone()
    }

    /// Start one capture cycle.
    ///
    /// Opens and configures the camera outside the lock, then registers the
    /// frame callback. Permission, device and configuration failures return
    /// the machine to `Idle` and are returned to the caller. A device lost
    /// after streaming began is reported to the observer instead.
    pub fn run_cycle(self: &Arc<Self>) -> Result<CycleOutcome> {
        if !self.classifier.is_loaded() {
            log::info!("classifier not loaded; deferring capture cycle");
            return Ok(CycleOutcome::Deferred);
        }
        self.classifier
            .with_classifier(|classifier| self.inspector.check_backend(classifier))?;

        {
            let mut shared = self.lock();
            if shared.stopped {
                return Ok(CycleOutcome::Halted);
            }
            match shared.machine.state() {
                SessionState::Idle | SessionState::Resetting => {
                    shared.machine.request_open()?;
                    shared.cycle += 1;
                }
                SessionState::Terminated => return Ok(CycleOutcome::Halted),
                state => {
                    log::debug!("previous cycle still {}; skipping tick", state);
                    return Ok(CycleOutcome::Busy);
                }
            }
        }
        self.changed.notify_all();
        self.observer.on_cycle_start();

        let mut session = match self.open_session() {
            Ok(session) => session,
            Err(err) => {
                self.abort_opening();
                return Err(err);
            }
        };

        let mut shared = self.lock();
        if shared.stopped || shared.machine.state() != SessionState::Opening {
            drop(shared);
            session.close();
            self.observer.on_cycle_stop();
            return Ok(CycleOutcome::Halted);
        }
        shared.machine.opened()?;
        let cycle = shared.cycle;
        if let Err(err) = session.start(self.frame_callback(), self.failure_callback(cycle)) {
            let _ = shared.machine.abort();
            drop(shared);
            session.close();
            self.changed.notify_all();
            self.observer.on_cycle_stop();
            return Err(err);
        }
        shared.session = Some(session);
        drop(shared);
        self.changed.notify_all();

        log::info!(
            "{} capture session on {} streaming ({} frame batch)",
            self.camera.name(),
            self.settings.device_id,
            self.settings.max_captures
        );
        Ok(CycleOutcome::Started)
    }

    /// Cancel: no new cycles, close any open session, drop a partial batch.
    ///
    /// An inspection already running finishes; its result is still recorded.
    pub fn stop(&self) {
        let session = {
            let mut shared = self.lock();
            shared.stopped = true;
            if shared.machine.state() != SessionState::Deciding {
                let _ = shared.machine.abort();
            }
            shared.session.take()
        };
        if let Some(mut session) = session {
            session.close();
            self.observer.on_cycle_stop();
        }
        self.changed.notify_all();
        log::info!("capture controller stopped");
    }

    /// Clear a detection (or a stop) so that cycles may run again.
    ///
    /// Does not resume sampling by itself: a `Scheduler` ends once the
    /// controller halts, so the caller spawns a new one after restarting.
    pub fn restart(&self) -> Result<()> {
        let was_terminated = {
            let mut shared = self.lock();
            let was_terminated = shared.machine.state() == SessionState::Terminated;
            shared.machine.restart()?;
            shared.stopped = false;
            was_terminated
        };
        self.changed.notify_all();
        if was_terminated {
            self.observer.on_detection_state_changed(false);
        }
        log::info!("capture controller restarted");
        Ok(())
    }

    /// Forward a cycle error raised outside the controller to the observer.
    pub fn report_error(&self, error: &GuardError) {
        self.observer.on_error(error);
    }

    /// Block until at least `count` decisions completed or `timeout` passed.
    pub fn wait_for_decisions(&self, count: u64, timeout: Duration) -> bool {
        self.wait_until(timeout, |shared| shared.decisions >= count)
    }

    /// Block until the machine is in `state` or `timeout` passed.
    pub fn wait_for_state(&self, state: SessionState, timeout: Duration) -> bool {
        self.wait_until(timeout, |shared| shared.machine.state() == state)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&Shared) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut shared = self.lock();
        loop {
            if done(&shared) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            shared = match self.changed.wait_timeout(shared, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    // ------------------------------------------------------------------------
    // Cycle internals
    // ------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_session(&self) -> Result<Box<dyn CameraSession>> {
        let mut session = self.camera.open(&self.settings.device_id)?;
        if let Err(err) = session.configure(&self.settings.output_target()) {
            session.close();
            return Err(err);
        }
        Ok(session)
    }

    fn abort_opening(&self) {
        {
            let mut shared = self.lock();
            if shared.machine.state() == SessionState::Opening {
                let _ = shared.machine.abort();
            }
        }
        self.changed.notify_all();
        self.observer.on_cycle_stop();
    }

    fn frame_callback(self: &Arc<Self>) -> FrameCallback {
        let controller: Weak<Self> = Arc::downgrade(self);
        Box::new(move |frame: RawFrame<'_>| {
            if let Some(controller) = controller.upgrade() {
                controller.on_frame(frame);
            }
        })
    }

    fn failure_callback(self: &Arc<Self>, cycle: u64) -> FailureCallback {
        let controller: Weak<Self> = Arc::downgrade(self);
        Box::new(move |error: GuardError| {
            if let Some(controller) = controller.upgrade() {
                controller.on_delivery_failure(cycle, error);
            }
        })
    }

    /// Delivery ended on its own: drop the session and any partial batch.
    fn on_delivery_failure(&self, cycle: u64, error: GuardError) {
        let mut session = {
            let mut shared = self.lock();
            if shared.cycle != cycle {
                log::debug!("ignoring failure from superseded cycle {}: {}", cycle, error);
                return;
            }
            // Already closing: stop() or a full batch took the session.
            let Some(session) = shared.session.take() else {
                log::debug!("ignoring failure after session release: {}", error);
                return;
            };
            let _ = shared.machine.abort();
            session
        };

        session.close();
        self.changed.notify_all();
        log::error!("capture session lost: {}", error);
        self.observer.on_cycle_stop();
        self.observer.on_error(&error);
    }

    fn on_frame(&self, frame: RawFrame<'_>) {
        let image = decode_yuv420(&frame);
        let encoded = self.encode_for_archive(&image);

        let ready = {
            let mut shared = self.lock();
            match shared.machine.push_frame(image) {
                PushOutcome::Accepted(len) => {
                    log::debug!("frame {}/{} accepted", len, self.settings.max_captures);
                    None
                }
                PushOutcome::BatchReady => {
                    let session = shared.session.take();
                    match shared.machine.take_batch() {
                        Ok(batch) => Some((session, batch)),
                        Err(err) => {
                            log::error!("batch unavailable after fill: {}", err);
                            None
                        }
                    }
                }
                PushOutcome::Rejected => return,
            }
        };

        if let Some(bytes) = encoded {
            self.archive(&bytes);
        }
        if let Some((session, batch)) = ready {
            self.changed.notify_all();
            self.decide(session, batch);
        }
    }

    fn encode_for_archive(&self, image: &ColorImage) -> Option<Vec<u8>> {
        if self.sink.is_none() {
            return None;
        }
        match encode_jpeg(image, self.settings.jpeg_quality) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log::warn!("frame not archived: {}", err);
                None
            }
        }
    }

    fn archive(&self, bytes: &[u8]) {
        let Some(sink) = self.sink.as_ref() else {
            return;
        };
        match sink.save(bytes, &suggested_name(bytes), JPEG_MIME) {
            Ok(uri) => log::debug!("frame archived at {}", uri),
            Err(err) => log::warn!("frame not archived: {}", err),
        }
    }

    /// Close the session, inspect the batch, and settle the machine.
    fn decide(&self, session: Option<Box<dyn CameraSession>>, batch: Batch) {
        if let Some(mut session) = session {
            session.close();
        }
        self.observer.on_cycle_stop();

        let result = self
            .classifier
            .with_classifier(|classifier| self.inspector.inspect(&batch, classifier));
        drop(batch);

        let detected = matches!(&result, Ok(verdict) if verdict.detected);
        {
            let mut shared = self.lock();
            match shared.machine.conclude(detected) {
                Ok(state) => log::info!("decision reached: {}", state),
                Err(err) => log::error!("cannot conclude cycle: {}", err),
            }
            if shared.stopped && !detected {
                let _ = shared.machine.abort();
            }
            shared.decisions += 1;
            shared.last_verdict = result.as_ref().ok().cloned();
        }
        self.changed.notify_all();

        match result {
            Ok(verdict) if verdict.detected => {
                log::warn!(
                    "camera detected in frame {:?} (p={:.3})",
                    verdict.frame_index,
                    verdict.best_camera_prob.unwrap_or_default()
                );
                self.observer.on_detection_state_changed(true);
            }
            Ok(_) => {}
            Err(err) => {
                log::error!("inspection failed: {}", err);
                self.observer.on_error(&err);
            }
        }
    }
}
