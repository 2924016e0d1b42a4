use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camguard::ingest::{SyntheticCamera, SyntheticConfig};
use camguard::store::FilesystemGallery;
use camguard::{
    CaptureController, ClassifierSlot, ControllerSettings, CycleOutcome, GuardError,
    PipelineObserver, Scheduler, SessionState, StubClassifier,
};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|event| event.starts_with("error:"))
            .collect()
    }

    /// Poll until at least `count` errors were reported.
    fn wait_for_errors(&self, count: usize) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if self.errors().len() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_cycle_start(&self) {
        self.push("start".to_string());
    }

    fn on_cycle_stop(&self) {
        self.push("stop".to_string());
    }

    fn on_detection_state_changed(&self, detected: bool) {
        self.push(format!("detected:{}", detected));
    }

    fn on_error(&self, error: &GuardError) {
        self.push(format!("error:{}", error));
    }
}

struct Harness {
    camera: Arc<SyntheticCamera>,
    calls: Arc<AtomicUsize>,
    observer: Arc<RecordingObserver>,
    controller: Arc<CaptureController>,
}

fn fast_frames() -> SyntheticConfig {
    SyntheticConfig {
        frame_interval: Duration::from_millis(1),
        ..SyntheticConfig::default()
    }
}

fn harness(device: &str, max_captures: usize, script: Vec<f32>) -> Harness {
    harness_with(device, max_captures, script, fast_frames(), None)
}

fn harness_with(
    device: &str,
    max_captures: usize,
    script: Vec<f32>,
    camera: SyntheticConfig,
    gallery: Option<FilesystemGallery>,
) -> Harness {
    let camera = Arc::new(SyntheticCamera::new(camera));
    let classifier = StubClassifier::new(script);
    let calls = classifier.calls();
    let observer = Arc::new(RecordingObserver::default());
    let settings = ControllerSettings {
        device_id: device.to_string(),
        width: 16,
        height: 12,
        max_captures,
        ..ControllerSettings::default()
    };
    let mut controller = CaptureController::new(
        camera.clone(),
        ClassifierSlot::with_backend(classifier),
        settings,
    )
    .with_observer(observer.clone());
    if let Some(gallery) = gallery {
        controller = controller.with_sink(Arc::new(gallery));
    }
    Harness {
        camera,
        calls,
        observer,
        controller: Arc::new(controller),
    }
}

#[test]
fn detection_terminates_until_restart() {
    let h = harness("stub://front", 3, vec![0.9]);

    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Started);
    assert!(h.controller.wait_for_decisions(1, WAIT));

    assert_eq!(h.controller.state(), SessionState::Terminated);
    let verdict = h.controller.last_verdict().expect("verdict");
    assert!(verdict.detected);
    assert_eq!(verdict.frame_index, Some(0));
    assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.camera.stats().open_sessions(), 0);

    // No new session while terminated.
    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Halted);
    assert_eq!(h.camera.stats().sessions_opened(), 1);

    h.controller.restart().unwrap();
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Started);
    assert_eq!(h.camera.stats().sessions_opened(), 2);
    h.controller.stop();

    let events = h.observer.events();
    assert!(events.contains(&"detected:true".to_string()));
    assert!(events.contains(&"detected:false".to_string()));
}

#[test]
fn low_probability_batch_resets_and_reopens() {
    let h = harness("stub://front", 10, vec![0.1]);

    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Started);
    assert!(h.controller.wait_for_decisions(1, WAIT));

    assert_eq!(h.controller.state(), SessionState::Resetting);
    let verdict = h.controller.last_verdict().expect("verdict");
    assert!(!verdict.detected);
    assert_eq!(verdict.invocations, 10);
    assert_eq!(h.calls.load(Ordering::SeqCst), 10);

    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Started);
    assert!(h.controller.wait_for_decisions(2, WAIT));
    assert_eq!(h.calls.load(Ordering::SeqCst), 20);
    assert_eq!(h.camera.stats().sessions_opened(), 2);
}

#[test]
fn batch_is_bounded_by_max_captures() {
    let h = harness("stub://front", 4, vec![0.2]);

    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Started);
    assert!(h.controller.wait_for_decisions(1, WAIT));
    thread::sleep(Duration::from_millis(20));

    assert_eq!(h.calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.controller.last_verdict().unwrap().invocations, 4);
}

#[test]
fn permission_denied_is_reported_and_leaves_idle() {
    let h = harness("stub://denied", 3, vec![0.9]);

    let err = h.controller.run_cycle().unwrap_err();
    assert!(matches!(err, GuardError::PermissionDenied(_)));
    assert!(!err.is_retryable());
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn configuration_failure_is_surfaced_and_releases_camera() {
    let h = harness("stub://misconfigured", 3, vec![0.9]);

    let err = h.controller.run_cycle().unwrap_err();
    assert!(matches!(err, GuardError::Configuration(_)));
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.camera.stats().sessions_opened(), 1);
    assert_eq!(h.camera.stats().open_sessions(), 0);
    assert_eq!(h.observer.events(), vec!["start", "stop"]);
}

#[test]
fn missing_classifier_defers_without_opening() {
    let camera = Arc::new(SyntheticCamera::default());
    let slot = ClassifierSlot::new();
    let controller = Arc::new(CaptureController::new(
        camera.clone(),
        slot.clone(),
        ControllerSettings::default(),
    ));

    assert_eq!(controller.run_cycle().unwrap(), CycleOutcome::Deferred);
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(camera.stats().sessions_opened(), 0);

    slot.install(Box::new(StubClassifier::constant(0.1)));
    assert_eq!(controller.run_cycle().unwrap(), CycleOutcome::Started);
    controller.stop();
}

#[test]
fn stop_closes_open_session_and_halts() {
    let h = harness_with(
        "stub://front",
        64,
        vec![0.9],
        SyntheticConfig {
            frame_interval: Duration::from_millis(20),
            ..SyntheticConfig::default()
        },
        None,
    );

    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Started);
    assert!(h
        .controller
        .wait_for_state(SessionState::Accumulating, WAIT));
    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Busy);

    h.controller.stop();
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.camera.stats().open_sessions(), 0);
    let delivered = h.camera.stats().frames_delivered();
    thread::sleep(Duration::from_millis(60));
    assert_eq!(h.camera.stats().frames_delivered(), delivered);

    assert_eq!(h.controller.decisions(), 0);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Halted);

    // Idempotent.
    h.controller.stop();
}

#[test]
fn accepted_frames_are_archived() {
    let dir = tempfile::tempdir().unwrap();
    let gallery = FilesystemGallery::new(dir.path().join("gallery")).unwrap();
    let h = harness_with(
        "stub://front",
        3,
        vec![0.1],
        fast_frames(),
        Some(gallery),
    );

    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Started);
    assert!(h.controller.wait_for_decisions(1, WAIT));

    let stored: Vec<_> = std::fs::read_dir(dir.path().join("gallery"))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(stored.len(), 3, "{:?}", stored);
    assert!(stored
        .iter()
        .all(|name| name.starts_with("IMG_") && name.ends_with(".jpg")));
}

#[test]
fn scheduler_stops_after_detection_and_rearms_after_restart() {
    let h = harness("stub://front", 2, vec![0.95]);
    let scheduler = Scheduler::spawn(
        h.controller.clone(),
        Duration::ZERO,
        Duration::from_millis(50),
    )
    .unwrap();

    assert!(h.controller.wait_for_decisions(1, WAIT));
    let deadline = Instant::now() + WAIT;
    while !scheduler.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(scheduler.is_finished());
    assert_eq!(h.controller.state(), SessionState::Terminated);
    assert_eq!(h.camera.stats().sessions_opened(), 1);
    drop(scheduler);

    // Dropping the scheduler stopped the controller; restart and re-arm.
    h.controller.restart().unwrap();
    let scheduler = Scheduler::spawn(
        h.controller.clone(),
        Duration::ZERO,
        Duration::from_millis(50),
    )
    .unwrap();
    assert!(h.controller.wait_for_decisions(2, WAIT));
    assert_eq!(h.camera.stats().sessions_opened(), 2);
    scheduler.cancel();
}

#[test]
fn scheduler_halts_on_permission_denied() {
    let h = harness("stub://denied", 2, vec![0.95]);
    let scheduler = Scheduler::spawn(
        h.controller.clone(),
        Duration::ZERO,
        Duration::from_millis(20),
    )
    .unwrap();

    let deadline = Instant::now() + WAIT;
    while !scheduler.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(scheduler.is_finished());
    let errors = h.observer.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("permission denied"));
    scheduler.cancel();
}

#[test]
fn lost_device_aborts_session_and_next_cycle_retries() {
    let h = harness("stub://disconnecting", 3, vec![0.9]);

    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Started);
    assert!(h.observer.wait_for_errors(1));
    assert!(h.controller.wait_for_state(SessionState::Idle, WAIT));

    let events = h.observer.events();
    assert_eq!(events.len(), 3, "{:?}", events);
    assert_eq!(events[0], "start");
    assert_eq!(events[1], "stop");
    assert!(events[2].contains("camera device error"), "{:?}", events);
    assert_eq!(h.camera.stats().open_sessions(), 0);
    assert_eq!(h.controller.decisions(), 0);
    assert_eq!(h.calls.load(Ordering::SeqCst), 0);

    // The partial batch is gone and the camera can be reopened.
    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Started);
    assert_eq!(h.camera.stats().sessions_opened(), 2);
    assert!(h.observer.wait_for_errors(2));
    h.controller.stop();
}

#[test]
fn scheduler_keeps_ticking_after_device_errors() {
    let h = harness("stub://unplugged", 3, vec![0.9]);
    let scheduler = Scheduler::spawn(
        h.controller.clone(),
        Duration::ZERO,
        Duration::from_millis(10),
    )
    .unwrap();

    assert!(h.observer.wait_for_errors(3));
    assert!(!scheduler.is_finished());
    assert!(h
        .observer
        .errors()
        .iter()
        .all(|event| event.contains("camera device error")));
    scheduler.cancel();
    assert_eq!(h.controller.state(), SessionState::Idle);
}

#[test]
fn scheduler_reopens_after_device_is_lost() {
    let h = harness("stub://disconnecting", 5, vec![0.9]);
    let scheduler = Scheduler::spawn(
        h.controller.clone(),
        Duration::ZERO,
        Duration::from_millis(10),
    )
    .unwrap();

    assert!(h.observer.wait_for_errors(2));
    assert!(!scheduler.is_finished());
    assert!(h.camera.stats().sessions_opened() >= 2);
    assert_eq!(h.controller.decisions(), 0);
    scheduler.cancel();
}

#[test]
fn undecodable_frames_are_dropped_without_ending_the_batch() {
    let h = harness_with(
        "stub://front",
        3,
        vec![0.1],
        SyntheticConfig {
            corrupt_every: Some(2),
            ..fast_frames()
        },
        None,
    );

    assert_eq!(h.controller.run_cycle().unwrap(), CycleOutcome::Started);
    assert!(h.controller.wait_for_decisions(1, WAIT));

    assert_eq!(h.controller.state(), SessionState::Resetting);
    assert_eq!(h.controller.last_verdict().unwrap().invocations, 3);
    assert!(h.camera.stats().frames_dropped() >= 2);
    assert!(h.observer.errors().is_empty());
}

#[test]
fn classifier_input_size_mismatch_fails_before_opening() {
    let camera = Arc::new(SyntheticCamera::new(fast_frames()));
    let controller = Arc::new(CaptureController::new(
        camera.clone(),
        ClassifierSlot::with_backend(StubClassifier::constant(0.1).with_input_size(64)),
        ControllerSettings::default(),
    ));

    let err = controller.run_cycle().unwrap_err();
    assert!(matches!(err, GuardError::Configuration(_)));
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(camera.stats().sessions_opened(), 0);
}
