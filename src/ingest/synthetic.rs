//! Synthetic camera for `stub://` device ids.
//!
//! Delivers constant (optionally checkered) 4:2:0 frames from a worker
//! thread at a fixed interval. Special device ids inject the failures a real
//! device can produce:
//! - `stub://denied`: permission refused on open
//! - `stub://unplugged`: device fault on open
//! - `stub://misconfigured`: output configuration rejected
//! - `stub://disconnecting`: delivers one frame, then the device is lost
//!
//! Like real hardware it is a singleton: a second open while a session is
//! live fails with a device error.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::normalize::frame_from_packed;
use super::{Camera, CameraSession, FailureCallback, FrameCallback, OutputTarget};
use crate::error::{GuardError, Result};
use crate::frame::{ChromaLayout, Yuv420Buffer};

/// Frames `stub://disconnecting` delivers before the device goes away.
pub const DISCONNECT_AFTER_FRAMES: u64 = 1;

/// Configuration for a synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Delay before each delivered frame.
    pub frame_interval: Duration,
    /// Chroma arrangement of delivered frames.
    pub layout: ChromaLayout,
    /// Extra bytes at the end of every plane row.
    pub row_padding: usize,
    pub luma: u8,
    pub chroma_u: u8,
    pub chroma_v: u8,
    /// When set, luma alternates between `luma` and `255 - luma` in square
    /// cells of this size.
    pub checker_cell: Option<u32>,
    /// Every n-th delivery is a truncated buffer that fails to decode and is
    /// dropped by the camera.
    pub corrupt_every: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            layout: ChromaLayout::Planar,
            row_padding: 0,
            luma: 128,
            chroma_u: 128,
            chroma_v: 128,
            checker_cell: None,
            corrupt_every: None,
        }
    }
}

/// Counters shared between the camera and its sessions.
#[derive(Debug, Default)]
pub struct SyntheticStats {
    sessions_opened: AtomicU64,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
    open_sessions: AtomicUsize,
}

impl SyntheticStats {
    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::SeqCst)
    }

    /// Deliveries that failed to decode and never reached the callback.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

pub struct SyntheticCamera {
    config: SyntheticConfig,
    stats: Arc<SyntheticStats>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            stats: Arc::new(SyntheticStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SyntheticStats> {
        self.stats.clone()
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

impl Camera for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, device_id: &str) -> Result<Box<dyn CameraSession>> {
        if !device_id.starts_with("stub://") {
            return Err(GuardError::Device(format!(
                "synthetic camera only serves stub:// ids, got {}",
                device_id
            )));
        }
        match device_id {
            "stub://denied" => {
                return Err(GuardError::PermissionDenied(device_id.to_string()));
            }
            "stub://unplugged" => {
                return Err(GuardError::Device(format!("{} is not connected", device_id)));
            }
            _ => {}
        }

        let reserved = self
            .stats
            .open_sessions
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst);
        if reserved.is_err() {
            return Err(GuardError::Device(format!("{} is already in use", device_id)));
        }
        self.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        log::info!("SyntheticCamera: opened {}", device_id);

        Ok(Box::new(SyntheticSession {
            device: device_id.to_string(),
            config: self.config.clone(),
            reject_config: device_id == "stub://misconfigured",
            disconnects: device_id == "stub://disconnecting",
            target: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            stats: self.stats.clone(),
            closed: false,
        }))
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

struct SyntheticSession {
    device: String,
    config: SyntheticConfig,
    reject_config: bool,
    disconnects: bool,
    target: Option<OutputTarget>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<SyntheticStats>,
    closed: bool,
}

impl CameraSession for SyntheticSession {
    fn configure(&mut self, target: &OutputTarget) -> Result<()> {
        if self.reject_config {
            return Err(GuardError::Configuration(format!(
                "{} rejected {}x{} output",
                self.device, target.width, target.height
            )));
        }
        if target.width == 0 || target.height == 0 {
            return Err(GuardError::Configuration(format!(
                "invalid output size {}x{}",
                target.width, target.height
            )));
        }
        self.target = Some(target.clone());
        Ok(())
    }

    fn start(&mut self, mut on_frame: FrameCallback, on_failure: FailureCallback) -> Result<()> {
        if self.closed {
            return Err(GuardError::Device(format!("{} is closed", self.device)));
        }
        if self.worker.is_some() {
            return Err(GuardError::Configuration(format!(
                "{} is already streaming",
                self.device
            )));
        }
        let target = self.target.clone().ok_or_else(|| {
            GuardError::Configuration(format!("{} started before configure", self.device))
        })?;

        let buffer = render_scene(&self.config, &target);
        buffer.frame().map_err(|err| {
            GuardError::Configuration(format!(
                "{} cannot render {}x{}: {}",
                self.device, target.width, target.height, err
            ))
        })?;
        let interval = self.config.frame_interval;
        let corrupt_every = self.config.corrupt_every.filter(|n| *n > 0);
        let disconnect_after = self.disconnects.then_some(DISCONNECT_AFTER_FRAMES);
        let device = self.device.clone();
        let stop = self.stop.clone();
        let stats = self.stats.clone();

        let handle = thread::Builder::new()
            .name("camguard-synthetic".to_string())
            .spawn(move || {
                let mut deliveries = 0u64;
                loop {
                    thread::sleep(interval);
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    if disconnect_after.is_some_and(|limit| deliveries >= limit) {
                        log::error!("SyntheticCamera: {} disconnected", device);
                        on_failure(GuardError::Device(format!("{} disconnected", device)));
                        return;
                    }
                    deliveries += 1;

                    let frame = if corrupt_every.is_some_and(|n| deliveries % n == 0) {
                        frame_from_packed(
                            &[],
                            target.width,
                            target.height,
                            target.width as usize,
                            buffer.layout(),
                        )
                    } else {
                        buffer.frame()
                    };
                    match frame {
                        Ok(frame) => {
                            stats.frames_delivered.fetch_add(1, Ordering::SeqCst);
                            on_frame(frame);
                        }
                        Err(err) => {
                            stats.frames_dropped.fetch_add(1, Ordering::SeqCst);
                            log::warn!("SyntheticCamera: dropping frame: {}", err);
                        }
                    }
                }
            })
            .map_err(|err| GuardError::Device(format!("spawn capture thread: {}", err)))?;
        self.worker = Some(handle);
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            // Closing from inside the callback: the worker exits on its own
            // once the callback returns.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        self.stats.open_sessions.fetch_sub(1, Ordering::SeqCst);
        log::info!("SyntheticCamera: closed {}", self.device);
    }
}

impl Drop for SyntheticSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn render_scene(config: &SyntheticConfig, target: &OutputTarget) -> Yuv420Buffer {
    let mut buffer = Yuv420Buffer::filled(
        target.width,
        target.height,
        config.layout,
        config.row_padding,
        config.luma,
        config.chroma_u,
        config.chroma_v,
    );
    if let Some(cell) = config.checker_cell.filter(|c| *c > 0) {
        let inverse = 255 - config.luma;
        for y in 0..target.height {
            for x in 0..target.width {
                if (x / cell + y / cell) % 2 == 1 {
                    buffer.set_luma(x, y, inverse);
                }
            }
        }
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;
    use std::sync::mpsc;

    fn ignore_failure() -> FailureCallback {
        Box::new(|_: GuardError| {})
    }

    fn fast_camera() -> SyntheticCamera {
        SyntheticCamera::new(SyntheticConfig {
            frame_interval: Duration::from_millis(1),
            ..SyntheticConfig::default()
        })
    }

    #[test]
    fn delivers_frames_until_closed() -> Result<()> {
        let camera = fast_camera();
        let mut session = camera.open("stub://front")?;
        session.configure(&OutputTarget {
            width: 8,
            height: 6,
            ..OutputTarget::default()
        })?;

        let (tx, rx) = mpsc::channel();
        session.start(
            Box::new(move |frame: RawFrame<'_>| {
                let _ = tx.send((frame.width(), frame.height()));
            }),
            ignore_failure(),
        )?;

        let dims = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("first synthetic frame");
        assert_eq!(dims, (8, 6));

        session.close();
        let delivered = camera.stats().frames_delivered();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(camera.stats().frames_delivered(), delivered);
        assert_eq!(camera.stats().open_sessions(), 0);
        Ok(())
    }

    #[test]
    fn failure_ids_map_to_error_taxonomy() {
        let camera = fast_camera();
        assert!(matches!(
            camera.open("stub://denied").err(),
            Some(GuardError::PermissionDenied(_))
        ));
        assert!(matches!(
            camera.open("stub://unplugged").err(),
            Some(GuardError::Device(_))
        ));
        assert!(matches!(
            camera.open("/dev/video0").err(),
            Some(GuardError::Device(_))
        ));

        let mut session = camera.open("stub://misconfigured").expect("open");
        assert!(matches!(
            session.configure(&OutputTarget::default()),
            Err(GuardError::Configuration(_))
        ));
    }

    #[test]
    fn only_one_session_at_a_time() -> Result<()> {
        let camera = fast_camera();
        let mut first = camera.open("stub://front")?;
        assert!(matches!(
            camera.open("stub://front").err(),
            Some(GuardError::Device(_))
        ));
        first.close();
        first.close();
        let _second = camera.open("stub://front")?;
        assert_eq!(camera.stats().sessions_opened(), 2);
        Ok(())
    }

    #[test]
    fn start_requires_configure() -> Result<()> {
        let camera = fast_camera();
        let mut session = camera.open("stub://front")?;
        let err = session
            .start(Box::new(|_: RawFrame<'_>| {}), ignore_failure())
            .unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
        Ok(())
    }

    #[test]
    fn disconnecting_device_reports_failure_once() -> Result<()> {
        let camera = fast_camera();
        let mut session = camera.open("stub://disconnecting")?;
        session.configure(&OutputTarget {
            width: 4,
            height: 4,
            ..OutputTarget::default()
        })?;

        let (tx, rx) = mpsc::channel();
        session.start(
            Box::new(|_: RawFrame<'_>| {}),
            Box::new(move |err: GuardError| {
                let _ = tx.send(err);
            }),
        )?;

        let err = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("disconnect is reported");
        assert!(matches!(err, GuardError::Device(_)));
        assert!(err.is_retryable());
        assert_eq!(camera.stats().frames_delivered(), DISCONNECT_AFTER_FRAMES);
        session.close();
        assert_eq!(camera.stats().open_sessions(), 0);
        Ok(())
    }

    #[test]
    fn corrupt_frames_are_dropped_and_delivery_continues() -> Result<()> {
        let camera = SyntheticCamera::new(SyntheticConfig {
            frame_interval: Duration::from_millis(1),
            corrupt_every: Some(2),
            ..SyntheticConfig::default()
        });
        let mut session = camera.open("stub://front")?;
        session.configure(&OutputTarget {
            width: 4,
            height: 4,
            ..OutputTarget::default()
        })?;

        let (tx, rx) = mpsc::channel();
        session.start(
            Box::new(move |_: RawFrame<'_>| {
                let _ = tx.send(());
            }),
            Box::new(|err: GuardError| panic!("unexpected failure: {}", err)),
        )?;

        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(5))
                .expect("delivery continues past dropped frames");
        }
        session.close();
        assert!(camera.stats().frames_dropped() >= 2);
        Ok(())
    }
}
