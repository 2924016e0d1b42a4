//! V4L2 camera.
//!
//! This module provides `V4l2Camera` for local device nodes (e.g. /dev/video0).
//!
//! The V4L2 camera is responsible for:
//! - Opening the device node and mapping access errors onto the error taxonomy
//! - Negotiating a 4:2:0 output (`YU12` planar or `NV12` semi-planar)
//! - Streaming from a dedicated capture thread into the frame callback
//!
//! The V4L2 camera MUST NOT:
//! - Store captured frames to disk
//! - Retain driver buffers beyond the callback

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::FourCC;

use super::normalize::frame_from_packed;
use super::{Camera, CameraSession, FailureCallback, FrameCallback, OutputTarget};
use crate::error::{GuardError, Result};
use crate::frame::ChromaLayout;

const FOURCC_I420: &[u8; 4] = b"YU12";
const FOURCC_NV12: &[u8; 4] = b"NV12";

/// V4L2 device provider. Device ids are node paths.
#[derive(Debug, Default)]
pub struct V4l2Camera;

impl V4l2Camera {
    pub fn new() -> Self {
        Self
    }
}

impl Camera for V4l2Camera {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn open(&self, device_id: &str) -> Result<Box<dyn CameraSession>> {
        let device = v4l::Device::with_path(device_id).map_err(|err| open_error(device_id, err))?;
        log::info!("V4l2Camera: opened {}", device_id);
        Ok(Box::new(V4l2Session {
            path: device_id.to_string(),
            device: Some(device),
            negotiated: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
            closed: false,
        }))
    }
}

fn open_error(path: &str, err: io::Error) -> GuardError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => GuardError::PermissionDenied(format!("{}: {}", path, err)),
        _ => GuardError::Device(format!("open {}: {}", path, err)),
    }
}

#[derive(Clone, Copy, Debug)]
struct Negotiated {
    width: u32,
    height: u32,
    stride: usize,
    layout: ChromaLayout,
    buffers: u32,
}

struct V4l2Session {
    path: String,
    device: Option<v4l::Device>,
    negotiated: Option<Negotiated>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    closed: bool,
}

impl CameraSession for V4l2Session {
    fn configure(&mut self, target: &OutputTarget) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| GuardError::Configuration(format!("{} is already streaming", self.path)))?;

        let mut format = device
            .format()
            .map_err(|err| GuardError::Configuration(format!("read format: {}", err)))?;
        format.width = target.width;
        format.height = target.height;
        format.fourcc = match target.layout {
            ChromaLayout::Planar => FourCC::new(FOURCC_I420),
            ChromaLayout::SemiPlanar => FourCC::new(FOURCC_NV12),
        };
        let format = device
            .set_format(&format)
            .map_err(|err| GuardError::Configuration(format!("set format: {}", err)))?;

        let layout = if format.fourcc == FourCC::new(FOURCC_I420) {
            ChromaLayout::Planar
        } else if format.fourcc == FourCC::new(FOURCC_NV12) {
            ChromaLayout::SemiPlanar
        } else {
            return Err(GuardError::Configuration(format!(
                "{} offers {} instead of a 4:2:0 format",
                self.path, format.fourcc
            )));
        };

        let stride = if format.stride == 0 {
            format.width as usize
        } else {
            format.stride as usize
        };
        self.negotiated = Some(Negotiated {
            width: format.width,
            height: format.height,
            stride,
            layout,
            buffers: target.max_images.clamp(2, 32) as u32,
        });
        log::info!(
            "V4l2Camera: {} negotiated {}x{} {} (stride {})",
            self.path,
            format.width,
            format.height,
            format.fourcc,
            stride
        );
        Ok(())
    }

    fn start(&mut self, mut on_frame: FrameCallback, on_failure: FailureCallback) -> Result<()> {
        let negotiated = self.negotiated.ok_or_else(|| {
            GuardError::Configuration(format!("{} started before configure", self.path))
        })?;
        let device = self
            .device
            .take()
            .ok_or_else(|| GuardError::Device(format!("{} is closed or streaming", self.path)))?;
        let stop = self.stop.clone();
        let path = self.path.clone();

        let handle = thread::Builder::new()
            .name("camguard-v4l2".to_string())
            .spawn(move || {
                let mut stream =
                    match MmapStream::with_buffers(&device, Type::VideoCapture, negotiated.buffers) {
                        Ok(stream) => stream,
                        Err(err) => {
                            log::error!("V4l2Camera: create buffer stream on {}: {}", path, err);
                            if !stop.load(Ordering::SeqCst) {
                                on_failure(GuardError::Device(format!(
                                    "buffer stream on {}: {}",
                                    path, err
                                )));
                            }
                            return;
                        }
                    };
                while !stop.load(Ordering::SeqCst) {
                    let (buf, _meta) = match stream.next() {
                        Ok(next) => next,
                        Err(err) => {
                            log::error!("V4l2Camera: capture on {} failed: {}", path, err);
                            if !stop.load(Ordering::SeqCst) {
                                on_failure(GuardError::Device(format!(
                                    "capture on {}: {}",
                                    path, err
                                )));
                            }
                            return;
                        }
                    };
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    match frame_from_packed(
                        buf,
                        negotiated.width,
                        negotiated.height,
                        negotiated.stride,
                        negotiated.layout,
                    ) {
                        Ok(frame) => on_frame(frame),
                        Err(err) => log::warn!("V4l2Camera: dropping frame: {}", err),
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
        self.device = None;
        if let Some(handle) = self.worker.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        log::info!("V4l2Camera: closed {}", self.path);
    }
}

impl Drop for V4l2Session {
    fn drop(&mut self) {
        self.close();
    }
}
