//! Camera capability and frame decoding.
//!
//! This module provides the seam between hardware and the pipeline:
//! - `Camera` / `CameraSession`: open a device, configure a 4:2:0 output,
//!   register a per-frame callback, close.
//! - Synthetic camera (`stub://` device ids) for tests and demos
//! - V4L2 devices (feature: ingest-v4l2)
//! - `normalize`: 4:2:0 → RGBA decoding
//!
//! Frames are delivered as `RawFrame`s borrowing the driver buffer. A camera
//! MUST NOT:
//! - Invoke the callback concurrently with itself
//! - Start a callback after `close` has returned
//! - End delivery silently: a stream that dies reports through `on_failure`
//! - Log frame content

pub mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use normalize::{decode_yuv420, frame_from_packed};
pub use synthetic::{SyntheticCamera, SyntheticConfig};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

use crate::error::{GuardError, Result};
use crate::frame::{ChromaLayout, RawFrame};

/// Per-frame callback. Runs on the camera's own delivery context.
pub type FrameCallback = Box<dyn FnMut(RawFrame<'_>) + Send>;

/// Called at most once, on the delivery context, when delivery ends for any
/// reason other than `close`.
pub type FailureCallback = Box<dyn FnOnce(GuardError) + Send>;

/// Output the pipeline asks the camera to produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputTarget {
    pub width: u32,
    pub height: u32,
    /// Preferred chroma arrangement. Cameras may deliver either; the decoder
    /// only relies on plane strides.
    pub layout: ChromaLayout,
    /// Number of driver buffers to keep in flight.
    pub max_images: usize,
}

impl Default for OutputTarget {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            layout: ChromaLayout::Planar,
            max_images: crate::frame::DEFAULT_MAX_CAPTURES,
        }
    }
}

/// Camera device provider.
pub trait Camera: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Open a device. Fails with `PermissionDenied` or `Device`.
    fn open(&self, device_id: &str) -> Result<Box<dyn CameraSession>>;
}

/// An open device handle.
pub trait CameraSession: Send {
    /// Negotiate the output. Fails with `Configuration` when rejected.
    fn configure(&mut self, target: &OutputTarget) -> Result<()>;

    /// Register `on_frame` and begin repeating capture.
    ///
    /// Must return without waiting for frames and must not invoke either
    /// callback before returning. A frame that cannot be decoded is dropped
    /// without ending delivery. If delivery stops on its own (stream setup
    /// failed, device lost) `on_failure` receives a `Device` error; it is
    /// never called once `close` has returned.
    fn start(&mut self, on_frame: FrameCallback, on_failure: FailureCallback) -> Result<()>;

    /// Stop delivery and release the device.
    ///
    /// Idempotent. May be called from inside the frame callback, in which
    /// case it must not wait for the delivery context to finish.
    fn close(&mut self);
}
