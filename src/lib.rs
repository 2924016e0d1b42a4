//! Camera Guard
//!
//! Frame acquisition and visual inspection pipeline that periodically samples
//! a camera and decides whether another camera is pointed at the device.
//!
//! # Architecture
//!
//! 1. **Decode**: 4:2:0 sensor frames (planar or semi-planar, any stride) become
//!    RGBA `ColorImage`s. Raw frames are never retained past decoding.
//! 2. **Accumulate**: a capture session fills a bounded `Batch`.
//! 3. **Decide**: the session is closed, then each image is scaled, normalized
//!    and classified; the first frame above the threshold wins.
//! 4. **React**: a detection terminates sampling until restarted; otherwise the
//!    scheduler opens a fresh session on its next tick.
//!
//! # Module Structure
//!
//! - `frame`: planes, raw frames, owned 4:2:0 buffers, the batch
//! - `color`: decoded images, scaling, tensor normalization
//! - `ingest`: camera capability, synthetic and V4L2 cameras, YUV decoding
//! - `detect`: classifier capability and backends
//! - `inspect`: batch inspection and the geometric pre-filter
//! - `session`: state machine, controller, scheduler, observer
//! - `store`: JPEG archival
//! - `config`: daemon configuration

pub mod color;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod inspect;
pub mod session;
pub mod store;

pub use color::{ColorImage, PixelLayout};
pub use config::GuardConfig;
pub use detect::{ClassificationResult, ClassifierBackend, ClassifierSlot, StubClassifier};
pub use error::{GuardError, Result};
pub use frame::{Batch, ChromaLayout, Plane, RawFrame, Yuv420Buffer};
pub use ingest::{decode_yuv420, Camera, CameraSession, OutputTarget, SyntheticCamera};
pub use inspect::{InspectionConfig, Inspector, Prefilter, Verdict};
pub use session::{
    CaptureController, ControllerSettings, CycleOutcome, PipelineObserver, Scheduler, SessionState,
};
pub use store::{FilesystemGallery, PersistenceSink};
