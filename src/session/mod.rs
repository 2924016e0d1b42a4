//! Capture/inspection session lifecycle.
//!
//! - `state`: the pure state machine and its batch
//! - `controller`: binds the machine to a camera, the classifier and the
//!   archive sink
//! - `scheduler`: periodic, cancellable cycle driver
//! - `observer`: notifications for the playback/UI surface

mod controller;
mod observer;
mod scheduler;
mod state;

pub use controller::{CaptureController, ControllerSettings, CycleOutcome};
pub use observer::{LogObserver, PipelineObserver};
pub use scheduler::Scheduler;
pub use state::{PushOutcome, SessionMachine, SessionState};
