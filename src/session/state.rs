use std::fmt;

use crate::color::ColorImage;
use crate::error::{GuardError, Result};
use crate::frame::Batch;

/// Lifecycle of one capture/inspection cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No hardware held.
    Idle,
    /// Device open requested, not yet streaming.
    Opening,
    /// Repeating capture registered, no frame accepted yet.
    Streaming,
    /// At least one frame in the batch.
    Accumulating,
    /// Batch full; session closing or inspection running.
    Deciding,
    /// Positive detection. Nothing reopens until `restart`.
    Terminated,
    /// No detection. The next tick reopens.
    Resetting,
}

impl SessionState {
    /// True while a camera session may be open.
    pub fn holds_camera(self) -> bool {
        matches!(
            self,
            SessionState::Opening | SessionState::Streaming | SessionState::Accumulating
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Streaming => "streaming",
            SessionState::Accumulating => "accumulating",
            SessionState::Deciding => "deciding",
            SessionState::Terminated => "terminated",
            SessionState::Resetting => "resetting",
        };
        f.write_str(name)
    }
}

/// What happened to a frame offered to the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended; carries the new batch length.
    Accepted(usize),
    /// Appended and the batch is now full; the machine is `Deciding`.
    BatchReady,
    /// Not accepting frames in the current state; the image was dropped.
    Rejected,
}

/// Pure session state machine owning the batch.
///
/// Every transition is an explicit method; calling one from the wrong state
/// yields `GuardError::InvalidTransition` and leaves the machine unchanged.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    batch: Batch,
}

impl SessionMachine {
    pub fn new(max_captures: usize) -> Self {
        Self {
            state: SessionState::Idle,
            batch: Batch::with_capacity(max_captures),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    pub fn max_captures(&self) -> usize {
        self.batch.capacity()
    }

    /// `Idle | Resetting -> Opening`.
    pub fn request_open(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle | SessionState::Resetting => {
                self.batch.clear();
                self.state = SessionState::Opening;
                Ok(())
            }
            from => Err(invalid(from, "request_open")),
        }
    }

    /// `Opening -> Streaming`.
    pub fn opened(&mut self) -> Result<()> {
        match self.state {
            SessionState::Opening => {
                self.state = SessionState::Streaming;
                Ok(())
            }
            from => Err(invalid(from, "opened")),
        }
    }

    /// Offer a decoded frame.
    ///
    /// Appends in `Streaming`/`Accumulating`. The append that fills the batch
    /// moves the machine to `Deciding`, so later frames are rejected.
    pub fn push_frame(&mut self, image: ColorImage) -> PushOutcome {
        if !matches!(
            self.state,
            SessionState::Streaming | SessionState::Accumulating
        ) {
            return PushOutcome::Rejected;
        }
        match self.batch.push(image) {
            Ok(len) if len == self.batch.capacity() => {
                self.state = SessionState::Deciding;
                PushOutcome::BatchReady
            }
            Ok(len) => {
                self.state = SessionState::Accumulating;
                PushOutcome::Accepted(len)
            }
            Err(_) => {
                self.state = SessionState::Deciding;
                PushOutcome::Rejected
            }
        }
    }

    /// Hand the full batch to inspection. Only valid in `Deciding`.
    pub fn take_batch(&mut self) -> Result<Batch> {
        match self.state {
            SessionState::Deciding => Ok(self.batch.take()),
            from => Err(invalid(from, "take_batch")),
        }
    }

    /// `Deciding -> Terminated` on detection, `Deciding -> Resetting` otherwise.
    pub fn conclude(&mut self, detected: bool) -> Result<SessionState> {
        match self.state {
            SessionState::Deciding => {
                self.batch.clear();
                self.state = if detected {
                    SessionState::Terminated
                } else {
                    SessionState::Resetting
                };
                Ok(self.state)
            }
            from => Err(invalid(from, "conclude")),
        }
    }

    /// Abandon the current cycle and drop any partial batch.
    ///
    /// Valid while the camera may be held and in `Resetting`; a no-op in
    /// `Idle`.
    pub fn abort(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => Ok(()),
            SessionState::Opening
            | SessionState::Streaming
            | SessionState::Accumulating
            | SessionState::Resetting => {
                self.batch.clear();
                self.state = SessionState::Idle;
                Ok(())
            }
            from => Err(invalid(from, "abort")),
        }
    }

    /// Leave `Terminated` (or a resting state) for `Idle`.
    pub fn restart(&mut self) -> Result<()> {
        match self.state {
            SessionState::Terminated | SessionState::Resetting | SessionState::Idle => {
                self.batch.clear();
                self.state = SessionState::Idle;
                Ok(())
            }
            from => Err(invalid(from, "restart")),
        }
    }
}

fn invalid(from: SessionState, action: &'static str) -> GuardError {
    GuardError::InvalidTransition { from, action }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::PixelLayout;

    fn image() -> ColorImage {
        ColorImage::new(1, 1, PixelLayout::Rgba8, vec![1, 2, 3, 255]).expect("1x1 image")
    }

    fn streaming(max: usize) -> SessionMachine {
        let mut machine = SessionMachine::new(max);
        machine.request_open().expect("open from idle");
        machine.opened().expect("opened");
        machine
    }

    #[test]
    fn full_cycle_without_detection() -> Result<()> {
        let mut machine = streaming(3);
        assert_eq!(machine.push_frame(image()), PushOutcome::Accepted(1));
        assert_eq!(machine.state(), SessionState::Accumulating);
        assert_eq!(machine.push_frame(image()), PushOutcome::Accepted(2));
        assert_eq!(machine.push_frame(image()), PushOutcome::BatchReady);
        assert_eq!(machine.state(), SessionState::Deciding);

        let batch = machine.take_batch()?;
        assert_eq!(batch.len(), 3);
        assert_eq!(machine.conclude(false)?, SessionState::Resetting);

        machine.request_open()?;
        assert_eq!(machine.state(), SessionState::Opening);
        Ok(())
    }

    #[test]
    fn batch_never_exceeds_capacity() {
        let mut machine = streaming(2);
        machine.push_frame(image());
        machine.push_frame(image());
        for _ in 0..5 {
            assert_eq!(machine.push_frame(image()), PushOutcome::Rejected);
        }
        assert_eq!(machine.batch_len(), 2);
        assert_eq!(machine.state(), SessionState::Deciding);
    }

    #[test]
    fn terminated_refuses_to_reopen_until_restart() -> Result<()> {
        let mut machine = streaming(1);
        assert_eq!(machine.push_frame(image()), PushOutcome::BatchReady);
        machine.take_batch()?;
        assert_eq!(machine.conclude(true)?, SessionState::Terminated);

        let err = machine.request_open().unwrap_err();
        assert!(matches!(
            err,
            GuardError::InvalidTransition {
                from: SessionState::Terminated,
                action: "request_open"
            }
        ));
        assert_eq!(machine.push_frame(image()), PushOutcome::Rejected);

        machine.restart()?;
        machine.request_open()?;
        Ok(())
    }

    #[test]
    fn wrong_state_transitions_leave_machine_unchanged() {
        let mut machine = SessionMachine::new(4);
        assert!(machine.opened().is_err());
        assert!(machine.take_batch().is_err());
        assert!(machine.conclude(true).is_err());
        assert_eq!(machine.push_frame(image()), PushOutcome::Rejected);
        assert_eq!(machine.state(), SessionState::Idle);

        let mut deciding = streaming(1);
        deciding.push_frame(image());
        assert!(deciding.abort().is_err());
        assert!(deciding.restart().is_err());
        assert_eq!(deciding.state(), SessionState::Deciding);
    }

    #[test]
    fn abort_drops_partial_batch() -> Result<()> {
        let mut machine = streaming(5);
        machine.push_frame(image());
        machine.push_frame(image());
        machine.abort()?;
        assert_eq!(machine.state(), SessionState::Idle);
        assert_eq!(machine.batch_len(), 0);
        machine.abort()?;
        Ok(())
    }
}
