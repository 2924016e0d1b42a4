//! Error taxonomy for the acquisition and inspection pipeline.
//!
//! Errors fall into two scopes:
//! - per-frame (`Decode`, `Format`, `Persistence`): the frame is dropped or the
//!   archive write skipped, and the batch continues.
//! - per-session (`PermissionDenied`, `Device`, `Configuration`, `Inference`):
//!   the current cycle is aborted and the error is reported to the caller.

use thiserror::Error;

use crate::session::SessionState;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("camera device error: {0}")]
    Device(String),

    #[error("capture session configuration failed: {0}")]
    Configuration(String),

    #[error("frame decode error: {0}")]
    Decode(String),

    #[error("image format error: {0}")]
    Format(String),

    #[error("classifier is not loaded yet")]
    InferenceUnavailable,

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("invalid session transition from {from:?}: {action}")]
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },
}

pub type Result<T, E = GuardError> = std::result::Result<T, E>;

impl GuardError {
    /// True for errors confined to a single frame.
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            GuardError::Decode(_) | GuardError::Format(_) | GuardError::Persistence(_)
        )
    }

    /// Whether the scheduler may try again on its next tick.
    ///
    /// A refused camera permission needs user action, so it halts scheduling.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GuardError::PermissionDenied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_disjoint() {
        let frame_errors = [
            GuardError::Decode("short plane".into()),
            GuardError::Format("gray".into()),
            GuardError::Persistence("disk full".into()),
        ];
        for err in &frame_errors {
            assert!(err.is_per_frame(), "{err} should be per-frame");
        }

        let session_errors = [
            GuardError::PermissionDenied("camera".into()),
            GuardError::Device("busy".into()),
            GuardError::Configuration("format rejected".into()),
            GuardError::InferenceUnavailable,
        ];
        for err in &session_errors {
            assert!(!err.is_per_frame(), "{err} should be per-session");
        }
    }

    #[test]
    fn permission_denied_is_not_retryable() {
        assert!(!GuardError::PermissionDenied("camera".into()).is_retryable());
        assert!(GuardError::Device("busy".into()).is_retryable());
        assert!(GuardError::Configuration("rejected".into()).is_retryable());
        assert!(GuardError::InferenceUnavailable.is_retryable());
    }
}
