//! Camera classifier capability.
//!
//! The classifier is an opaque, pre-trained two-class model. The pipeline
//! consumes it through `ClassifierBackend` and reaches it through a
//! `ClassifierSlot` so that a model loading in the background defers cycles
//! instead of failing them.

mod backend;
mod backends;
mod result;
mod slot;

pub use backend::ClassifierBackend;
pub use backends::StubClassifier;
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use result::ClassificationResult;
pub use slot::ClassifierSlot;
