//! Frame archival.
//!
//! Every decoded frame can be archived as a JPEG through a
//! `PersistenceSink`. Archival is best effort: failures are reported as
//! `GuardError::Persistence` and never abort a capture cycle.

mod gallery;
mod jpeg;

pub use gallery::FilesystemGallery;
pub use jpeg::{encode_jpeg, DEFAULT_JPEG_QUALITY};

use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

use crate::error::Result;

pub const JPEG_MIME: &str = "image/jpeg";

/// Destination for encoded frames.
pub trait PersistenceSink: Send + Sync {
    /// Store `bytes` and return a locator for the stored item.
    fn save(&self, bytes: &[u8], suggested_name: &str, mime_type: &str) -> Result<String>;
}

/// `IMG_<yyyyMMdd_HHmmss>_<digest>.jpg` for the current local time.
pub fn suggested_name(bytes: &[u8]) -> String {
    suggested_name_at(bytes, Local::now())
}

/// Name stamped with `at`. The short content digest keeps frames captured
/// within the same second apart.
pub fn suggested_name_at(bytes: &[u8], at: DateTime<Local>) -> String {
    let digest = Sha256::digest(bytes);
    format!(
        "IMG_{}_{}.jpg",
        at.format("%Y%m%d_%H%M%S"),
        hex::encode(&digest[..4])
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn names_carry_timestamp_and_digest() {
        let at = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .expect("unambiguous local time");
        let a = suggested_name_at(b"frame-a", at);
        let b = suggested_name_at(b"frame-b", at);
        assert!(a.starts_with("IMG_20240309_070501_"));
        assert!(a.ends_with(".jpg"));
        assert_eq!(a.len(), "IMG_20240309_070501_".len() + 8 + ".jpg".len());
        assert_ne!(a, b);
        assert_eq!(a, suggested_name_at(b"frame-a", at));
    }
}
