use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{GuardError, Result};

use super::PersistenceSink;

const MAX_NAME_SUFFIX: u32 = 10_000;

/// Local directory acting as the capture gallery.
///
/// Files are written atomically and never overwritten: a name already taken
/// gets a numeric suffix (`IMG_x.jpg`, `IMG_x_1.jpg`, ...).
#[derive(Clone, Debug)]
pub struct FilesystemGallery {
    root: PathBuf,
}

impl FilesystemGallery {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| {
            GuardError::Persistence(format!("create gallery {}: {}", root.display(), err))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn free_path(&self, name: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(path);
        }
        let (stem, extension) = name.rsplit_once('.').unwrap_or((name, ""));
        (1..MAX_NAME_SUFFIX)
            .map(|n| self.root.join(format!("{}_{}.{}", stem, n, extension)))
            .find(|candidate| !candidate.exists())
            .ok_or_else(|| GuardError::Persistence(format!("no free file name for {}", name)))
    }
}

impl PersistenceSink for FilesystemGallery {
    fn save(&self, bytes: &[u8], suggested_name: &str, mime_type: &str) -> Result<String> {
        let name = sanitize_file_name(suggested_name, mime_type)?;
        let path = self.free_path(&name)?;
        write_atomic(&path, bytes).map_err(|err| {
            GuardError::Persistence(format!("write {}: {}", path.display(), err))
        })?;
        log::debug!("archived {} ({} bytes)", path.display(), bytes.len());
        Ok(format!("file://{}", path.display()))
    }
}

fn sanitize_file_name(name: &str, mime_type: &str) -> Result<String> {
    let extension = match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        other => {
            return Err(GuardError::Persistence(format!(
                "unsupported MIME type {}",
                other
            )))
        }
    };
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.starts_with('.') {
        return Err(GuardError::Persistence(format!(
            "invalid file name '{}'",
            name
        )));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(GuardError::Persistence(
            "file name must be [A-Za-z0-9._-] only".to_string(),
        ));
    }
    let stem = trimmed
        .rsplit_once('.')
        .map_or(trimmed, |(stem, _)| stem);
    Ok(format!("{}.{}", stem, extension))
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)
}
