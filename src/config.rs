use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::{ChromaLayout, DEFAULT_MAX_CAPTURES, MAX_CAPTURES_LIMIT};
use crate::inspect::{InspectionConfig, PrefilterKind, DEFAULT_INPUT_SIZE, DEFAULT_THRESHOLD};
use crate::session::ControllerSettings;
use crate::store::DEFAULT_JPEG_QUALITY;

const DEFAULT_DEVICE: &str = "stub://front";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_INTERVAL_MS: u64 = 15_000;
const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
const DEFAULT_MIN_EDGE_DENSITY: f32 = 0.02;

const DIMENSION_RANGE: std::ops::RangeInclusive<u32> = 2..=4096;
const INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=3_600_000;
const INITIAL_DELAY_MAX_MS: u64 = 60_000;
const INPUT_SIZE_RANGE: std::ops::RangeInclusive<u32> = 16..=1024;

#[derive(Debug, Deserialize, Default)]
struct GuardConfigFile {
    capture: Option<CaptureConfigFile>,
    inspection: Option<InspectionConfigFile>,
    model: Option<ModelConfigFile>,
    archive: Option<ArchiveConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    layout: Option<String>,
    max_captures: Option<usize>,
    interval_ms: Option<u64>,
    initial_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct InspectionConfigFile {
    threshold: Option<f32>,
    input_size: Option<u32>,
    prefilter: Option<String>,
    min_edge_density: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ArchiveConfigFile {
    path: Option<PathBuf>,
    jpeg_quality: Option<u8>,
}

/// Daemon configuration: defaults, then the file named by `CAMGUARD_CONFIG`
/// (JSON, or TOML for `.toml` paths), then `CAMGUARD_*` overrides.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub capture: CaptureSettings,
    pub inspection: InspectionSettings,
    pub model_path: Option<PathBuf>,
    pub archive: ArchiveSettings,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub layout: ChromaLayout,
    pub max_captures: usize,
    pub interval: Duration,
    pub initial_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct InspectionSettings {
    pub threshold: f32,
    pub input_size: u32,
    pub prefilter: PrefilterKind,
    pub min_edge_density: f32,
}

#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    /// Archival is off when unset.
    pub path: Option<PathBuf>,
    pub jpeg_quality: u8,
}

impl GuardConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAMGUARD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: GuardConfigFile) -> Result<Self> {
        let capture_file = file.capture.unwrap_or_default();
        let layout = match capture_file.layout.as_deref() {
            Some(name) => parse_layout(name)?,
            None => ChromaLayout::Planar,
        };
        let capture = CaptureSettings {
            device: capture_file
                .device
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            width: capture_file.width.unwrap_or(DEFAULT_WIDTH),
            height: capture_file.height.unwrap_or(DEFAULT_HEIGHT),
            layout,
            max_captures: capture_file.max_captures.unwrap_or(DEFAULT_MAX_CAPTURES),
            interval: Duration::from_millis(
                capture_file.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS),
            ),
            initial_delay: Duration::from_millis(
                capture_file
                    .initial_delay_ms
                    .unwrap_or(DEFAULT_INITIAL_DELAY_MS),
            ),
        };

        let inspection_file = file.inspection.unwrap_or_default();
        let prefilter = match inspection_file.prefilter.as_deref() {
            Some(name) => name.parse::<PrefilterKind>().map_err(|e| anyhow!(e))?,
            None => PrefilterKind::None,
        };
        let inspection = InspectionSettings {
            threshold: inspection_file.threshold.unwrap_or(DEFAULT_THRESHOLD),
            input_size: inspection_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            prefilter,
            min_edge_density: inspection_file
                .min_edge_density
                .unwrap_or(DEFAULT_MIN_EDGE_DENSITY),
        };

        let archive_file = file.archive.unwrap_or_default();
        Ok(Self {
            capture,
            inspection,
            model_path: file.model.and_then(|model| model.path),
            archive: ArchiveSettings {
                path: archive_file.path,
                jpeg_quality: archive_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("CAMGUARD_DEVICE") {
            if !device.trim().is_empty() {
                self.capture.device = device;
            }
        }
        if let Ok(max) = std::env::var("CAMGUARD_MAX_CAPTURES") {
            self.capture.max_captures = max
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAMGUARD_MAX_CAPTURES must be an integer"))?;
        }
        if let Ok(interval) = std::env::var("CAMGUARD_INTERVAL_MS") {
            let millis: u64 = interval.trim().parse().map_err(|_| {
                anyhow!("CAMGUARD_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.capture.interval = Duration::from_millis(millis);
        }
        if let Ok(threshold) = std::env::var("CAMGUARD_THRESHOLD") {
            self.inspection.threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAMGUARD_THRESHOLD must be a number"))?;
        }
        if let Ok(prefilter) = std::env::var("CAMGUARD_PREFILTER") {
            if !prefilter.trim().is_empty() {
                self.inspection.prefilter = prefilter.parse().map_err(|e: String| anyhow!(e))?;
            }
        }
        if let Ok(path) = std::env::var("CAMGUARD_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("CAMGUARD_ARCHIVE_DIR") {
            if !path.trim().is_empty() {
                self.archive.path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.capture.device = self.capture.device.trim().to_string();
        if self.capture.device.is_empty() {
            return Err(anyhow!("capture.device cannot be empty"));
        }
        if !DIMENSION_RANGE.contains(&self.capture.width)
            || !DIMENSION_RANGE.contains(&self.capture.height)
        {
            return Err(anyhow!(
                "capture size {}x{} outside 2..=4096",
                self.capture.width,
                self.capture.height
            ));
        }
        if !(1..=MAX_CAPTURES_LIMIT).contains(&self.capture.max_captures) {
            return Err(anyhow!(
                "capture.max_captures must be within 1..={}",
                MAX_CAPTURES_LIMIT
            ));
        }
        let interval_ms = self.capture.interval.as_millis() as u64;
        if !INTERVAL_RANGE_MS.contains(&interval_ms) {
            return Err(anyhow!(
                "capture.interval_ms must be within 100..=3600000, got {}",
                interval_ms
            ));
        }
        if self.capture.initial_delay.as_millis() as u64 > INITIAL_DELAY_MAX_MS {
            return Err(anyhow!("capture.initial_delay_ms must be at most 60000"));
        }

        let threshold = self.inspection.threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(anyhow!(
                "inspection.threshold must be strictly between 0 and 1, got {}",
                threshold
            ));
        }
        if !INPUT_SIZE_RANGE.contains(&self.inspection.input_size) {
            return Err(anyhow!("inspection.input_size must be within 16..=1024"));
        }
        if !(0.0..=1.0).contains(&self.inspection.min_edge_density) {
            return Err(anyhow!("inspection.min_edge_density must be within 0..=1"));
        }

        if let Some(path) = &self.model_path {
            if !path.is_file() {
                return Err(anyhow!("model.path {} is not a readable file", path.display()));
            }
        }
        if let Some(path) = &self.archive.path {
            if path.exists() && !path.is_dir() {
                return Err(anyhow!("archive.path {} is not a directory", path.display()));
            }
        }
        if !(1..=100).contains(&self.archive.jpeg_quality) {
            return Err(anyhow!("archive.jpeg_quality must be within 1..=100"));
        }
        Ok(())
    }

    pub fn inspection_config(&self) -> InspectionConfig {
        InspectionConfig {
            threshold: self.inspection.threshold,
            input_size: self.inspection.input_size,
            prefilter: self
                .inspection
                .prefilter
                .with_min_edge_density(self.inspection.min_edge_density),
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            device_id: self.capture.device.clone(),
            width: self.capture.width,
            height: self.capture.height,
            layout: self.capture.layout,
            max_captures: self.capture.max_captures,
            jpeg_quality: self.archive.jpeg_quality,
            inspection: self.inspection_config(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<GuardConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_layout(name: &str) -> Result<ChromaLayout> {
    match name.trim().to_ascii_lowercase().as_str() {
        "planar" | "i420" | "yu12" => Ok(ChromaLayout::Planar),
        "semi-planar" | "semi_planar" | "nv12" => Ok(ChromaLayout::SemiPlanar),
        other => Err(anyhow!(
            "capture.layout '{}' is not planar or semi-planar",
            other
        )),
    }
}
