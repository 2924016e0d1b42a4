//! camguard_eval - run the classifier over a directory of still images
//!
//! Prints one line per image: file, no-camera score, camera score, verdict.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use camguard::detect::TractClassifier;
use camguard::inspect::{DEFAULT_INPUT_SIZE, DEFAULT_THRESHOLD};
use camguard::{ClassificationResult, ClassifierBackend, ColorImage};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// ONNX model file.
    #[arg(long, env = "CAMGUARD_MODEL_PATH")]
    model: PathBuf,
    /// Directory of JPEG/PNG images.
    #[arg(long)]
    images: PathBuf,
    /// Classifier input side length.
    #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
    input_size: u32,
    /// Detection threshold (strictly greater than).
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if !(args.threshold > 0.0 && args.threshold < 1.0) {
        return Err(anyhow!("--threshold must be strictly between 0 and 1"));
    }

    let bytes = fs::read(&args.model)
        .with_context(|| format!("failed to read model {}", args.model.display()))?;
    let mut model = TractClassifier::load(&bytes, args.input_size)?;

    let mut files: Vec<PathBuf> = fs::read_dir(&args.images)
        .with_context(|| format!("failed to list {}", args.images.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_image(path))
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(anyhow!("no images found in {}", args.images.display()));
    }

    let mut detected = 0usize;
    for path in &files {
        match classify_file(&mut model, path, args.input_size) {
            Ok(result) => {
                let verdict = result.exceeds(args.threshold);
                detected += usize::from(verdict);
                println!(
                    "{}\t{:.4}\t{:.4}\t{}",
                    path.display(),
                    result.no_camera_prob,
                    result.camera_prob,
                    if verdict { "camera" } else { "clear" }
                );
            }
            Err(err) => log::warn!("{}: {:#}", path.display(), err),
        }
    }
    log::info!("{} of {} image(s) above threshold", detected, files.len());
    Ok(())
}

fn classify_file(
    model: &mut TractClassifier,
    path: &Path,
    input_size: u32,
) -> Result<ClassificationResult> {
    let decoded = image::open(path).with_context(|| format!("failed to decode {}", path.display()))?;
    let scaled = ColorImage::from_dynamic(decoded).scale_to(input_size, input_size)?;
    let tensor = scaled.to_normalized_tensor()?;
    Ok(model.classify(&tensor)?)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| matches!(ext.as_str(), "jpg" | "jpeg" | "png"))
}
