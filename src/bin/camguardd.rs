//! camguardd - periodic camera sampling daemon
//!
//! This daemon:
//! 1. Loads configuration (`CAMGUARD_CONFIG`, `CAMGUARD_*` overrides)
//! 2. Loads the classifier in the background; cycles defer until it is ready
//! 3. Samples the camera in bounded batches on a fixed interval
//! 4. Stops on Ctrl-C, on a camera detection, or on a non-retryable error

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};

use camguard::config::GuardConfig;
use camguard::ingest::{Camera, SyntheticCamera, SyntheticConfig};
use camguard::session::LogObserver;
use camguard::{
    CaptureController, ClassifierSlot, FilesystemGallery, GuardError, PipelineObserver, Scheduler,
    StubClassifier,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera device id (overrides capture.device).
    #[arg(long)]
    device: Option<String>,
    /// Serve a constant camera probability instead of loading a model.
    #[arg(long)]
    stub_camera_prob: Option<f32>,
    /// Archive directory (overrides archive.path).
    #[arg(long)]
    archive: Option<PathBuf>,
}

#[derive(Debug)]
enum Shutdown {
    Signal,
    Detected,
    Failed(String),
}

/// Logs like `LogObserver` and turns terminal events into shutdown requests.
struct DaemonObserver {
    log: LogObserver,
    shutdown: Mutex<Sender<Shutdown>>,
}

impl DaemonObserver {
    fn request(&self, reason: Shutdown) {
        if let Ok(tx) = self.shutdown.lock() {
            let _ = tx.send(reason);
        }
    }
}

impl PipelineObserver for DaemonObserver {
    fn on_cycle_start(&self) {
        self.log.on_cycle_start();
    }

    fn on_cycle_stop(&self) {
        self.log.on_cycle_stop();
    }

    fn on_detection_state_changed(&self, detected: bool) {
        self.log.on_detection_state_changed(detected);
        if detected {
            self.request(Shutdown::Detected);
        }
    }

    fn on_error(&self, error: &GuardError) {
        self.log.on_error(error);
        if !error.is_retryable() {
            self.request(Shutdown::Failed(error.to_string()));
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = GuardConfig::load()?;
    if let Some(device) = args.device {
        config.capture.device = device;
    }
    if let Some(archive) = args.archive {
        config.archive.path = Some(archive);
    }

    let (tx, rx) = mpsc::channel();
    let camera = build_camera(&config.capture.device)?;
    let classifier = ClassifierSlot::new();
    match args.stub_camera_prob {
        Some(prob) => {
            if !(0.0..=1.0).contains(&prob) {
                return Err(anyhow!("--stub-camera-prob must be within 0..=1"));
            }
            log::warn!("using stub classifier (camera_prob={})", prob);
            classifier.install(Box::new(
                StubClassifier::constant(prob).with_input_size(config.inspection.input_size),
            ));
        }
        None => spawn_model_loader(&config, classifier.clone(), tx.clone())?,
    }

    let observer = Arc::new(DaemonObserver {
        log: LogObserver,
        shutdown: Mutex::new(tx.clone()),
    });
    let mut controller =
        CaptureController::new(camera, classifier, config.controller_settings()).with_observer(observer);
    if let Some(path) = &config.archive.path {
        let gallery = FilesystemGallery::new(path)?;
        log::info!("archiving frames to {}", gallery.root().display());
        controller = controller.with_sink(Arc::new(gallery));
    }
    let controller = Arc::new(controller);

    let scheduler = Scheduler::spawn(
        controller.clone(),
        config.capture.initial_delay,
        config.capture.interval,
    )?;

    ctrlc::set_handler(move || {
        let _ = tx.send(Shutdown::Signal);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!(
        "camguardd running on {} (batch {}, every {:?})",
        config.capture.device,
        config.capture.max_captures,
        config.capture.interval
    );
    let reason = rx.recv().unwrap_or(Shutdown::Signal);
    log::info!("shutting down: {:?}", reason);
    scheduler.cancel();

    if let Some(verdict) = controller.last_verdict() {
        log::info!(
            "last decision: detected={} invocations={} best_camera_prob={:?}",
            verdict.detected,
            verdict.invocations,
            verdict.best_camera_prob
        );
    }
    match reason {
        Shutdown::Failed(message) => Err(anyhow!(message)),
        Shutdown::Signal | Shutdown::Detected => Ok(()),
    }
}

fn build_camera(device: &str) -> Result<Arc<dyn Camera>> {
    if device.starts_with("stub://") {
        return Ok(Arc::new(SyntheticCamera::new(SyntheticConfig {
            checker_cell: Some(32),
            ..SyntheticConfig::default()
        })));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Arc::new(camguard::ingest::V4l2Camera::new()))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(anyhow!(
            "device {} needs the ingest-v4l2 feature; only stub:// ids are available",
            device
        ))
    }
}

#[cfg(feature = "backend-tract")]
fn spawn_model_loader(
    config: &GuardConfig,
    slot: ClassifierSlot,
    shutdown: Sender<Shutdown>,
) -> Result<()> {
    use anyhow::Context;
    use camguard::detect::TractClassifier;
    use camguard::ClassifierBackend;

    let path = config
        .model_path
        .clone()
        .ok_or_else(|| anyhow!("set model.path (CAMGUARD_MODEL_PATH) or --stub-camera-prob"))?;
    let input_size = config.inspection.input_size;
    std::thread::Builder::new()
        .name("camguard-model".to_string())
        .spawn(move || {
            let loaded = std::fs::read(&path)
                .with_context(|| format!("failed to read model {}", path.display()))
                .and_then(|bytes| Ok(TractClassifier::load(&bytes, input_size)?))
                .and_then(|mut model| {
                    model.warm_up()?;
                    Ok(model)
                });
            match loaded {
                Ok(model) => {
                    log::info!("model {} loaded", path.display());
                    slot.install(Box::new(model));
                }
                Err(err) => {
                    log::error!("model load failed: {:#}", err);
                    let _ = shutdown.send(Shutdown::Failed(format!("model load failed: {:#}", err)));
                }
            }
        })
        .context("failed to spawn model loader")?;
    Ok(())
}

#[cfg(not(feature = "backend-tract"))]
fn spawn_model_loader(
    _config: &GuardConfig,
    _slot: ClassifierSlot,
    _shutdown: Sender<Shutdown>,
) -> Result<()> {
    Err(anyhow!(
        "model inference needs the backend-tract feature; use --stub-camera-prob"
    ))
}
