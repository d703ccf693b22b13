//! Line-Scan Acquisition Pipeline CLI
//!
//! Loads configuration, brings up the sensor and runs the capture
//! scheduler until interrupted.

use clap::Parser;
use linescan_pipeline::{
    capture::{create_camera, lock_camera, PipelineConfig, SharedCamera},
    exposure::ExposureController,
    pipeline::{CaptureScheduler, PipelineCoordinator},
    processing::{derive_wavelengths, CalibrationData, FrameProcessor},
    publish::LogPublisher,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "linescan-pipeline", version, about = "Line-scan camera acquisition pipeline")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the capture rate in Hz.
    #[arg(long)]
    cap_hz: Option<f64>,

    /// Override the initial exposure in milliseconds.
    #[arg(long)]
    exposure_ms: Option<f64>,

    /// Override the radiometric processing level (0-3).
    #[arg(long)]
    processing_level: Option<u8>,

    /// Enable closed-loop exposure control regardless of configuration.
    #[arg(long)]
    auto_exposure: bool,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Line-scan pipeline v{}", linescan_pipeline::VERSION);

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match PipelineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => PipelineConfig::default(),
    };
    if let Some(cap_hz) = args.cap_hz {
        config.capture.cap_hz = cap_hz;
    }
    if let Some(exposure_ms) = args.exposure_ms {
        config.camera.exposure_ms = exposure_ms;
    }
    if let Some(level) = args.processing_level {
        config.capture.processing_level = level;
    }
    if args.auto_exposure {
        config.auto_exposure.enabled = true;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    // Bring up the sensor. Connect and configure failures are fatal.
    let mut camera = match create_camera(&config.camera) {
        Ok(camera) => camera,
        Err(e) => {
            eprintln!("Failed to create camera backend: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = camera.connect(config.camera.device_id.as_deref()) {
        eprintln!("Failed to connect to camera: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = camera.configure() {
        eprintln!("Failed to configure camera: {}", e);
        std::process::exit(1);
    }

    // Snap the initial exposure through the controller so the preset index
    // and the sensor agree from the first frame.
    let mut controller = match ExposureController::new(
        config.camera.exposure_presets_ms.clone(),
        config.camera.exposure_ms,
        config.auto_exposure.low_threshold,
        config.auto_exposure.high_threshold,
        Duration::from_secs_f64(config.auto_exposure.window_secs),
        config.auto_exposure.min_samples,
    ) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Invalid exposure configuration: {}", e);
            std::process::exit(1);
        }
    };
    let initial_exposure_ms = match camera.set_exposure(controller.exposure_ms()) {
        Ok(effective_ms) => {
            controller.set_override(effective_ms);
            effective_ms
        }
        Err(e) => {
            eprintln!("Failed to set initial exposure: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = camera.start() {
        eprintln!("Failed to start streaming: {}", e);
        std::process::exit(1);
    }

    let calibration = match &config.capture.calibration_file {
        Some(path) => match CalibrationData::from_file(path) {
            Ok(data) => Some(data),
            Err(e) => {
                eprintln!("Failed to load calibration {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let wavelengths = match derive_wavelengths(&config.camera.wavelength) {
        Ok(wavelengths) => wavelengths,
        Err(e) => {
            eprintln!("Invalid wavelength settings: {}", e);
            std::process::exit(1);
        }
    };

    let camera: SharedCamera = Arc::new(Mutex::new(camera));
    let processor = FrameProcessor::new(
        config.crop.clone(),
        calibration,
        config.capture.processing_level,
    );
    let coordinator = PipelineCoordinator::new(
        Arc::clone(&camera),
        processor,
        Some(controller),
        config.auto_exposure.enabled,
        Box::new(LogPublisher::new()),
        config.camera.expected_shape,
        initial_exposure_ms,
    );
    let mut scheduler = CaptureScheduler::new(
        Arc::clone(&camera),
        coordinator,
        config.capture.cap_hz,
        None,
        wavelengths,
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
        }) {
            eprintln!("Failed to install signal handler: {}", e);
            std::process::exit(1);
        }
    }

    info!(
        cap_hz = config.capture.cap_hz,
        exposure_ms = initial_exposure_ms,
        processing_level = config.capture.processing_level,
        auto_exposure = config.auto_exposure.enabled,
        "Pipeline starting"
    );
    scheduler.run(&shutdown);

    let mut camera = lock_camera(&camera);
    if let Err(e) = camera.stop() {
        tracing::warn!(error = %e, "Camera stop failed during shutdown");
    }
    camera.close();
    info!("Pipeline stopped");
}
