//! Sensor capability abstraction.
//!
//! The acquisition pipeline talks to the sensor exclusively through the
//! [`LineCamera`] trait. Backends are selected once at startup from
//! configuration; the simulated backend is always available, the V4L2
//! backend requires the `v4l-camera` feature.

use super::config::{CameraKind, CameraSettings};
use super::frame::{epoch_seconds, LineFrame};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors that can occur during sensor operations.
///
/// Connect and configure failures abort startup; everything else is a
/// steady-state fault the pipeline logs and rides through.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to connect to camera: {0}")]
    ConnectFailed(String),
    #[error("failed to configure camera: {0}")]
    ConfigureFailed(String),
    #[error("failed to set exposure: {0}")]
    ExposureFailed(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("camera not connected")]
    NotConnected,
    #[error("backend '{0}' not compiled in")]
    BackendUnavailable(&'static str),
}

/// The sensor capability consumed by the acquisition pipeline.
///
/// `capture_line` returning `Ok(None)` means "no frame available this
/// cycle", a transient condition rather than an error. Implementations must be
/// safe for exposure writes interleaved with capture calls from another
/// thread; callers serialize access through [`SharedCamera`].
pub trait LineCamera: Send {
    /// Connects to the device, optionally selecting a specific unit.
    fn connect(&mut self, device_id: Option<&str>) -> Result<(), CameraError>;

    /// Applies window, binning and format settings.
    fn configure(&mut self) -> Result<(), CameraError>;

    /// Sets the exposure time, returning the effective value after any
    /// hardware clamping.
    fn set_exposure(&mut self, exposure_ms: f64) -> Result<f64, CameraError>;

    /// Starts streaming.
    fn start(&mut self) -> Result<(), CameraError>;

    /// Stops streaming.
    fn stop(&mut self) -> Result<(), CameraError>;

    /// Captures one line frame, or `None` if no data was ready.
    fn capture_line(&mut self) -> Result<Option<LineFrame>, CameraError>;

    /// Returns the sensor temperature in degrees Celsius.
    fn temperature_c(&self) -> f64;

    /// Releases the device.
    fn close(&mut self);
}

/// Camera handle shared between the acquisition thread (capture calls) and
/// the processing tick (exposure writes).
pub type SharedCamera = Arc<Mutex<Box<dyn LineCamera>>>;

/// Locks the shared camera, recovering from a poisoned mutex.
///
/// A poisoned lock means another thread panicked mid-operation; the sensor
/// state is still usable for our purposes (every operation re-validates).
pub fn lock_camera(camera: &SharedCamera) -> MutexGuard<'_, Box<dyn LineCamera>> {
    camera.lock().unwrap_or_else(|e| e.into_inner())
}

/// Creates the backend named by the configuration.
pub fn create_camera(settings: &CameraSettings) -> Result<Box<dyn LineCamera>, CameraError> {
    match settings.kind {
        CameraKind::Simulated => Ok(Box::new(SimulatedCamera::new(settings.clone()))),
        #[cfg(feature = "v4l-camera")]
        CameraKind::V4l => Ok(Box::new(super::v4l::V4lLineCamera::new(settings.clone()))),
        #[cfg(not(feature = "v4l-camera"))]
        CameraKind::V4l => Err(CameraError::BackendUnavailable("v4l-camera")),
    }
}

/// Simulated exposure range in milliseconds.
const SIM_EXPOSURE_RANGE_MS: (f64, f64) = (0.01, 1000.0);

/// Simulated saturation level (12-bit sensor).
const SIM_FULL_SCALE: f64 = 4095.0;

/// Deterministic synthetic sensor.
///
/// Signal level scales linearly with exposure so the closed exposure loop
/// behaves realistically: `sample ≈ signal_per_ms * exposure_ms` plus a
/// small per-pixel ripple to keep the variance non-zero.
pub struct SimulatedCamera {
    settings: CameraSettings,
    exposure_ms: f64,
    signal_per_ms: f64,
    sequence: u64,
    connected: bool,
    streaming: bool,
}

impl SimulatedCamera {
    /// Creates a simulated sensor with the default mid-range signal level.
    pub fn new(settings: CameraSettings) -> Self {
        let exposure_ms = settings.exposure_ms;
        Self {
            settings,
            exposure_ms,
            signal_per_ms: 150.0,
            sequence: 0,
            connected: false,
            streaming: false,
        }
    }

    /// Overrides the scene brightness (digital numbers per millisecond of
    /// exposure). Low values force the exposure loop to increase, high
    /// values to decrease.
    pub fn set_signal_per_ms(&mut self, signal_per_ms: f64) {
        self.signal_per_ms = signal_per_ms;
    }

    /// Returns the current exposure in milliseconds.
    pub fn exposure_ms(&self) -> f64 {
        self.exposure_ms
    }
}

impl LineCamera for SimulatedCamera {
    fn connect(&mut self, device_id: Option<&str>) -> Result<(), CameraError> {
        self.connected = true;
        self.sequence = 0;
        tracing::info!(device_id = device_id.unwrap_or("auto"), "Simulated camera connected");
        Ok(())
    }

    fn configure(&mut self) -> Result<(), CameraError> {
        if !self.connected {
            return Err(CameraError::NotConnected);
        }
        tracing::info!(
            rows = self.settings.sensor_rows,
            cols = self.settings.sensor_cols,
            "Simulated camera configured"
        );
        Ok(())
    }

    fn set_exposure(&mut self, exposure_ms: f64) -> Result<f64, CameraError> {
        let (min_ms, max_ms) = SIM_EXPOSURE_RANGE_MS;
        let effective = exposure_ms.clamp(min_ms, max_ms);
        if effective != exposure_ms {
            tracing::warn!(
                requested_ms = exposure_ms,
                effective_ms = effective,
                "Exposure outside supported range, clamping"
            );
        }
        self.exposure_ms = effective;
        tracing::info!(exposure_ms = effective, "Exposure set");
        Ok(effective)
    }

    fn start(&mut self) -> Result<(), CameraError> {
        if !self.connected {
            return Err(CameraError::NotConnected);
        }
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        self.streaming = false;
        Ok(())
    }

    fn capture_line(&mut self) -> Result<Option<LineFrame>, CameraError> {
        if !self.connected {
            return Err(CameraError::NotConnected);
        }
        if !self.streaming {
            return Ok(None);
        }

        let rows = self.settings.sensor_rows;
        let cols = self.settings.sensor_cols;
        let base = self.signal_per_ms * self.exposure_ms;
        let seq = self.sequence;
        let samples: Vec<u16> = (0..rows * cols)
            .map(|i| {
                let ripple = ((i as u64).wrapping_mul(7).wrapping_add(seq * 13) % 17) as f64;
                (base + ripple).min(SIM_FULL_SCALE) as u16
            })
            .collect();

        self.sequence += 1;
        Ok(Some(LineFrame::new(
            samples,
            rows,
            cols,
            epoch_seconds(),
            self.sequence,
        )))
    }

    fn temperature_c(&self) -> f64 {
        35.0
    }

    fn close(&mut self) {
        self.streaming = false;
        self.connected = false;
        tracing::info!("Simulated camera closed");
    }
}
