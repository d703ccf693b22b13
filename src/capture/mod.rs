//! Sensor capability boundary: frames, configuration and camera backends.
//!
//! The rest of the pipeline never touches hardware directly; it consumes
//! the [`LineCamera`] trait, with the backend chosen once at startup from
//! configuration.

mod camera;
mod config;
mod frame;
#[cfg(feature = "v4l-camera")]
mod v4l;

pub use camera::{
    create_camera, lock_camera, CameraError, LineCamera, SharedCamera, SimulatedCamera,
};
pub use config::{
    AutoExposureSettings, CameraKind, CameraSettings, CaptureSettings, ConfigError, CropSettings,
    PipelineConfig, WavelengthSettings, DEFAULT_EXPOSURE_PRESETS_MS, MODE_CUTOFF_HZ,
};
pub use frame::{epoch_seconds, LineFrame};
#[cfg(feature = "v4l-camera")]
pub use v4l::V4lLineCamera;
