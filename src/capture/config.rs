//! Pipeline configuration.
//!
//! All settings load from a single TOML file with `[camera]`, `[capture]`,
//! `[auto_exposure]` and `[crop]` tables. Validation happens once at
//! startup; an invalid configuration is a fatal error and nothing is
//! started.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Capture rate at or above which the dedicated acquisition thread is used.
pub const MODE_CUTOFF_HZ: f64 = 50.0;

/// Default exposure presets in milliseconds (ascending).
pub const DEFAULT_EXPOSURE_PRESETS_MS: [f64; 10] =
    [5.0, 8.0, 10.0, 12.0, 16.0, 20.0, 25.0, 30.0, 40.0, 50.0];

/// Which sensor backend to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    /// Deterministic synthetic sensor for development and tests.
    Simulated,
    /// V4L2 hardware backend (requires the `v4l-camera` feature).
    V4l,
}

/// Sensor and window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    /// Backend selection.
    pub kind: CameraKind,
    /// Optional device identifier (serial number, MAC, or device index).
    pub device_id: Option<String>,
    /// Sensor window height in rows (spectral axis before transpose).
    pub sensor_rows: usize,
    /// Sensor window width in columns (spatial axis before transpose).
    pub sensor_cols: usize,
    /// Initial exposure time in milliseconds.
    pub exposure_ms: f64,
    /// Allowed exposure presets in milliseconds.
    pub exposure_presets_ms: Vec<f64>,
    /// Expected corrected output shape `[rows, cols]` after crop+transpose.
    pub expected_shape: [usize; 2],
    /// Wavelength calibration scheme.
    pub wavelength: WavelengthSettings,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            kind: CameraKind::Simulated,
            device_id: None,
            sensor_rows: 343,
            sensor_cols: 1024,
            exposure_ms: 10.0,
            exposure_presets_ms: DEFAULT_EXPOSURE_PRESETS_MS.to_vec(),
            expected_shape: [1024, 343],
            wavelength: WavelengthSettings::default(),
        }
    }
}

/// Wavelength table derivation scheme.
///
/// Three schemes are supported, matching the calibration data that ships
/// with different sensor assemblies: an explicit per-band table, a linear
/// span, or a pixel-dispersion model relative to the full sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WavelengthSettings {
    /// Explicit per-band wavelength table in nanometres.
    Table {
        /// One wavelength per spectral band.
        wavelength_nm: Vec<f32>,
    },
    /// Dispersion model: `start + (offset + i) * dispersion`.
    Dispersion {
        /// Wavelength of full-sensor pixel 0 in nanometres.
        start_nm: f32,
        /// Per-pixel dispersion in nanometres.
        dispersion_nm_px: f32,
        /// Spectral window offset on the full sensor, in pixels.
        offset_px: usize,
        /// Number of spectral bands.
        bands: usize,
    },
    /// Linear span from start to end over a band count.
    Linear {
        /// First-band wavelength in nanometres.
        start_nm: f32,
        /// Last-band wavelength in nanometres.
        end_nm: f32,
        /// Number of spectral bands.
        bands: usize,
    },
}

impl Default for WavelengthSettings {
    fn default() -> Self {
        Self::Linear {
            start_nm: 400.0,
            end_nm: 1000.0,
            bands: 343,
        }
    }
}

/// Software crop window applied to each raw frame before calibration.
///
/// A zero height or width means "to the edge of the frame".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CropSettings {
    /// Top row of the crop window.
    #[serde(default)]
    pub offset_y: usize,
    /// Left column of the crop window.
    #[serde(default)]
    pub offset_x: usize,
    /// Crop window height (0 = full height).
    #[serde(default)]
    pub height: usize,
    /// Crop window width (0 = full width).
    #[serde(default)]
    pub width: usize,
}

/// Acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// Target capture rate in Hz.
    pub cap_hz: f64,
    /// Radiometric processing level (0 = raw, 1 = dark-subtracted,
    /// 2 = flat-field, 3 = radiance).
    pub processing_level: u8,
    /// Optional calibration data file (TOML).
    pub calibration_file: Option<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            cap_hz: 10.0,
            processing_level: 0,
            calibration_file: None,
        }
    }
}

/// Closed-loop exposure control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoExposureSettings {
    /// Whether exposure control is active at startup.
    pub enabled: bool,
    /// Mean brightness below which exposure should increase.
    pub low_threshold: f64,
    /// Mean brightness above which exposure should decrease.
    pub high_threshold: f64,
    /// Settling window between adjustments, in seconds.
    pub window_secs: f64,
    /// Minimum buffered samples before a decision is made.
    pub min_samples: usize,
}

impl Default for AutoExposureSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            low_threshold: 500.0,
            high_threshold: 3000.0,
            window_secs: 5.0,
            min_samples: 10,
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sensor settings.
    #[serde(default)]
    pub camera: CameraSettings,
    /// Acquisition settings.
    #[serde(default)]
    pub capture: CaptureSettings,
    /// Crop window.
    #[serde(default)]
    pub crop: CropSettings,
    /// Exposure control settings.
    #[serde(default)]
    pub auto_exposure: AutoExposureSettings,
}

/// Configuration validation and loading errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("capture rate must be positive, got {0}")]
    InvalidCaptureRate(f64),
    #[error("exposure must be positive, got {0}")]
    InvalidExposure(f64),
    #[error("sensor window dimensions must be non-zero")]
    InvalidDimensions,
    #[error("exposure preset list must be non-empty with positive values")]
    InvalidPresets,
    #[error("low threshold {low} must be below high threshold {high}")]
    InvalidThresholds { low: f64, high: f64 },
    #[error("evaluation window must be positive, got {0}")]
    InvalidWindow(f64),
    #[error("minimum sample count must be at least 1")]
    InvalidMinSamples,
    #[error("processing level must be 0-3, got {0}")]
    InvalidProcessingLevel(u8),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

impl PipelineConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        let config: PipelineConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates all parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.cap_hz <= 0.0 {
            return Err(ConfigError::InvalidCaptureRate(self.capture.cap_hz));
        }
        if self.camera.exposure_ms <= 0.0 {
            return Err(ConfigError::InvalidExposure(self.camera.exposure_ms));
        }
        if self.camera.sensor_rows == 0 || self.camera.sensor_cols == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.camera.exposure_presets_ms.is_empty()
            || self.camera.exposure_presets_ms.iter().any(|&p| p <= 0.0)
        {
            return Err(ConfigError::InvalidPresets);
        }
        if self.auto_exposure.low_threshold >= self.auto_exposure.high_threshold {
            return Err(ConfigError::InvalidThresholds {
                low: self.auto_exposure.low_threshold,
                high: self.auto_exposure.high_threshold,
            });
        }
        if self.auto_exposure.window_secs <= 0.0 {
            return Err(ConfigError::InvalidWindow(self.auto_exposure.window_secs));
        }
        if self.auto_exposure.min_samples == 0 {
            return Err(ConfigError::InvalidMinSamples);
        }
        if self.capture.processing_level > 3 {
            return Err(ConfigError::InvalidProcessingLevel(
                self.capture.processing_level,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_rate_invalid() {
        let mut config = PipelineConfig::default();
        config.capture.cap_hz = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCaptureRate(_))
        ));
    }

    #[test]
    fn test_inverted_thresholds_invalid() {
        let mut config = PipelineConfig::default();
        config.auto_exposure.low_threshold = 3000.0;
        config.auto_exposure.high_threshold = 500.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn test_empty_presets_invalid() {
        let mut config = PipelineConfig::default();
        config.camera.exposure_presets_ms.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPresets)
        ));
    }

    #[test]
    fn test_processing_level_range() {
        let mut config = PipelineConfig::default();
        config.capture.processing_level = 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProcessingLevel(4))
        ));
    }

    #[test]
    fn test_wavelength_settings_parse() {
        let toml_str = r#"
            [camera]
            kind = "simulated"
            sensor_rows = 16
            sensor_cols = 64
            exposure_ms = 10.0
            exposure_presets_ms = [5.0, 10.0, 20.0]
            expected_shape = [64, 16]

            [camera.wavelength]
            start_nm = 400.0
            dispersion_nm_px = 0.7
            offset_px = 100
            bands = 16
        "#;
        let config: PipelineConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.camera.wavelength,
            WavelengthSettings::Dispersion { bands: 16, .. }
        ));
    }
}
