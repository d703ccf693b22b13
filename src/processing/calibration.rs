//! Geometric cropping and radiometric calibration.
//!
//! Each raw frame is cropped to the configured optical window and
//! transposed to spatial-by-spectral orientation, then corrected according
//! to the processing level:
//!
//! - 0: raw digital numbers (pass-through)
//! - 1: dark-frame subtraction
//! - 2: flat-field correction
//! - 3: per-band radiance scaling, normalized by exposure time
//!
//! Calibration data with a shape that does not match the cropped frame
//! degrades to pass-through with a warning; a bad calibration file must
//! not fail frames.

use crate::capture::{CropSettings, LineFrame};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Full-scale clamp for corrected samples.
const FULL_SCALE: f32 = u16::MAX as f32;

/// Errors loading calibration data.
#[derive(Debug, Clone, Error)]
pub enum CalibrationError {
    #[error("failed to read calibration file: {0}")]
    FileReadError(String),
    #[error("failed to parse calibration file: {0}")]
    ParseError(String),
}

/// Radiometric calibration data.
///
/// All fields are optional: levels above the available data degrade to
/// the highest correction that can be applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationData {
    /// Dark frame, same shape as the cropped+transposed output.
    pub dark_frame: Option<Vec<Vec<f32>>>,
    /// Flat-field reference, same shape as the cropped+transposed output.
    pub flat_field: Option<Vec<Vec<f32>>>,
    /// Per-spectral-band radiance scale factors (one per output column).
    pub radiance_scale: Option<Vec<f32>>,
}

impl CalibrationData {
    /// Loads calibration data from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CalibrationError::FileReadError(e.to_string()))?;
        let data: CalibrationData =
            toml::from_str(&content).map_err(|e| CalibrationError::ParseError(e.to_string()))?;
        tracing::info!(
            dark = data.dark_frame.is_some(),
            flat = data.flat_field.is_some(),
            radiance = data.radiance_scale.is_some(),
            "Calibration data loaded"
        );
        Ok(data)
    }
}

/// Applies crop, transpose and radiometric correction to raw frames.
pub struct FrameProcessor {
    crop: CropSettings,
    calibration: Option<CalibrationData>,
    processing_level: u8,
}

impl FrameProcessor {
    /// Creates a processor for the given crop window and processing level.
    pub fn new(crop: CropSettings, calibration: Option<CalibrationData>, processing_level: u8) -> Self {
        Self {
            crop,
            calibration,
            processing_level,
        }
    }

    /// Runs the full correction chain on one raw frame.
    pub fn process(&self, raw: &LineFrame, exposure_ms: f64) -> LineFrame {
        let cropped = crop_and_transpose(raw, &self.crop);
        self.calibrate(cropped, exposure_ms)
    }

    /// Applies radiometric correction up to the configured level.
    fn calibrate(&self, frame: LineFrame, exposure_ms: f64) -> LineFrame {
        let calibration = match (&self.calibration, self.processing_level) {
            (_, 0) | (None, _) => return frame,
            (Some(c), _) => c,
        };

        let (rows, cols) = frame.shape();
        let mut values: Vec<f32> = frame.samples().iter().map(|&s| s as f32).collect();

        if self.processing_level >= 1 {
            if let Some(dark) = &calibration.dark_frame {
                if plane_shape(dark) == Some((rows, cols)) {
                    for (r, dark_row) in dark.iter().enumerate() {
                        for (c, &d) in dark_row.iter().enumerate() {
                            let v = &mut values[r * cols + c];
                            *v = (*v - d).max(0.0);
                        }
                    }
                } else {
                    tracing::warn!(
                        frame_shape = format!("{}x{}", rows, cols),
                        "Dark frame shape mismatch, skipping dark subtraction"
                    );
                }
            }
        }

        if self.processing_level >= 2 {
            if let Some(flat) = &calibration.flat_field {
                if plane_shape(flat) == Some((rows, cols)) {
                    let flat_mean = plane_mean(flat);
                    for (r, flat_row) in flat.iter().enumerate() {
                        for (c, &f) in flat_row.iter().enumerate() {
                            // Guard divide-by-zero on dead flat-field pixels.
                            let f_safe = if f > 0.0 { f } else { 1.0 };
                            let v = &mut values[r * cols + c];
                            *v = *v / f_safe * flat_mean;
                        }
                    }
                } else {
                    tracing::warn!(
                        frame_shape = format!("{}x{}", rows, cols),
                        "Flat field shape mismatch, skipping flat-field correction"
                    );
                }
            }
        }

        if self.processing_level >= 3 {
            if let Some(scale) = &calibration.radiance_scale {
                if scale.len() == cols {
                    let exposure = exposure_ms.max(f64::MIN_POSITIVE) as f32;
                    for r in 0..rows {
                        for (c, &s) in scale.iter().enumerate() {
                            values[r * cols + c] *= s / exposure;
                        }
                    }
                } else {
                    tracing::warn!(
                        bands = cols,
                        scale_len = scale.len(),
                        "Radiance scale length mismatch, skipping radiance conversion"
                    );
                }
            }
        }

        let samples: Vec<u16> = values
            .into_iter()
            .map(|v| v.clamp(0.0, FULL_SCALE) as u16)
            .collect();
        LineFrame::new(samples, rows, cols, frame.timestamp(), frame.sequence())
    }
}

/// Crops the raw frame to the configured window and transposes it so rows
/// index the spatial axis and columns the spectral axis.
///
/// Out-of-range windows are clamped to the frame with a warning rather
/// than failing the frame.
pub fn crop_and_transpose(raw: &LineFrame, crop: &CropSettings) -> LineFrame {
    let (rows, cols) = raw.shape();

    let start_y = crop.offset_y.min(rows);
    let start_x = crop.offset_x.min(cols);
    let height = if crop.height == 0 { rows - start_y } else { crop.height };
    let width = if crop.width == 0 { cols - start_x } else { crop.width };
    let end_y = (start_y + height).min(rows);
    let end_x = (start_x + width).min(cols);

    if end_y - start_y < height || end_x - start_x < width {
        tracing::warn!(
            frame_shape = format!("{}x{}", rows, cols),
            crop = ?crop,
            "Crop window exceeds frame, clamping"
        );
    }

    let out_rows = end_x - start_x;
    let out_cols = end_y - start_y;
    let mut samples = vec![0u16; out_rows * out_cols];
    for y in start_y..end_y {
        for x in start_x..end_x {
            // Transposed: source (y, x) lands at (x', y').
            let out_r = x - start_x;
            let out_c = y - start_y;
            samples[out_r * out_cols + out_c] = raw.sample(y, x).unwrap_or(0);
        }
    }

    LineFrame::new(samples, out_rows, out_cols, raw.timestamp(), raw.sequence())
}

/// Shape of a rectangular 2D plane, or `None` if rows are ragged or empty.
fn plane_shape(plane: &[Vec<f32>]) -> Option<(usize, usize)> {
    let rows = plane.len();
    let cols = plane.first()?.len();
    if cols == 0 || plane.iter().any(|row| row.len() != cols) {
        return None;
    }
    Some((rows, cols))
}

/// Mean over all entries of a 2D plane.
fn plane_mean(plane: &[Vec<f32>]) -> f32 {
    let count: usize = plane.iter().map(Vec::len).sum();
    if count == 0 {
        return 1.0;
    }
    let sum: f32 = plane.iter().flatten().sum();
    sum / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::epoch_seconds;

    fn raw_frame() -> LineFrame {
        // 2x3 frame: [[1,2,3],[4,5,6]]
        LineFrame::new(vec![1, 2, 3, 4, 5, 6], 2, 3, epoch_seconds(), 7)
    }

    fn full_crop() -> CropSettings {
        CropSettings::default()
    }

    #[test]
    fn test_crop_full_frame_transposes() {
        let out = crop_and_transpose(&raw_frame(), &full_crop());
        assert_eq!(out.shape(), (3, 2));
        // Transpose of [[1,2,3],[4,5,6]] is [[1,4],[2,5],[3,6]].
        assert_eq!(out.samples(), &[1, 4, 2, 5, 3, 6]);
        assert_eq!(out.sequence(), 7);
    }

    #[test]
    fn test_crop_window() {
        let crop = CropSettings {
            offset_y: 0,
            offset_x: 1,
            height: 2,
            width: 2,
        };
        let out = crop_and_transpose(&raw_frame(), &crop);
        // Window [[2,3],[5,6]], transposed to [[2,5],[3,6]].
        assert_eq!(out.shape(), (2, 2));
        assert_eq!(out.samples(), &[2, 5, 3, 6]);
    }

    #[test]
    fn test_oversized_crop_clamped() {
        let crop = CropSettings {
            offset_y: 1,
            offset_x: 1,
            height: 100,
            width: 100,
        };
        let out = crop_and_transpose(&raw_frame(), &crop);
        assert_eq!(out.shape(), (2, 1));
        assert_eq!(out.samples(), &[5, 6]);
    }

    #[test]
    fn test_level_zero_pass_through() {
        let processor = FrameProcessor::new(full_crop(), Some(CalibrationData::default()), 0);
        let out = processor.process(&raw_frame(), 10.0);
        // Level 0: geometric transform only, digital numbers untouched.
        assert_eq!(out.samples(), &[1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_no_calibration_pass_through() {
        let processor = FrameProcessor::new(full_crop(), None, 3);
        let out = processor.process(&raw_frame(), 10.0);
        assert_eq!(out.samples(), &[1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_dark_subtraction() {
        let calibration = CalibrationData {
            // Output shape is 3x2 after transpose.
            dark_frame: Some(vec![vec![1.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0]]),
            ..Default::default()
        };
        let processor = FrameProcessor::new(full_crop(), Some(calibration), 1);
        let out = processor.process(&raw_frame(), 10.0);
        assert_eq!(out.samples(), &[0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_dark_shape_mismatch_pass_through() {
        let calibration = CalibrationData {
            dark_frame: Some(vec![vec![1.0; 5]; 5]),
            ..Default::default()
        };
        let processor = FrameProcessor::new(full_crop(), Some(calibration), 1);
        let out = processor.process(&raw_frame(), 10.0);
        assert_eq!(out.samples(), &[1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_flat_field_uniform_is_identity() {
        let calibration = CalibrationData {
            flat_field: Some(vec![vec![2.0, 2.0], vec![2.0, 2.0], vec![2.0, 2.0]]),
            ..Default::default()
        };
        let processor = FrameProcessor::new(full_crop(), Some(calibration), 2);
        let out = processor.process(&raw_frame(), 10.0);
        // Uniform flat field: v / f * mean(f) == v.
        assert_eq!(out.samples(), &[1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_radiance_scaling() {
        let calibration = CalibrationData {
            // 2 output columns (spectral bands).
            radiance_scale: Some(vec![10.0, 20.0]),
            ..Default::default()
        };
        let processor = FrameProcessor::new(full_crop(), Some(calibration), 3);
        let out = processor.process(&raw_frame(), 2.0);
        // Column 0 scaled by 10/2=5, column 1 by 20/2=10.
        assert_eq!(out.samples(), &[5, 40, 10, 50, 15, 60]);
    }
}
