//! Frame correction and analysis.
//!
//! Raw frames are cropped, transposed and radiometrically corrected, then
//! reduced to brightness statistics for monitoring and exposure control.

mod calibration;
mod statistics;
mod wavelength;

pub use calibration::{crop_and_transpose, CalibrationData, CalibrationError, FrameProcessor};
pub use statistics::FrameStatistics;
pub use wavelength::{derive_wavelengths, WavelengthError};
