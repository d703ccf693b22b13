//! Adaptive exposure control.
//!
//! Brightness statistics from the processing pipeline feed a controller
//! that steps the sensor exposure through a discrete preset set.

mod controller;

pub use controller::{Direction, ExposureController, ExposureError, ExposureStatus};
