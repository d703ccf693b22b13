//! Closed-loop exposure controller.
//!
//! Exposure moves through a discrete, ascending set of presets rather than
//! a continuous range: two continuous values straddling a threshold would
//! oscillate, while stepping between hardware-supported presets settles.
//! The rolling statistics buffer is cleared after every adjustment so no
//! decision is ever made twice off the same data, which also turns the
//! evaluation window into a genuine settling period.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Capacity of the rolling mean-brightness buffer.
const MEAN_BUFFER_CAPACITY: usize = 100;

/// Direction of an exposure adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Step to the next-higher preset (signal too low).
    Increase,
    /// Step to the next-lower preset (signal too high).
    Decrease,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Increase => write!(f, "increase"),
            Self::Decrease => write!(f, "decrease"),
        }
    }
}

/// Controller construction errors.
#[derive(Debug, Clone, Error)]
pub enum ExposureError {
    #[error("preset list must be non-empty")]
    EmptyPresets,
    #[error("presets must be positive, got {0}")]
    NonPositivePreset(f64),
    #[error("low threshold {low} must be below high threshold {high}")]
    InvalidThresholds { low: f64, high: f64 },
    #[error("minimum sample count must be at least 1")]
    InvalidMinSamples,
}

/// Snapshot of controller state for status reporting.
#[derive(Debug, Clone)]
pub struct ExposureStatus {
    /// Current exposure in milliseconds.
    pub exposure_ms: f64,
    /// Current preset index (0-based).
    pub preset_index: usize,
    /// Total number of presets.
    pub preset_count: usize,
    /// All presets, ascending.
    pub presets_ms: Vec<f64>,
    /// Adjustments made since construction.
    pub adjustment_count: u64,
}

/// Adjusts exposure through predefined presets from rolling brightness
/// statistics.
pub struct ExposureController {
    presets_ms: Vec<f64>,
    index: usize,
    exposure_ms: f64,
    low_threshold: f64,
    high_threshold: f64,
    window: Duration,
    min_samples: usize,
    mean_buffer: VecDeque<f64>,
    last_adjustment: Instant,
    adjustment_count: u64,
}

impl ExposureController {
    /// Creates a controller from an allowed preset list.
    ///
    /// Presets are sorted ascending and deduplicated; the initial exposure
    /// is snapped to the nearest preset by absolute difference, ties
    /// breaking toward the lower index.
    pub fn new(
        presets_ms: Vec<f64>,
        initial_exposure_ms: f64,
        low_threshold: f64,
        high_threshold: f64,
        window: Duration,
        min_samples: usize,
    ) -> Result<Self, ExposureError> {
        if presets_ms.is_empty() {
            return Err(ExposureError::EmptyPresets);
        }
        if let Some(&bad) = presets_ms.iter().find(|&&p| p <= 0.0) {
            return Err(ExposureError::NonPositivePreset(bad));
        }
        if low_threshold >= high_threshold {
            return Err(ExposureError::InvalidThresholds {
                low: low_threshold,
                high: high_threshold,
            });
        }
        if min_samples == 0 {
            return Err(ExposureError::InvalidMinSamples);
        }

        let mut presets_ms = presets_ms;
        presets_ms.sort_by(|a, b| a.total_cmp(b));
        presets_ms.dedup();

        let index = nearest_preset_index(&presets_ms, initial_exposure_ms);
        let exposure_ms = presets_ms[index];

        tracing::info!(
            presets = presets_ms.len(),
            range_ms = format!("{:.1}-{:.1}", presets_ms[0], presets_ms[presets_ms.len() - 1]),
            initial_ms = exposure_ms,
            low = low_threshold,
            high = high_threshold,
            "Exposure controller initialized"
        );

        Ok(Self {
            presets_ms,
            index,
            exposure_ms,
            low_threshold,
            high_threshold,
            window,
            min_samples,
            mean_buffer: VecDeque::with_capacity(MEAN_BUFFER_CAPACITY),
            last_adjustment: Instant::now(),
            adjustment_count: 0,
        })
    }

    /// Appends a brightness mean to the rolling buffer, evicting the
    /// oldest sample once at capacity.
    pub fn update_statistics(&mut self, mean: f64) {
        if self.mean_buffer.len() == MEAN_BUFFER_CAPACITY {
            self.mean_buffer.pop_front();
        }
        self.mean_buffer.push_back(mean);
    }

    /// Decides whether an adjacent-preset move is warranted.
    ///
    /// Returns `None` until the evaluation window has elapsed since the
    /// last adjustment and at least `min_samples` means are buffered. At a
    /// preset boundary the out-of-range condition is logged as a warning
    /// and no adjustment is signalled.
    pub fn should_adjust(&self) -> Option<Direction> {
        if self.last_adjustment.elapsed() < self.window {
            return None;
        }
        if self.mean_buffer.len() < self.min_samples {
            return None;
        }

        let avg = self.mean_buffer.iter().sum::<f64>() / self.mean_buffer.len() as f64;

        if avg < self.low_threshold {
            if self.can_increase() {
                return Some(Direction::Increase);
            }
            tracing::warn!(
                mean = avg,
                exposure_ms = self.exposure_ms,
                "Signal low but already at maximum exposure"
            );
        } else if avg > self.high_threshold {
            if self.can_decrease() {
                return Some(Direction::Decrease);
            }
            tracing::warn!(
                mean = avg,
                exposure_ms = self.exposure_ms,
                "Signal high but already at minimum exposure"
            );
        }
        None
    }

    /// Moves one preset in the given direction.
    ///
    /// Returns the new exposure, or `None` when the boundary has already
    /// been reached. On success the rolling buffer is cleared so the next
    /// decision uses only post-adjustment data.
    pub fn adjust(&mut self, direction: Direction) -> Option<f64> {
        match direction {
            Direction::Increase if self.can_increase() => self.index += 1,
            Direction::Decrease if self.can_decrease() => self.index -= 1,
            _ => return None,
        }

        let old_ms = self.exposure_ms;
        self.exposure_ms = self.presets_ms[self.index];
        self.last_adjustment = Instant::now();
        self.adjustment_count += 1;
        self.mean_buffer.clear();

        tracing::info!(
            adjustment = self.adjustment_count,
            from_ms = old_ms,
            to_ms = self.exposure_ms,
            direction = %direction,
            "Exposure adjusted"
        );
        Some(self.exposure_ms)
    }

    /// Forces the controller to the preset nearest `exposure_ms`.
    ///
    /// Used when an external command sets exposure directly, so the
    /// controller's notion of the current preset stays consistent with the
    /// sensor. Clears the rolling buffer. Returns the snapped exposure.
    pub fn set_override(&mut self, exposure_ms: f64) -> f64 {
        self.index = nearest_preset_index(&self.presets_ms, exposure_ms);
        self.exposure_ms = self.presets_ms[self.index];
        self.mean_buffer.clear();
        tracing::info!(
            requested_ms = exposure_ms,
            preset_ms = self.exposure_ms,
            preset_index = self.index,
            "Exposure controller overridden"
        );
        self.exposure_ms
    }

    /// Returns the current exposure in milliseconds.
    pub fn exposure_ms(&self) -> f64 {
        self.exposure_ms
    }

    /// Returns the current preset index.
    pub fn preset_index(&self) -> usize {
        self.index
    }

    /// Returns the number of presets.
    pub fn preset_count(&self) -> usize {
        self.presets_ms.len()
    }

    /// Returns the number of adjustments made.
    pub fn adjustment_count(&self) -> u64 {
        self.adjustment_count
    }

    /// Returns the number of buffered brightness samples.
    pub fn sample_count(&self) -> usize {
        self.mean_buffer.len()
    }

    /// True if a higher preset exists.
    pub fn can_increase(&self) -> bool {
        self.index + 1 < self.presets_ms.len()
    }

    /// True if a lower preset exists.
    pub fn can_decrease(&self) -> bool {
        self.index > 0
    }

    /// Returns a state snapshot for status reporting.
    pub fn status(&self) -> ExposureStatus {
        ExposureStatus {
            exposure_ms: self.exposure_ms,
            preset_index: self.index,
            preset_count: self.presets_ms.len(),
            presets_ms: self.presets_ms.clone(),
            adjustment_count: self.adjustment_count,
        }
    }
}

/// Index of the preset closest to `exposure_ms` by absolute difference.
///
/// The comparison is strict, so equidistant values resolve to the lower
/// index.
fn nearest_preset_index(presets_ms: &[f64], exposure_ms: f64) -> usize {
    let mut best = 0;
    let mut best_diff = f64::INFINITY;
    for (i, &preset) in presets_ms.iter().enumerate() {
        let diff = (preset - exposure_ms).abs();
        if diff < best_diff {
            best_diff = diff;
            best = i;
        }
    }
    best
}
