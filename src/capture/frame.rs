//! Line frame type: one captured sensor row (or thin strip) with metadata.

use chrono::Utc;

/// Returns the current wall-clock time as epoch seconds.
///
/// Capture timestamps are strictly positive floating-point seconds so they
/// can ride alongside the frame through the queue and out to publishers.
pub fn epoch_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 * 1e-6
}

/// A single line-scan frame captured from the sensor.
///
/// Samples are stored row-major as 16-bit digital numbers. The frame is
/// owned exclusively by whichever pipeline stage currently holds it; it is
/// never shared across threads.
#[derive(Clone)]
pub struct LineFrame {
    /// Raw samples, row-major, `rows * cols` entries.
    samples: Vec<u16>,
    /// Number of rows in the sample grid.
    rows: usize,
    /// Number of columns in the sample grid.
    cols: usize,
    /// Capture timestamp in epoch seconds (strictly positive).
    timestamp: f64,
    /// Monotonic capture sequence number.
    sequence: u64,
}

impl LineFrame {
    /// Creates a new frame from raw samples.
    pub fn new(samples: Vec<u16>, rows: usize, cols: usize, timestamp: f64, sequence: u64) -> Self {
        Self {
            samples,
            rows,
            cols,
            timestamp,
            sequence,
        }
    }

    /// Returns a reference to the raw samples.
    #[inline]
    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    /// Returns the number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns the frame shape as `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Returns the capture timestamp in epoch seconds.
    #[inline]
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Returns the capture sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the sample at `(row, col)`, or `None` if out of bounds.
    #[inline]
    pub fn sample(&self, row: usize, col: usize) -> Option<u16> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.samples.get(row * self.cols + col).copied()
    }

    /// Validates that the sample buffer matches the declared dimensions
    /// and that the timestamp is strictly positive.
    pub fn is_valid(&self) -> bool {
        self.samples.len() == self.rows * self.cols && self.timestamp > 0.0
    }
}

impl std::fmt::Debug for LineFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineFrame")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("timestamp", &self.timestamp)
            .field("sequence", &self.sequence)
            .finish()
    }
}
