//! Downstream boundary: frame publishing and command intake.
//!
//! Delivery is fire-and-forget; the core never waits on a consumer. The
//! [`ChannelPublisher`] hands records to an embedding application (or a
//! test) over std mpsc channels, while [`LogPublisher`] is the default
//! sink for the standalone binary.

use crate::capture::LineFrame;
use crate::exposure::Direction;
use crate::processing::FrameStatistics;
use std::sync::mpsc::Sender;

/// Everything published with one corrected frame.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Corrected frame (capture timestamp rides inside).
    pub frame: LineFrame,
    /// Brightness statistics over the corrected frame.
    pub statistics: FrameStatistics,
    /// Exposure in effect when the frame was captured, in milliseconds.
    pub exposure_ms: f64,
    /// Sensor temperature in degrees Celsius.
    pub temperature_c: f64,
}

/// Structured notification emitted for every exposure adjustment.
#[derive(Debug, Clone)]
pub struct ExposureAdjustment {
    /// Direction the exposure moved.
    pub direction: Direction,
    /// New exposure in milliseconds.
    pub exposure_ms: f64,
    /// New preset index (0-based).
    pub preset_index: usize,
    /// Total preset count.
    pub preset_count: usize,
    /// Rolling mean that triggered the adjustment.
    pub trigger_mean: f64,
}

/// Out-of-band commands accepted by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Set exposure to an explicit value in milliseconds.
    SetExposure(f64),
    /// Enable closed-loop exposure control.
    EnableAutoExposure,
    /// Disable closed-loop exposure control.
    DisableAutoExposure,
    /// Log the current exposure-control status.
    QueryAutoExposure,
}

/// One-way push interface for corrected frames and status events.
pub trait FramePublisher: Send {
    /// Publishes one corrected frame with its metadata.
    fn publish_frame(&mut self, record: FrameRecord);

    /// Publishes an exposure adjustment notification.
    fn publish_adjustment(&mut self, event: &ExposureAdjustment);

    /// Publishes the wavelength calibration table.
    fn publish_wavelengths(&mut self, wavelengths: &[f32]);
}

/// Publisher that reports through the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogPublisher {
    published: u64,
}

impl LogPublisher {
    /// Creates a log-backed publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of frames published.
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl FramePublisher for LogPublisher {
    fn publish_frame(&mut self, record: FrameRecord) {
        self.published += 1;
        tracing::debug!(
            sequence = record.frame.sequence(),
            shape = format!("{}x{}", record.frame.rows(), record.frame.cols()),
            mean = record.statistics.mean,
            variance = record.statistics.variance,
            median = record.statistics.median,
            exposure_ms = record.exposure_ms,
            temperature_c = record.temperature_c,
            "Frame published"
        );
    }

    fn publish_adjustment(&mut self, event: &ExposureAdjustment) {
        tracing::info!(
            direction = %event.direction,
            exposure_ms = event.exposure_ms,
            preset = format!("{}/{}", event.preset_index + 1, event.preset_count),
            mean = event.trigger_mean,
            "Exposure adjustment published"
        );
    }

    fn publish_wavelengths(&mut self, wavelengths: &[f32]) {
        tracing::debug!(bands = wavelengths.len(), "Wavelength table published");
    }
}

/// Publisher that forwards records over std mpsc channels.
///
/// Send failures mean the consumer is gone; they are noted at trace level
/// and otherwise ignored, preserving fire-and-forget semantics.
pub struct ChannelPublisher {
    frames: Sender<FrameRecord>,
    adjustments: Option<Sender<ExposureAdjustment>>,
}

impl ChannelPublisher {
    /// Creates a channel publisher delivering frames (and, optionally,
    /// adjustment events) to the given senders.
    pub fn new(frames: Sender<FrameRecord>, adjustments: Option<Sender<ExposureAdjustment>>) -> Self {
        Self {
            frames,
            adjustments,
        }
    }
}

impl FramePublisher for ChannelPublisher {
    fn publish_frame(&mut self, record: FrameRecord) {
        if self.frames.send(record).is_err() {
            tracing::trace!("Frame consumer disconnected");
        }
    }

    fn publish_adjustment(&mut self, event: &ExposureAdjustment) {
        if let Some(sender) = &self.adjustments {
            if sender.send(event.clone()).is_err() {
                tracing::trace!("Adjustment consumer disconnected");
            }
        }
    }

    fn publish_wavelengths(&mut self, _wavelengths: &[f32]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::epoch_seconds;
    use std::sync::mpsc;

    fn record() -> FrameRecord {
        FrameRecord {
            frame: LineFrame::new(vec![1, 2, 3, 4], 2, 2, epoch_seconds(), 1),
            statistics: FrameStatistics::analyze(&[1, 2, 3, 4]),
            exposure_ms: 10.0,
            temperature_c: 35.0,
        }
    }

    #[test]
    fn test_channel_publisher_delivers() {
        let (tx, rx) = mpsc::channel();
        let mut publisher = ChannelPublisher::new(tx, None);

        publisher.publish_frame(record());

        let received = rx.recv().unwrap();
        assert_eq!(received.frame.sequence(), 1);
        assert_eq!(received.statistics.mean, 2.5);
    }

    #[test]
    fn test_channel_publisher_survives_disconnect() {
        let (tx, rx) = mpsc::channel();
        let mut publisher = ChannelPublisher::new(tx, None);
        drop(rx);

        // Must not panic or error: delivery is fire-and-forget.
        publisher.publish_frame(record());
    }

    #[test]
    fn test_log_publisher_counts() {
        let mut publisher = LogPublisher::new();
        publisher.publish_frame(record());
        publisher.publish_frame(record());
        assert_eq!(publisher.published(), 2);
    }
}
