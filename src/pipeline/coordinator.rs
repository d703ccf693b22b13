//! Per-frame pipeline orchestration.
//!
//! One coordinator instance runs the identical per-frame pipeline in both
//! capture modes: acquire, correct, compute statistics, feed the exposure
//! loop, publish. Steady-state faults (a failed capture, a failed exposure
//! write) are logged and ridden through; only startup wiring can fail hard.

use crate::capture::{lock_camera, LineFrame, SharedCamera};
use crate::exposure::ExposureController;
use crate::processing::{FrameProcessor, FrameStatistics};
use crate::publish::{ControlCommand, ExposureAdjustment, FramePublisher, FrameRecord};

/// Wires the per-frame pipeline stages together and runs them on demand.
pub struct PipelineCoordinator {
    camera: SharedCamera,
    processor: FrameProcessor,
    controller: Option<ExposureController>,
    auto_exposure_enabled: bool,
    publisher: Box<dyn FramePublisher>,
    expected_shape: [usize; 2],
    shape_warning_logged: bool,
    current_exposure_ms: f64,
}

impl PipelineCoordinator {
    /// Creates a coordinator.
    ///
    /// `controller` carries the preset table even when auto-exposure starts
    /// disabled, so a later enable command and manual exposure overrides
    /// both keep the preset index consistent with the sensor.
    pub fn new(
        camera: SharedCamera,
        processor: FrameProcessor,
        controller: Option<ExposureController>,
        auto_exposure_enabled: bool,
        publisher: Box<dyn FramePublisher>,
        expected_shape: [usize; 2],
        initial_exposure_ms: f64,
    ) -> Self {
        Self {
            camera,
            processor,
            controller,
            auto_exposure_enabled,
            publisher,
            expected_shape,
            shape_warning_logged: false,
            current_exposure_ms: initial_exposure_ms,
        }
    }

    /// Captures one frame directly from the sensor and runs the per-frame
    /// pipeline on it. Used by the cooperative tick.
    ///
    /// Returns `true` if a frame was processed this call.
    pub fn capture_and_process(&mut self) -> bool {
        let result = lock_camera(&self.camera).capture_line();
        match result {
            Ok(Some(frame)) => {
                self.process_frame(frame);
                true
            }
            Ok(None) => {
                tracing::debug!("No frame available this tick");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Capture failed");
                false
            }
        }
    }

    /// Runs the per-frame pipeline on an already-captured raw frame.
    /// Used by the threaded-mode processing tick.
    pub fn process_frame(&mut self, raw: LineFrame) {
        let corrected = self.processor.process(&raw, self.current_exposure_ms);

        let (rows, cols) = corrected.shape();
        if !self.shape_warning_logged && [rows, cols] != self.expected_shape {
            tracing::warn!(
                actual = format!("{}x{}", rows, cols),
                expected = format!("{}x{}", self.expected_shape[0], self.expected_shape[1]),
                "Corrected frame shape differs from configured output shape"
            );
            self.shape_warning_logged = true;
        }

        let statistics = FrameStatistics::analyze(corrected.samples());

        if self.auto_exposure_enabled {
            self.run_exposure_feedback(statistics.mean);
        }

        let temperature_c = lock_camera(&self.camera).temperature_c();
        self.publisher.publish_frame(FrameRecord {
            frame: corrected,
            statistics,
            exposure_ms: self.current_exposure_ms,
            temperature_c,
        });
    }

    /// Feeds one brightness mean into the exposure loop and applies any
    /// resulting adjustment to the sensor.
    fn run_exposure_feedback(&mut self, mean: f64) {
        let controller = match &mut self.controller {
            Some(c) => c,
            None => return,
        };

        controller.update_statistics(mean);
        let direction = match controller.should_adjust() {
            Some(d) => d,
            None => return,
        };
        let new_exposure_ms = match controller.adjust(direction) {
            Some(ms) => ms,
            None => return,
        };

        // A failed write is non-fatal, but the controller and sensor must
        // not disagree about the current exposure.
        match lock_camera(&self.camera).set_exposure(new_exposure_ms) {
            Ok(effective_ms) => {
                self.current_exposure_ms = effective_ms;
                let event = ExposureAdjustment {
                    direction,
                    exposure_ms: effective_ms,
                    preset_index: controller.preset_index(),
                    preset_count: controller.preset_count(),
                    trigger_mean: mean,
                };
                self.publisher.publish_adjustment(&event);
            }
            Err(e) => {
                tracing::error!(error = %e, "Exposure write failed, reverting controller");
                controller.set_override(self.current_exposure_ms);
            }
        }
    }

    /// Applies one out-of-band command.
    pub fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::SetExposure(exposure_ms) => {
                match lock_camera(&self.camera).set_exposure(exposure_ms) {
                    Ok(effective_ms) => {
                        // The sensor's effective value is what frames are
                        // integrated at; the controller only realigns its
                        // preset index to the nearest preset.
                        self.current_exposure_ms = effective_ms;
                        if let Some(controller) = &mut self.controller {
                            controller.set_override(effective_ms);
                        }
                        tracing::info!(
                            exposure_ms = self.current_exposure_ms,
                            "Exposure set by command"
                        );
                    }
                    Err(e) => tracing::error!(error = %e, "Commanded exposure write failed"),
                }
            }
            ControlCommand::EnableAutoExposure => {
                if self.controller.is_some() {
                    self.auto_exposure_enabled = true;
                    tracing::info!("Auto-exposure enabled");
                } else {
                    tracing::warn!("Auto-exposure unavailable, no controller configured");
                }
            }
            ControlCommand::DisableAutoExposure => {
                self.auto_exposure_enabled = false;
                tracing::info!("Auto-exposure disabled");
            }
            ControlCommand::QueryAutoExposure => match &self.controller {
                Some(controller) => {
                    let status = controller.status();
                    tracing::info!(
                        enabled = self.auto_exposure_enabled,
                        exposure_ms = status.exposure_ms,
                        preset = format!("{}/{}", status.preset_index + 1, status.preset_count),
                        adjustments = status.adjustment_count,
                        "Auto-exposure status"
                    );
                }
                None => tracing::info!(enabled = false, "Auto-exposure status"),
            },
        }
    }

    /// Current exposure in milliseconds.
    pub fn current_exposure_ms(&self) -> f64 {
        self.current_exposure_ms
    }

    /// Whether closed-loop exposure control is active.
    pub fn auto_exposure_enabled(&self) -> bool {
        self.auto_exposure_enabled
    }

    /// Publishes the wavelength table through the configured publisher.
    pub fn publish_wavelengths(&mut self, wavelengths: &[f32]) {
        self.publisher.publish_wavelengths(wavelengths);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CameraSettings, CropSettings, LineCamera, SimulatedCamera};
    use crate::publish::ChannelPublisher;
    use std::sync::mpsc::{self, Receiver};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn shared_camera(signal_per_ms: f64) -> SharedCamera {
        let mut camera = SimulatedCamera::new(CameraSettings {
            sensor_rows: 4,
            sensor_cols: 8,
            exposure_ms: 10.0,
            ..Default::default()
        });
        camera.set_signal_per_ms(signal_per_ms);
        camera.connect(None).unwrap();
        camera.start().unwrap();
        Arc::new(Mutex::new(Box::new(camera) as Box<dyn LineCamera>))
    }

    fn controller() -> ExposureController {
        ExposureController::new(
            vec![5.0, 10.0, 20.0],
            10.0,
            500.0,
            3000.0,
            Duration::ZERO,
            3,
        )
        .unwrap()
    }

    fn coordinator(
        camera: SharedCamera,
        controller: Option<ExposureController>,
        auto: bool,
    ) -> (
        PipelineCoordinator,
        Receiver<FrameRecord>,
        Receiver<ExposureAdjustment>,
    ) {
        let (frame_tx, frame_rx) = mpsc::channel();
        let (adj_tx, adj_rx) = mpsc::channel();
        let publisher = ChannelPublisher::new(frame_tx, Some(adj_tx));
        let processor = FrameProcessor::new(CropSettings::default(), None, 0);
        let coordinator = PipelineCoordinator::new(
            camera,
            processor,
            controller,
            auto,
            Box::new(publisher),
            [8, 4],
            10.0,
        );
        (coordinator, frame_rx, adj_rx)
    }

    #[test]
    fn test_frame_flows_to_publisher() {
        let camera = shared_camera(150.0);
        let (mut coordinator, frames, _adjustments) = coordinator(camera, None, false);

        assert!(coordinator.capture_and_process());

        let record = frames.try_recv().unwrap();
        // 4x8 raw transposes to 8x4.
        assert_eq!(record.frame.shape(), (8, 4));
        assert_eq!(record.exposure_ms, 10.0);
        assert_eq!(record.temperature_c, 35.0);
        assert!(record.statistics.mean > 0.0);
    }

    #[test]
    fn test_low_signal_closes_the_loop() {
        // 10 DN/ms at 10 ms gives means around 100, far below 500.
        let camera = shared_camera(10.0);
        let (mut coordinator, _frames, adjustments) =
            coordinator(Arc::clone(&camera), Some(controller()), true);

        // min_samples is 3 and the window is zero, so the fourth frame can
        // trigger the step from 10 ms to 20 ms.
        for _ in 0..4 {
            coordinator.capture_and_process();
        }

        let event = adjustments.try_recv().unwrap();
        assert_eq!(event.exposure_ms, 20.0);
        assert_eq!(event.preset_index, 2);
        assert!(event.trigger_mean < 500.0);
        assert_eq!(coordinator.current_exposure_ms(), 20.0);

        // New frames reflect the raised exposure: 10 DN/ms at 20 ms.
        let frame = lock_camera(&camera).capture_line().unwrap().unwrap();
        let mean = frame.samples().iter().map(|&s| s as f64).sum::<f64>()
            / frame.samples().len() as f64;
        assert!(mean > 190.0);
    }

    #[test]
    fn test_auto_exposure_disabled_never_adjusts() {
        let camera = shared_camera(10.0);
        let (mut coordinator, _frames, adjustments) =
            coordinator(camera, Some(controller()), false);

        for _ in 0..10 {
            coordinator.capture_and_process();
        }
        assert!(adjustments.try_recv().is_err());
        assert_eq!(coordinator.current_exposure_ms(), 10.0);
    }

    #[test]
    fn test_set_exposure_command_keeps_effective_value() {
        let camera = shared_camera(150.0);
        let (mut coordinator, frames, _adjustments) =
            coordinator(Arc::clone(&camera), Some(controller()), false);

        coordinator.handle_command(ControlCommand::SetExposure(18.0));

        // The sensor integrates the commanded 18 ms; only the controller's
        // preset index snaps (to the 20 ms preset).
        assert_eq!(coordinator.current_exposure_ms(), 18.0);

        // Published records carry the exposure the frame was captured at.
        coordinator.capture_and_process();
        let record = frames.try_recv().unwrap();
        assert_eq!(record.exposure_ms, 18.0);
    }

    #[test]
    fn test_adjustment_after_override_steps_from_snapped_preset() {
        // 10 DN/ms keeps means far below the 500 low threshold.
        let camera = shared_camera(10.0);
        let (mut coordinator, _frames, adjustments) =
            coordinator(camera, Some(controller()), true);

        coordinator.handle_command(ControlCommand::SetExposure(4.0));
        assert_eq!(coordinator.current_exposure_ms(), 4.0);

        // 4 ms snapped the controller's index to the 5 ms preset, so the
        // next low-signal adjustment steps to 10 ms.
        for _ in 0..4 {
            coordinator.capture_and_process();
        }
        let event = adjustments.try_recv().unwrap();
        assert_eq!(event.exposure_ms, 10.0);
        assert_eq!(event.preset_index, 1);
        assert_eq!(coordinator.current_exposure_ms(), 10.0);
    }

    #[test]
    fn test_enable_disable_commands() {
        let camera = shared_camera(150.0);
        let (mut coordinator, _frames, _adjustments) =
            coordinator(camera, Some(controller()), false);

        assert!(!coordinator.auto_exposure_enabled());
        coordinator.handle_command(ControlCommand::EnableAutoExposure);
        assert!(coordinator.auto_exposure_enabled());
        coordinator.handle_command(ControlCommand::DisableAutoExposure);
        assert!(!coordinator.auto_exposure_enabled());
    }

    #[test]
    fn test_enable_without_controller_stays_off() {
        let camera = shared_camera(150.0);
        let (mut coordinator, _frames, _adjustments) = coordinator(camera, None, false);

        coordinator.handle_command(ControlCommand::EnableAutoExposure);
        assert!(!coordinator.auto_exposure_enabled());
    }

    #[test]
    fn test_shape_warning_does_not_fail_frames() {
        let camera = shared_camera(150.0);
        let (frame_tx, frame_rx) = mpsc::channel();
        let publisher = ChannelPublisher::new(frame_tx, None);
        let processor = FrameProcessor::new(CropSettings::default(), None, 0);
        // Deliberately wrong expected shape.
        let mut coordinator = PipelineCoordinator::new(
            camera,
            processor,
            None,
            false,
            Box::new(publisher),
            [100, 100],
            10.0,
        );

        coordinator.capture_and_process();
        coordinator.capture_and_process();
        assert_eq!(frame_rx.try_iter().count(), 2);
    }
}
