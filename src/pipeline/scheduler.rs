//! Capture-mode selection and the top-level scheduling loops.
//!
//! The mode is decided once at startup from the requested capture rate and
//! never changes. Below the cutoff the whole per-frame pipeline runs
//! inline in one periodic tick; at or above it, capture moves to a
//! dedicated thread and the tick becomes a consumer that oversamples the
//! producer so draining never becomes the bottleneck.

use super::coordinator::PipelineCoordinator;
use super::queue::FrameBuffer;
use super::worker::AcquisitionWorker;
use crate::capture::{SharedCamera, MODE_CUTOFF_HZ};
use crate::publish::ControlCommand;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Consumer tick runs this much faster than the capture rate in threaded
/// mode.
const CONSUMER_OVERSAMPLE: f64 = 1.1;

/// Threaded-mode buffer holds roughly this many seconds of frames.
const BUFFER_SECONDS: f64 = 0.5;

/// Hard cap on the threaded-mode buffer capacity.
const BUFFER_MAX_FRAMES: usize = 50;

/// Near-zero timeout for the consumer-side drain.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Wavelength table republish interval.
const WAVELENGTH_INTERVAL: Duration = Duration::from_secs(1);

/// Operating regime, fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Capture and processing share one periodic tick.
    Cooperative,
    /// Capture runs on a dedicated thread behind a bounded buffer.
    Threaded,
}

impl CaptureMode {
    /// Selects the mode for a requested capture rate.
    pub fn select(rate_hz: f64) -> Self {
        if rate_hz < MODE_CUTOFF_HZ {
            Self::Cooperative
        } else {
            Self::Threaded
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cooperative => write!(f, "cooperative"),
            Self::Threaded => write!(f, "threaded"),
        }
    }
}

/// Consumer tick rate for a given capture rate in threaded mode.
pub fn processing_rate_hz(capture_rate_hz: f64) -> f64 {
    capture_rate_hz * CONSUMER_OVERSAMPLE
}

/// Threaded-mode buffer capacity for a given capture rate.
pub fn buffer_capacity(capture_rate_hz: f64) -> usize {
    ((capture_rate_hz * BUFFER_SECONDS) as usize).clamp(1, BUFFER_MAX_FRAMES)
}

/// Runs the selected capture regime until shutdown is requested.
pub struct CaptureScheduler {
    camera: SharedCamera,
    coordinator: PipelineCoordinator,
    rate_hz: f64,
    mode: CaptureMode,
    commands: Option<Receiver<ControlCommand>>,
    wavelengths: Vec<f32>,
}

impl CaptureScheduler {
    /// Creates a scheduler, deciding the capture mode from `rate_hz`.
    pub fn new(
        camera: SharedCamera,
        coordinator: PipelineCoordinator,
        rate_hz: f64,
        commands: Option<Receiver<ControlCommand>>,
        wavelengths: Vec<f32>,
    ) -> Self {
        let mode = CaptureMode::select(rate_hz);
        tracing::info!(rate_hz, mode = %mode, "Capture mode selected");
        Self {
            camera,
            coordinator,
            rate_hz,
            mode,
            commands,
            wavelengths,
        }
    }

    /// The selected capture mode.
    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Runs the pipeline until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        match self.mode {
            CaptureMode::Cooperative => self.run_cooperative(shutdown),
            CaptureMode::Threaded => self.run_threaded(shutdown),
        }
        tracing::info!("Capture scheduler exited");
    }

    fn run_cooperative(&mut self, shutdown: &AtomicBool) {
        let period = Duration::from_secs_f64(1.0 / self.rate_hz);
        let mut next_deadline = Instant::now() + period;
        let mut next_wavelengths = Instant::now();

        while !shutdown.load(Ordering::SeqCst) {
            self.drain_commands();
            self.coordinator.capture_and_process();
            next_wavelengths = self.maybe_publish_wavelengths(next_wavelengths);

            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
            }
            next_deadline += period;
        }
    }

    fn run_threaded(&mut self, shutdown: &AtomicBool) {
        let buffer = Arc::new(FrameBuffer::new(buffer_capacity(self.rate_hz)));
        let mut worker =
            AcquisitionWorker::new(Arc::clone(&self.camera), Arc::clone(&buffer), self.rate_hz);
        worker.start();

        let period = Duration::from_secs_f64(1.0 / processing_rate_hz(self.rate_hz));
        let mut next_deadline = Instant::now() + period;
        let mut next_wavelengths = Instant::now();

        while !shutdown.load(Ordering::SeqCst) {
            self.drain_commands();
            if let Some(frame) = buffer.get(Some(DRAIN_TIMEOUT)) {
                self.coordinator.process_frame(frame);
            }
            next_wavelengths = self.maybe_publish_wavelengths(next_wavelengths);

            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
            }
            next_deadline += period;
        }

        worker.stop();
    }

    /// Applies every pending command. Commands arrive rarely; the channel
    /// is drained fully each tick so none waits a full period.
    fn drain_commands(&mut self) {
        if let Some(commands) = &self.commands {
            // Collect first so the borrow on the receiver ends before the
            // coordinator (also behind &mut self) handles anything.
            let pending: Vec<ControlCommand> = commands.try_iter().collect();
            for command in pending {
                self.coordinator.handle_command(command);
            }
        }
    }

    fn maybe_publish_wavelengths(&mut self, due: Instant) -> Instant {
        if self.wavelengths.is_empty() || Instant::now() < due {
            return due;
        }
        let wavelengths = std::mem::take(&mut self.wavelengths);
        self.coordinator.publish_wavelengths(&wavelengths);
        self.wavelengths = wavelengths;
        Instant::now() + WAVELENGTH_INTERVAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CameraSettings, CropSettings, LineCamera, SimulatedCamera};
    use crate::processing::FrameProcessor;
    use crate::publish::{ChannelPublisher, FrameRecord};
    use std::sync::mpsc::{self, Receiver};
    use std::sync::Mutex;

    #[test]
    fn test_mode_cutoff() {
        assert_eq!(CaptureMode::select(10.0), CaptureMode::Cooperative);
        assert_eq!(CaptureMode::select(49.9), CaptureMode::Cooperative);
        assert_eq!(CaptureMode::select(50.0), CaptureMode::Threaded);
        assert_eq!(CaptureMode::select(60.0), CaptureMode::Threaded);
    }

    #[test]
    fn test_processing_rate_oversamples() {
        assert!((processing_rate_hz(60.0) - 66.0).abs() < 1e-9);
    }

    #[test]
    fn test_buffer_capacity_clamped() {
        assert_eq!(buffer_capacity(1.0), 1);
        assert_eq!(buffer_capacity(60.0), 30);
        assert_eq!(buffer_capacity(500.0), 50);
    }

    fn scheduler(rate_hz: f64) -> (CaptureScheduler, Receiver<FrameRecord>) {
        let mut camera = SimulatedCamera::new(CameraSettings {
            sensor_rows: 2,
            sensor_cols: 4,
            ..Default::default()
        });
        camera.connect(None).unwrap();
        camera.start().unwrap();
        let camera: SharedCamera = Arc::new(Mutex::new(Box::new(camera) as Box<dyn LineCamera>));

        let (frame_tx, frame_rx) = mpsc::channel();
        let coordinator = PipelineCoordinator::new(
            Arc::clone(&camera),
            FrameProcessor::new(CropSettings::default(), None, 0),
            None,
            false,
            Box::new(ChannelPublisher::new(frame_tx, None)),
            [4, 2],
            10.0,
        );
        (
            CaptureScheduler::new(camera, coordinator, rate_hz, None, vec![]),
            frame_rx,
        )
    }

    fn run_briefly(mut scheduler: CaptureScheduler, duration: Duration) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || scheduler.run(&flag));
        thread::sleep(duration);
        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap();
    }

    #[test]
    fn test_cooperative_mode_delivers_frames() {
        let (scheduler, frames) = scheduler(40.0);
        assert_eq!(scheduler.mode(), CaptureMode::Cooperative);

        run_briefly(scheduler, Duration::from_millis(250));

        // 40 Hz over 250 ms is 10 frames; allow scheduler slack.
        let count = frames.try_iter().count();
        assert!(count >= 5, "only {count} frames delivered");
        assert!(count <= 13, "{count} frames, tick unpaced");
    }

    #[test]
    fn test_threaded_mode_delivers_frames() {
        let (scheduler, frames) = scheduler(100.0);
        assert_eq!(scheduler.mode(), CaptureMode::Threaded);

        run_briefly(scheduler, Duration::from_millis(250));

        let count = frames.try_iter().count();
        assert!(count >= 10, "only {count} frames delivered");
    }

    #[test]
    fn test_commands_reach_coordinator() {
        let (mut base, _frames) = scheduler(40.0);
        let (command_tx, command_rx) = mpsc::channel();
        base.commands = Some(command_rx);

        command_tx.send(ControlCommand::SetExposure(42.0)).unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || {
            base.run(&flag);
            base
        });
        thread::sleep(Duration::from_millis(100));
        shutdown.store(true, Ordering::SeqCst);
        let scheduler = handle.join().unwrap();

        // No controller configured, so the raw value sticks unsnapped.
        assert_eq!(scheduler.coordinator.current_exposure_ms(), 42.0);
    }
}
