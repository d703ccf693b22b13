//! Background acquisition thread.
//!
//! The worker paces captures against absolute deadlines: each iteration
//! advances the next deadline by exactly one period, so slow captures eat
//! into the following sleep instead of accumulating drift. A cycle that
//! overruns its deadline proceeds immediately; the deadline still moves
//! forward by exactly one period, so there is no catch-up burst.

use super::queue::FrameBuffer;
use crate::capture::{lock_camera, SharedCamera};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Pause after a capture error before retrying.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Drop-warning cadence: log once per this many dropped frames.
const DROP_LOG_INTERVAL: u64 = 100;

/// Dedicated capture thread feeding the frame buffer at a fixed rate.
pub struct AcquisitionWorker {
    camera: SharedCamera,
    buffer: Arc<FrameBuffer>,
    period: Duration,
    running: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
    capture_errors: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl AcquisitionWorker {
    /// Creates a worker capturing at `rate_hz` into `buffer`.
    pub fn new(camera: SharedCamera, buffer: Arc<FrameBuffer>, rate_hz: f64) -> Self {
        Self {
            camera,
            buffer,
            period: Duration::from_secs_f64(1.0 / rate_hz),
            running: Arc::new(AtomicBool::new(false)),
            frames_captured: Arc::new(AtomicU64::new(0)),
            capture_errors: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    /// Spawns the capture thread. A second call while running is a no-op.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Acquisition worker already running");
            return;
        }

        let camera = Arc::clone(&self.camera);
        let buffer = Arc::clone(&self.buffer);
        let period = self.period;
        let running = Arc::clone(&self.running);
        let frames_captured = Arc::clone(&self.frames_captured);
        let capture_errors = Arc::clone(&self.capture_errors);

        tracing::info!(
            rate_hz = 1.0 / period.as_secs_f64(),
            "Starting acquisition worker"
        );
        self.handle = Some(thread::spawn(move || {
            capture_loop(
                camera,
                buffer,
                period,
                running,
                frames_captured,
                capture_errors,
            );
        }));
    }

    /// Signals the thread to stop and joins it. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Acquisition worker thread panicked");
            }
            tracing::info!(
                frames = self.frames_captured.load(Ordering::Relaxed),
                errors = self.capture_errors.load(Ordering::Relaxed),
                dropped = self.buffer.dropped_count(),
                "Acquisition worker stopped"
            );
        }
    }

    /// Whether the capture thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frames captured since start.
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    /// Capture errors since start.
    pub fn capture_errors(&self) -> u64 {
        self.capture_errors.load(Ordering::Relaxed)
    }
}

impl Drop for AcquisitionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    camera: SharedCamera,
    buffer: Arc<FrameBuffer>,
    period: Duration,
    running: Arc<AtomicBool>,
    frames_captured: Arc<AtomicU64>,
    capture_errors: Arc<AtomicU64>,
) {
    let mut next_deadline = Instant::now() + period;

    while running.load(Ordering::SeqCst) {
        let result = lock_camera(&camera).capture_line();
        match result {
            Ok(Some(frame)) => {
                frames_captured.fetch_add(1, Ordering::Relaxed);
                if !buffer.put(frame) {
                    let dropped = buffer.dropped_count();
                    if dropped % DROP_LOG_INTERVAL == 0 {
                        tracing::warn!(dropped, "Frame buffer full, dropping oldest frames");
                    }
                }
            }
            Ok(None) => {
                capture_errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("No frame available this cycle");
            }
            Err(e) => {
                capture_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Capture failed, backing off");
                thread::sleep(ERROR_BACKOFF);
            }
        }

        let now = Instant::now();
        if next_deadline > now {
            thread::sleep(next_deadline - now);
        }
        next_deadline += period;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CameraSettings, LineCamera, SimulatedCamera};
    use std::sync::Mutex;

    fn shared_camera() -> SharedCamera {
        let mut camera = SimulatedCamera::new(CameraSettings {
            sensor_rows: 2,
            sensor_cols: 4,
            ..Default::default()
        });
        camera.connect(None).unwrap();
        camera.start().unwrap();
        Arc::new(Mutex::new(Box::new(camera) as Box<dyn LineCamera>))
    }

    #[test]
    fn test_worker_captures_at_rate() {
        let buffer = Arc::new(FrameBuffer::new(1000));
        let mut worker = AcquisitionWorker::new(shared_camera(), Arc::clone(&buffer), 200.0);

        worker.start();
        thread::sleep(Duration::from_millis(300));
        worker.stop();

        // 200 Hz over 300 ms is 60 frames; allow generous scheduler slack
        // but catch both a stalled loop and an unpaced one.
        let captured = worker.frames_captured();
        assert!(captured >= 30, "captured only {captured} frames");
        assert!(captured <= 75, "captured {captured} frames, pacing broken");
        assert_eq!(worker.capture_errors(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let buffer = Arc::new(FrameBuffer::new(4));
        let mut worker = AcquisitionWorker::new(shared_camera(), buffer, 100.0);

        worker.start();
        worker.stop();
        worker.stop();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_double_start_is_noop() {
        let buffer = Arc::new(FrameBuffer::new(4));
        let mut worker = AcquisitionWorker::new(shared_camera(), Arc::clone(&buffer), 100.0);

        worker.start();
        worker.start();
        thread::sleep(Duration::from_millis(50));
        worker.stop();
        assert!(worker.frames_captured() > 0);
    }

    #[test]
    fn test_full_buffer_drops_oldest() {
        let buffer = Arc::new(FrameBuffer::new(2));
        let mut worker = AcquisitionWorker::new(shared_camera(), Arc::clone(&buffer), 500.0);

        worker.start();
        thread::sleep(Duration::from_millis(100));
        worker.stop();

        assert!(buffer.dropped_count() > 0);
        assert_eq!(buffer.len(), 2);
        // Surviving frames are the newest captured.
        let first = buffer.get(None).unwrap();
        assert_eq!(first.sequence(), worker.frames_captured() - 1);
    }
}
