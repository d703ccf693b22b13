//! Line-Scan Acquisition Pipeline
//!
//! Acquires single-line images from a line-scan sensor at a configurable
//! rate and forwards them, with derived brightness statistics and an
//! adaptively controlled exposure value, to a downstream consumer.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! capture → processing → statistics → publish
//!    ↑                        ↓
//!    └──── exposure feedback ─┘
//! ```
//!
//! Two operating regimes exist, selected once at startup from the capture
//! rate. Below 50 Hz the whole per-frame pipeline runs inline in one
//! periodic tick (cooperative mode). At or above 50 Hz, capture moves to a
//! dedicated thread behind a bounded drop-oldest buffer so sensor timing
//! cannot be perturbed by downstream work (threaded mode).
//!
//! # Design Principles
//!
//! - **Freshness over completeness**: the handoff buffer drops the oldest
//!   frame under backpressure rather than stalling the producer
//! - **Discrete exposure**: exposure steps through hardware presets to
//!   avoid oscillation around a continuous threshold
//! - **Steady-state faults are survivable**: a failed capture or exposure
//!   write is logged and counted, never fatal; only startup can abort
//!
//! # Example
//!
//! ```no_run
//! use linescan_pipeline::{
//!     capture::{create_camera, CameraSettings, CropSettings, LineCamera},
//!     pipeline::PipelineCoordinator,
//!     processing::FrameProcessor,
//!     publish::LogPublisher,
//! };
//! use std::sync::{Arc, Mutex};
//!
//! let settings = CameraSettings::default();
//! let mut camera = create_camera(&settings).unwrap();
//! camera.connect(None).unwrap();
//! camera.configure().unwrap();
//! camera.start().unwrap();
//!
//! let camera = Arc::new(Mutex::new(camera));
//! let processor = FrameProcessor::new(CropSettings::default(), None, 0);
//! let mut coordinator = PipelineCoordinator::new(
//!     camera,
//!     processor,
//!     None,
//!     false,
//!     Box::new(LogPublisher::new()),
//!     settings.expected_shape,
//!     settings.exposure_ms,
//! );
//!
//! for _ in 0..10 {
//!     coordinator.capture_and_process();
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod exposure;
pub mod pipeline;
pub mod processing;
pub mod publish;

// Re-export commonly used types at crate root
pub use capture::{create_camera, CameraError, LineCamera, LineFrame, PipelineConfig};
pub use exposure::{Direction, ExposureController};
pub use pipeline::{CaptureMode, CaptureScheduler, FrameBuffer, PipelineCoordinator};
pub use processing::{FrameProcessor, FrameStatistics};
pub use publish::{ControlCommand, FramePublisher, FrameRecord};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
