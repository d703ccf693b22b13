//! Concurrency core: buffering, pacing and orchestration.
//!
//! In cooperative mode a single periodic tick runs the whole per-frame
//! pipeline. In threaded mode an [`AcquisitionWorker`] feeds a bounded
//! [`FrameBuffer`] and the tick drains it, with the buffer as the only
//! shared mutable state between the two contexts.

mod coordinator;
mod queue;
mod scheduler;
mod worker;

pub use coordinator::PipelineCoordinator;
pub use queue::FrameBuffer;
pub use scheduler::{buffer_capacity, processing_rate_hz, CaptureMode, CaptureScheduler};
pub use worker::AcquisitionWorker;
