//! Bounded frame buffer between acquisition and processing.
//!
//! The buffer favors freshness over completeness: when full, the oldest
//! frame is evicted to make room for the newest one. A dropped-frame
//! counter tracks the cumulative cost of that policy. Both the eviction
//! and the insertion happen under a single lock so the counter can never
//! disagree with the queue contents.

use crate::capture::LineFrame;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct State {
    frames: VecDeque<LineFrame>,
    dropped: u64,
}

/// Bounded drop-oldest buffer handing frames from the acquisition thread
/// to the processing loop.
pub struct FrameBuffer {
    state: Mutex<State>,
    available: Condvar,
    capacity: usize,
}

impl FrameBuffer {
    /// Creates a buffer holding at most `capacity` frames.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "frame buffer capacity must be non-zero");
        Self {
            state: Mutex::new(State {
                frames: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves the queue structurally
        // intact, so recover rather than cascade.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts a frame, evicting the oldest one if the buffer is full.
    ///
    /// Returns `true` if the frame was appended with room to spare, or
    /// `false` if an older frame had to be dropped to make room. The
    /// caller is never blocked either way.
    pub fn put(&self, frame: LineFrame) -> bool {
        let mut state = self.lock();
        let mut accepted = true;
        if state.frames.len() >= self.capacity {
            state.frames.pop_front();
            state.dropped += 1;
            accepted = false;
        }
        state.frames.push_back(frame);
        drop(state);
        self.available.notify_one();
        accepted
    }

    /// Removes and returns the oldest buffered frame.
    ///
    /// With a timeout, blocks until a frame arrives or the deadline
    /// passes, returning `None` on expiry. Without one, blocks
    /// indefinitely until a frame is available.
    pub fn get(&self, timeout: Option<Duration>) -> Option<LineFrame> {
        let mut state = self.lock();
        match timeout {
            None => loop {
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                state = self
                    .available
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner());
            },
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(frame) = state.frames.pop_front() {
                        return Some(frame);
                    }
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return None;
                    }
                    state = self
                        .available
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                }
            }
        }
    }

    /// Number of frames currently buffered.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cumulative count of frames evicted by the drop-oldest policy.
    pub fn dropped_count(&self) -> u64 {
        self.lock().dropped
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discards all buffered frames, returning how many were removed.
    ///
    /// Cleared frames do not count as dropped; this is used after an
    /// exposure change to discard frames captured at the old setting.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let removed = state.frames.len();
        state.frames.clear();
        removed
    }
}
