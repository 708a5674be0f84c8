//! Input sources
//!
//! Keys and pointer samples reach the engine as [`InputEvent`]s through a
//! single registered callback. Sources are injected and have an explicit
//! start/stop lifecycle; nothing hooks input globally.

mod pointer;

pub use pointer::{ManualPointer, PointerPoller, PointerProbe};

use crossbeam::channel::Sender;
use std::sync::Arc;
use std::time::Instant;

use crate::error::EngineResult;
use crate::expression::PointerSample;
use crate::mapping::KeyCode;

/// One input arrival
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    /// Pointer moved or was polled
    Pointer(PointerSample),
    /// Re-anchor gesture tracking (pointer pressed) without emitting
    PointerReset(PointerSample),
}

/// Callback type for input events
pub type InputCallback = Arc<dyn Fn(InputEvent) + Send + Sync>;

/// Callback forwarding into the critical-path channel
///
/// Sends after the receiver is gone are dropped silently.
pub fn channel_callback(tx: Sender<InputEvent>) -> InputCallback {
    Arc::new(move |event| {
        let _ = tx.send(event);
    })
}

/// Source of input events with a start/stop lifecycle
pub trait InputSource {
    /// Begin delivering events to `callback`
    fn start(&mut self, callback: InputCallback) -> EngineResult<()>;

    /// Stop delivering events and release timers and listeners
    ///
    /// Returns once no further callback can run. Stopping a stopped source
    /// is a no-op.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Monotonic millisecond clock shared by all sample sources
#[derive(Debug, Clone, Copy)]
pub struct EngineClock {
    start: Instant,
}

impl EngineClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    /// Milliseconds since the clock was created
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stamp a position with the current time
    pub fn sample(&self, x: f32, y: f32) -> PointerSample {
        PointerSample::new(x, y, self.now_ms())
    }
}

impl Default for EngineClock {
    fn default() -> Self {
        Self::new()
    }
}
