//! Fixed-rate pointer polling
//!
//! Polling is just another sample source: each tick reads the probe and
//! delivers an `InputEvent::Pointer`, including when the pointer has not
//! moved, so idle decay runs at the poll cadence.

use crossbeam::channel::{bounded, select, tick, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

use super::{EngineClock, InputCallback, InputEvent, InputSource};
use crate::error::{EngineError, EngineResult};
use crate::expression::{Point, PointerSample};

/// Reads the current pointer position
pub trait PointerProbe: Send + Sync {
    /// `None` while the position is unknown (e.g. outside the tracked area)
    fn position(&self) -> Option<Point>;
}

/// Probe whose position is set by hand (terminal input, tests)
#[derive(Debug, Clone, Default)]
pub struct ManualPointer {
    position: Arc<Mutex<Option<Point>>>,
}

impl ManualPointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, x: f32, y: f32) {
        *self.position.lock() = Some(Point::new(x, y));
    }

    pub fn clear(&self) {
        *self.position.lock() = None;
    }
}

impl PointerProbe for ManualPointer {
    fn position(&self) -> Option<Point> {
        *self.position.lock()
    }
}

/// Polls a [`PointerProbe`] on a dedicated thread
pub struct PointerPoller {
    probe: Arc<dyn PointerProbe>,
    clock: EngineClock,
    period: Duration,
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PointerPoller {
    pub fn new(probe: Arc<dyn PointerProbe>, clock: EngineClock, poll_hz: u32) -> Self {
        Self {
            probe,
            clock,
            period: Duration::from_secs_f64(1.0 / poll_hz.max(1) as f64),
            shutdown_tx: None,
            handle: None,
        }
    }
}

impl InputSource for PointerPoller {
    fn start(&mut self, callback: InputCallback) -> EngineResult<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let ticker = tick(self.period);
        let probe = self.probe.clone();
        let clock = self.clock;

        let handle = std::thread::Builder::new()
            .name("pointer-poller".to_string())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        if let Some(position) = probe.position() {
                            let sample = PointerSample { position, timestamp_ms: clock.now_ms() };
                            callback(InputEvent::Pointer(sample));
                        }
                    }
                    recv(shutdown_rx) -> _ => break,
                }
            })
            .map_err(|e| EngineError::Input(format!("failed to start pointer poller: {}", e)))?;

        info!("Pointer polling started ({:?} period)", self.period);
        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the sender disconnects the shutdown channel
        self.shutdown_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!("Pointer polling stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PointerPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
