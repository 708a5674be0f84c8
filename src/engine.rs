//! Engine wiring and the critical-path thread
//!
//! [`Engine::handle`] is the single entry point for every input, whatever
//! its source. The critical path runs on one dedicated thread fed by a
//! crossbeam channel, so inputs are processed sequentially without locks;
//! its only shared touch point is the dispatch queue.

use crossbeam::channel::{bounded, select, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::dispatch::{DispatchOutcome, DispatchQueue, EventDispatcher};
use crate::error::{EngineError, EngineResult};
use crate::expression::{GestureController, PointerSample};
use crate::input::InputEvent;
use crate::mapping::KeyMappingSet;
use crate::midi::cc;
use crate::observer::ObservedEvent;
use crate::output::MidiSink;

/// Key dispatcher plus bellows gesture
pub struct Engine<S: MidiSink> {
    dispatcher: EventDispatcher<S>,
    gesture: GestureController,
    speed_cc: u8,
}

impl<S: MidiSink> Engine<S> {
    pub fn new(config: &AppConfig, sink: S, queue: Arc<DispatchQueue<ObservedEvent>>) -> Self {
        let mapping = KeyMappingSet::build_with_policy(config.keyboard.base_note, config.keyboard.range_policy);

        info!(
            "Engine ready: {} keys, base note {}, channel {}, sink '{}'",
            mapping.len(),
            mapping.base_note(),
            config.midi.channel,
            sink.name()
        );

        Self {
            dispatcher: EventDispatcher::new(mapping, config.midi.wire_channel(), sink, queue),
            gesture: GestureController::new(config.expression.clone()),
            speed_cc: config.expression.speed_controller.cc(),
        }
    }

    pub fn dispatcher(&self) -> &EventDispatcher<S> {
        &self.dispatcher
    }

    pub fn gesture(&self) -> &GestureController {
        &self.gesture
    }

    /// Process one input
    pub fn handle(&mut self, event: InputEvent) -> DispatchOutcome {
        match event {
            InputEvent::KeyDown(key) => {
                let velocity = self.gesture.current_note_velocity();
                self.dispatcher.key_down(key, velocity)
            }
            InputEvent::KeyUp(key) => self.dispatcher.key_up(key),
            InputEvent::Pointer(sample) => self.on_pointer(sample),
            InputEvent::PointerReset(sample) => {
                self.gesture.reset_tracking(sample);
                DispatchOutcome::Ignored
            }
        }
    }

    fn on_pointer(&mut self, sample: PointerSample) -> DispatchOutcome {
        let update = self.gesture.on_sample(sample);
        let mut outcome = DispatchOutcome::Ignored;

        if let Some(value) = update.speed {
            outcome = outcome.merge(self.dispatcher.send_control(self.speed_cc, value));
        }
        if let Some(value) = update.position {
            outcome = outcome.merge(self.dispatcher.send_control(cc::EXPRESSION, value));
        }
        if update.direction_changed {
            let velocity = self.gesture.current_note_velocity();
            outcome = outcome.merge(self.dispatcher.retrigger_held(velocity));
        }

        outcome
    }

    /// Release every held note
    pub fn shutdown(&mut self) -> DispatchOutcome {
        let held = self.dispatcher.held_keys().len();
        let outcome = self.dispatcher.release_all();
        if held > 0 {
            info!("Released {} held key(s) on shutdown", held);
        }
        outcome
    }
}

/// Handle to the running critical-path thread
pub struct CriticalPath<S: MidiSink + 'static> {
    shutdown_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<Engine<S>>>,
}

impl<S: MidiSink + 'static> CriticalPath<S> {
    /// Stop after processing already-queued inputs and releasing held
    /// notes; returns the engine. `None` if already stopped.
    pub fn stop(&mut self) -> Option<Engine<S>> {
        self.shutdown_tx.take();
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(engine) => Some(engine),
            Err(_) => {
                warn!("Critical path thread panicked");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl<S: MidiSink + 'static> Drop for CriticalPath<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run `engine` on a dedicated thread, processing `inputs` in arrival order
pub fn spawn_critical_path<S: MidiSink + 'static>(
    mut engine: Engine<S>,
    inputs: Receiver<InputEvent>,
) -> EngineResult<CriticalPath<S>> {
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

    let handle = std::thread::Builder::new()
        .name("critical-path".to_string())
        .spawn(move || {
            debug!("Critical path started");
            loop {
                select! {
                    recv(inputs) -> event => match event {
                        Ok(event) => {
                            engine.handle(event);
                        }
                        Err(_) => break,
                    },
                    recv(shutdown_rx) -> _ => {
                        for event in inputs.try_iter() {
                            engine.handle(event);
                        }
                        break;
                    }
                }
            }
            engine.shutdown();
            debug!("Critical path stopped");
            engine
        })
        .map_err(|e| EngineError::Input(format!("failed to start critical path: {}", e)))?;

    Ok(CriticalPath {
        shutdown_tx: Some(shutdown_tx),
        handle: Some(handle),
    })
}
