//! Event dispatcher: key transitions to note bursts
//!
//! Every accepted transition is sent to the sink first, as one contiguous
//! burst in ascending note order, and only then handed to the dispatch
//! queue for observation. Send failures are counted and logged; nothing is
//! retried and no error leaves this module.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::queue::DispatchQueue;
use crate::error::EngineError;
use crate::mapping::{KeyCode, KeyMappingSet};
use crate::midi::MidiMessage;
use crate::observer::ObservedEvent;
use crate::output::MidiSink;

/// Keys currently down, in press order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldKeySet {
    keys: Vec<KeyCode>,
}

impl HeldKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when `key` is already held (key repeat)
    pub fn insert(&mut self, key: KeyCode) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }

    /// Returns false when `key` was not held
    pub fn remove(&mut self, key: KeyCode) -> bool {
        match self.keys.iter().position(|k| *k == key) {
            Some(index) => {
                self.keys.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyCode> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Result of handling one input transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Transition rejected: repeat press, or release of a key not held
    Ignored,
    /// Transition accepted but the key has no mapping
    Unmapped,
    /// Messages handed to the sink
    Emitted { delivered: usize, failed: usize },
}

impl DispatchOutcome {
    pub fn delivered(&self) -> usize {
        match self {
            DispatchOutcome::Emitted { delivered, .. } => *delivered,
            _ => 0,
        }
    }

    pub fn failed(&self) -> usize {
        match self {
            DispatchOutcome::Emitted { failed, .. } => *failed,
            _ => 0,
        }
    }

    /// Combine outcomes of several bursts
    pub fn merge(self, other: DispatchOutcome) -> DispatchOutcome {
        match (self, other) {
            (
                DispatchOutcome::Emitted { delivered: a, failed: b },
                DispatchOutcome::Emitted { delivered: c, failed: d },
            ) => DispatchOutcome::Emitted {
                delivered: a + c,
                failed: b + d,
            },
            (DispatchOutcome::Emitted { .. }, _) => self,
            (_, emitted @ DispatchOutcome::Emitted { .. }) => emitted,
            (DispatchOutcome::Unmapped, _) | (_, DispatchOutcome::Unmapped) => DispatchOutcome::Unmapped,
            _ => DispatchOutcome::Ignored,
        }
    }
}

/// Burst accumulator, flushed to the queue once the burst is on the wire
pub(super) struct Burst {
    pub(super) sent: Vec<(MidiMessage, bool)>,
}

impl Burst {
    pub(super) fn with_capacity(capacity: usize) -> Self {
        Self {
            sent: Vec::with_capacity(capacity),
        }
    }

    pub(super) fn outcome(&self) -> DispatchOutcome {
        let delivered = self.sent.iter().filter(|(_, ok)| *ok).count();
        DispatchOutcome::Emitted {
            delivered,
            failed: self.sent.len() - delivered,
        }
    }
}

/// Critical-path key handler
pub struct EventDispatcher<S: MidiSink> {
    pub(super) mapping: KeyMappingSet,
    pub(super) held: HeldKeySet,
    pub(super) channel: u8,
    pub(super) sink: S,
    queue: Arc<DispatchQueue<ObservedEvent>>,
    transport_warned: bool,
}

impl<S: MidiSink> EventDispatcher<S> {
    /// `channel` is 0-based
    pub fn new(mapping: KeyMappingSet, channel: u8, sink: S, queue: Arc<DispatchQueue<ObservedEvent>>) -> Self {
        Self {
            mapping,
            held: HeldKeySet::new(),
            channel: channel & 0x0F,
            sink,
            queue,
            transport_warned: false,
        }
    }

    pub fn mapping(&self) -> &KeyMappingSet {
        &self.mapping
    }

    /// Swap the whole table; held keys are released against the old one first
    pub fn replace_mapping(&mut self, mapping: KeyMappingSet) -> DispatchOutcome {
        let outcome = self.release_all();
        self.mapping = mapping;
        outcome
    }

    pub fn held_keys(&self) -> &HeldKeySet {
        &self.held
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn queue(&self) -> &Arc<DispatchQueue<ObservedEvent>> {
        &self.queue
    }

    /// Key pressed; `velocity` is the current note velocity
    pub fn key_down(&mut self, key: KeyCode, velocity: u8) -> DispatchOutcome {
        if !self.held.insert(key) {
            trace!("Repeat press ignored: {}", key);
            return DispatchOutcome::Ignored;
        }

        let Some(notes) = self.mapping.resolve(key).map(|m| m.notes().to_vec()) else {
            trace!("Unmapped key down: {}", key);
            return DispatchOutcome::Unmapped;
        };

        let mut burst = Burst::with_capacity(notes.len());
        for note in &notes {
            self.send(MidiMessage::note_on(self.channel, *note, velocity), &mut burst);
        }

        self.flush(burst, Some(ObservedEvent::highlight(key, true)))
    }

    /// Key released
    pub fn key_up(&mut self, key: KeyCode) -> DispatchOutcome {
        if !self.held.remove(key) {
            trace!("Release of key not held: {}", key);
            return DispatchOutcome::Ignored;
        }

        let Some(notes) = self.mapping.resolve(key).map(|m| m.notes().to_vec()) else {
            trace!("Unmapped key up: {}", key);
            return DispatchOutcome::Unmapped;
        };

        let mut burst = Burst::with_capacity(notes.len());
        for note in &notes {
            self.send(MidiMessage::note_off(self.channel, *note), &mut burst);
        }

        self.flush(burst, Some(ObservedEvent::highlight(key, false)))
    }

    /// Continuous controller on the session channel
    pub fn send_control(&mut self, cc: u8, value: u8) -> DispatchOutcome {
        let mut burst = Burst::with_capacity(1);
        self.send(MidiMessage::control_change(self.channel, cc, value), &mut burst);
        self.flush(burst, None)
    }

    /// Release every held key, in press order
    pub fn release_all(&mut self) -> DispatchOutcome {
        let keys: Vec<KeyCode> = self.held.iter().copied().collect();
        keys.into_iter()
            .map(|key| self.key_up(key))
            .fold(DispatchOutcome::Ignored, DispatchOutcome::merge)
    }

    /// Hand one message to the sink, recording whether it went out
    pub(super) fn send(&mut self, message: MidiMessage, burst: &mut Burst) {
        let delivered = match self.sink.send(&message) {
            Ok(()) => {
                if self.transport_warned {
                    debug!("MIDI transport '{}' available again", self.sink.name());
                    self.transport_warned = false;
                }
                true
            }
            Err(EngineError::TransportUnavailable) => {
                if !self.transport_warned {
                    warn!("MIDI transport unavailable, continuing without output");
                    self.transport_warned = true;
                }
                false
            }
            Err(e) => {
                warn!("MIDI send failed: {}", e);
                false
            }
        };
        burst.sent.push((message, delivered));
    }

    /// Queue a finished burst for observation
    pub(super) fn flush(&self, burst: Burst, highlight: Option<ObservedEvent>) -> DispatchOutcome {
        let outcome = burst.outcome();
        let mut events = Vec::with_capacity(burst.sent.len() + 1);
        events.extend(burst.sent.into_iter().map(|(message, delivered)| ObservedEvent::midi(message, delivered)));
        events.extend(highlight);
        self.queue.enqueue_all(events);
        outcome
    }
}
