//! Bellows reversal: re-articulate every held note

use tracing::debug;

use super::dispatcher::{Burst, DispatchOutcome, EventDispatcher};
use crate::midi::MidiMessage;
use crate::output::MidiSink;

impl<S: MidiSink> EventDispatcher<S> {
    /// Send note-off then note-on for each note of each held key
    ///
    /// Pairs go out back-to-back per note, keys in press order. No-op when
    /// nothing is held.
    pub fn retrigger_held(&mut self, velocity: u8) -> DispatchOutcome {
        if self.held.is_empty() {
            return DispatchOutcome::Ignored;
        }

        let notes: Vec<u8> = self
            .held
            .iter()
            .filter_map(|key| self.mapping.resolve(*key))
            .flat_map(|mapping| mapping.notes().iter().copied())
            .collect();

        if notes.is_empty() {
            return DispatchOutcome::Unmapped;
        }

        let mut burst = Burst::with_capacity(notes.len() * 2);
        for note in notes {
            self.send(MidiMessage::note_off(self.channel, note), &mut burst);
            self.send(MidiMessage::note_on(self.channel, note, velocity), &mut burst);
        }

        debug!(
            "Retriggered {} held key(s) at velocity {}",
            self.held.len(),
            velocity
        );
        self.flush(burst, None)
    }
}
