//! MIDI message types
//!
//! Provides the outbound channel-voice messages, wire encoding and
//! human-readable formatting used by the observer.

use std::fmt;

/// Control Change numbers used by the expression controller
pub mod cc {
    /// CC1 - Modulation Wheel
    pub const MODULATION: u8 = 1;
    /// CC7 - Channel Volume
    pub const VOLUME: u8 = 7;
    /// CC11 - Expression
    pub const EXPRESSION: u8 = 11;
}

/// Velocity written into Note Off messages (not meaningful to receivers)
pub const NOTE_OFF_VELOCITY: u8 = 0;

/// Highest note / data byte value
pub const DATA_MAX: u8 = 0x7F;

/// Outbound MIDI messages
///
/// Channels are 0-based on the wire (0-15); `Display` shows them 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MidiMessage {
    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Note Off: channel (0-15), note (0-127)
    NoteOff { channel: u8, note: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },
}

impl MidiMessage {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        MidiMessage::NoteOn { channel: channel & 0x0F, note: note & DATA_MAX, velocity: velocity & DATA_MAX }
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        MidiMessage::NoteOff { channel: channel & 0x0F, note: note & DATA_MAX }
    }

    pub fn control_change(channel: u8, cc: u8, value: u8) -> Self {
        MidiMessage::ControlChange { channel: channel & 0x0F, cc: cc & DATA_MAX, value: value & DATA_MAX }
    }

    /// Parse a message from raw bytes
    ///
    /// Note On with velocity 0 is reported as Note Off. Anything other than
    /// the three supported channel messages yields `None`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 3 || data[0] < 0x80 || data[0] >= 0xF0 {
            return None;
        }

        let channel = data[0] & 0x0F;
        let first = data[1] & DATA_MAX;
        let second = data[2] & DATA_MAX;

        match data[0] & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff { channel, note: first }),
            0x90 if second == 0 => Some(MidiMessage::NoteOff { channel, note: first }),
            0x90 => Some(MidiMessage::NoteOn { channel, note: first, velocity: second }),
            0xB0 => Some(MidiMessage::ControlChange { channel, cc: first, value: second }),
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> [u8; 3] {
        match *self {
            MidiMessage::NoteOn { channel, note, velocity } => {
                [0x90 | (channel & 0x0F), note & DATA_MAX, velocity & DATA_MAX]
            }
            MidiMessage::NoteOff { channel, note } => {
                [0x80 | (channel & 0x0F), note & DATA_MAX, NOTE_OFF_VELOCITY]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                [0xB0 | (channel & 0x0F), cc & DATA_MAX, value & DATA_MAX]
            }
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. } => channel,
        }
    }

    /// Note number for note messages
    pub fn note(&self) -> Option<u8> {
        match *self {
            MidiMessage::NoteOn { note, .. } | MidiMessage::NoteOff { note, .. } => Some(note),
            MidiMessage::ControlChange { .. } => None,
        }
    }

    pub fn is_note_on(&self) -> bool {
        matches!(self, MidiMessage::NoteOn { .. })
    }

    pub fn is_note_off(&self) -> bool {
        matches!(self, MidiMessage::NoteOff { .. })
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOn { note, velocity, .. } => {
                write!(f, "Note ON:  {} (MIDI: {}) Vel: {}", note_name(note), note, velocity)
            }
            MidiMessage::NoteOff { note, .. } => {
                write!(f, "Note OFF: {} (MIDI: {})", note_name(note), note)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
        }
    }
}

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Name a MIDI note number, middle C (60) being "C4"
pub fn note_name(note: u8) -> String {
    let octave = (note / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(note % 12) as usize], octave)
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
