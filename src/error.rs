//! Error types for the input-to-MIDI engine

use thiserror::Error;

use crate::midi::MidiMessage;

/// Errors surfaced by the engine and its collaborators
///
/// None of these ever escape the critical path: the dispatcher absorbs send
/// failures into its [`DispatchOutcome`](crate::dispatch::DispatchOutcome).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Outbound MIDI port is not open
    #[error("MIDI transport unavailable")]
    TransportUnavailable,

    /// The driver rejected a message
    #[error("failed to send {message}: {reason}")]
    SendFailed { message: MidiMessage, reason: String },

    /// No output port matched the configured pattern
    #[error("MIDI output port '{0}' not found")]
    PortNotFound(String),

    /// Configuration values out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An input source could not start
    #[error("input source error: {0}")]
    Input(String),

    /// MIDI backend initialisation failure
    #[error("MIDI backend error: {0}")]
    Midi(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
