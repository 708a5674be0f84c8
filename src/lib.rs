//! Stradella GW - accordion keyboard and bellows gesture to MIDI
//!
//! Keys are mapped to Stradella bass notes and chords; pointer motion acts
//! as the bellows, driving continuous controllers and re-articulating held
//! notes on reversal. Messages are sent on a dedicated critical path and
//! mirrored to a non-blocking observer.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod expression;
pub mod input;
pub mod mapping;
pub mod midi;
pub mod observer;
pub mod output;

pub use config::AppConfig;
pub use engine::{spawn_critical_path, CriticalPath, Engine};
pub use error::{EngineError, EngineResult};
