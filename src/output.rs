//! Outbound MIDI sinks
//!
//! The dispatcher talks to a single [`MidiSink`]. `MidirSink` drives a real
//! output port, `ConsoleSink` only logs, and `RecordingSink` captures
//! messages in memory for tests and dry runs.

use colored::*;
use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::midi::{format_hex, MidiMessage};

/// Synchronous, driver-buffered MIDI output
///
/// Implementations must not block for long and must not retry: a failed
/// send is reported and dropped.
pub trait MidiSink: Send {
    fn send(&mut self, message: &MidiMessage) -> EngineResult<()>;

    /// False while the transport is unavailable (sends will fail)
    fn is_open(&self) -> bool {
        true
    }

    fn name(&self) -> &str;
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
    fn send(&mut self, message: &MidiMessage) -> EngineResult<()> {
        (**self).send(message)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Output port driven through midir
pub struct MidirSink {
    conn: Option<MidiOutputConnection>,
    port_name: String,
}

impl MidirSink {
    /// Connect to the first output port whose name contains `pattern`
    /// (case-insensitive), or whose index equals `pattern`
    pub fn connect(pattern: &str) -> EngineResult<Self> {
        let midi_out =
            MidiOutput::new("Stradella-GW-Output").map_err(|e| EngineError::Midi(e.to_string()))?;

        let (port, port_name) = find_output_port(&midi_out, pattern)
            .ok_or_else(|| EngineError::PortNotFound(pattern.to_string()))?;

        info!("Connecting to output port: {}", port_name);

        let conn = midi_out
            .connect(&port, "Stradella-GW")
            .map_err(|e| EngineError::Midi(e.to_string()))?;

        Ok(Self {
            conn: Some(conn),
            port_name,
        })
    }

    /// A sink with no port; every send reports `TransportUnavailable`
    pub fn disconnected() -> Self {
        Self {
            conn: None,
            port_name: "(none)".to_string(),
        }
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, message: &MidiMessage) -> EngineResult<()> {
        let conn = self.conn.as_mut().ok_or(EngineError::TransportUnavailable)?;
        let data = message.encode();

        conn.send(&data).map_err(|e| EngineError::SendFailed {
            message: *message,
            reason: e.to_string(),
        })?;

        debug!("Sent: {} | {}", format_hex(&data), message);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn name(&self) -> &str {
        &self.port_name
    }
}

/// Log-only sink used when no port is configured
#[derive(Debug, Default)]
pub struct ConsoleSink {
    sent: u64,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> u64 {
        self.sent
    }
}

impl MidiSink for ConsoleSink {
    fn send(&mut self, message: &MidiMessage) -> EngineResult<()> {
        self.sent += 1;
        info!(
            "🎹 [{}] {} | {} [#{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            format_hex(&message.encode()),
            message,
            self.sent
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// In-memory sink; clones share the same buffer
#[derive(Debug, Clone)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<MidiMessage>>>,
    open: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Everything successfully sent so far
    pub fn messages(&self) -> Vec<MidiMessage> {
        self.messages.lock().clone()
    }

    pub fn take(&self) -> Vec<MidiMessage> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Simulate the transport going away or coming back
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiSink for RecordingSink {
    fn send(&mut self, message: &MidiMessage) -> EngineResult<()> {
        if !self.is_open() {
            return Err(EngineError::TransportUnavailable);
        }
        self.messages.lock().push(*message);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Find an output port by index or case-insensitive substring
fn find_output_port(midi_out: &MidiOutput, pattern: &str) -> Option<(MidiOutputPort, String)> {
    let ports = midi_out.ports();

    if let Ok(index) = pattern.trim().parse::<usize>() {
        if let Some(port) = ports.get(index) {
            let name = midi_out.port_name(port).unwrap_or_else(|_| format!("port {}", index));
            return Some((port.clone(), name));
        }
    }

    let pattern = pattern.to_lowercase();
    for port in ports {
        if let Ok(name) = midi_out.port_name(&port) {
            if name.to_lowercase().contains(&pattern) {
                debug!("Found port '{}' matching pattern '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

/// List available MIDI output ports
pub fn list_output_ports() -> EngineResult<Vec<String>> {
    let midi_out =
        MidiOutput::new("Stradella-GW-Scanner").map_err(|e| EngineError::Midi(e.to_string()))?;

    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

/// Print discovered output ports
pub fn print_ports() {
    println!("\n{}", "=== MIDI Output Ports ===".bold().cyan());
    match list_output_ports() {
        Ok(ports) if ports.is_empty() => println!("  {}", "(no output ports found)".dimmed()),
        Ok(ports) => {
            for (i, name) in ports.iter().enumerate() {
                println!("  {}: {}", i.to_string().yellow(), name);
            }
        }
        Err(e) => println!("  {}", e.to_string().red()),
    }
    println!();
}
