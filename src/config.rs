//! Configuration management for Stradella GW
//!
//! Handles loading, parsing and validating the YAML configuration file.
//! Every section has defaults, so an empty file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::EngineError;
use crate::expression::CurveType;
use crate::mapping::{RangePolicy, DEFAULT_BASE_NOTE};
use crate::midi::cc;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub midi: MidiConfig,
    pub keyboard: KeyboardConfig,
    pub expression: ExpressionConfig,
    pub observer: ObserverConfig,
}

/// MIDI output configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Case-insensitive substring of the output port name; none means
    /// log-only output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_port: Option<String>,
    /// 1-based MIDI channel used for the whole session
    pub channel: u8,
}

/// Key mapping table configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Note produced by the `F` key
    pub base_note: u8,
    pub range_policy: RangePolicy,
}

/// Which controller receives the gesture speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedController {
    /// CC1
    #[default]
    Modulation,
    /// CC7
    Volume,
}

impl SpeedController {
    pub fn cc(&self) -> u8 {
        match self {
            SpeedController::Modulation => cc::MODULATION,
            SpeedController::Volume => cc::VOLUME,
        }
    }
}

/// Distance measure used for gesture speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedMetric {
    #[default]
    Euclidean,
    /// Only lateral (x) movement counts
    Horizontal,
}

/// Size of the tracked pointer area in pixels
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AreaConfig {
    pub width: f32,
    pub height: f32,
}

/// Bellows gesture configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExpressionConfig {
    pub curve: CurveType,
    pub speed_controller: SpeedController,
    pub speed_enabled: bool,
    /// CC11 from vertical position
    pub position_enabled: bool,
    pub speed_metric: SpeedMetric,
    /// Pixels per second mapped to full scale
    pub max_speed: f32,
    /// Idle time before the speed controller starts decaying
    pub decay_threshold_ms: u64,
    /// Time the decay takes to reach zero
    pub decay_window_ms: u64,
    /// Lowest velocity a struck note can get
    pub note_velocity_floor: u8,
    pub area: AreaConfig,
    /// Pointer polling rate
    pub poll_hz: u32,
}

/// Observation path configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Drain cadence of the dispatch queue
    pub drain_hz: u32,
    /// History entries kept for display
    pub history: usize,
    /// Pending events held before the oldest are dropped
    pub pending_capacity: usize,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            output_port: None,
            channel: 1,
        }
    }
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            base_note: DEFAULT_BASE_NOTE,
            range_policy: RangePolicy::Transpose,
        }
    }
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            curve: CurveType::Linear,
            speed_controller: SpeedController::Modulation,
            speed_enabled: true,
            position_enabled: true,
            speed_metric: SpeedMetric::Euclidean,
            max_speed: 2000.0,
            decay_threshold_ms: 150,
            decay_window_ms: 600,
            note_velocity_floor: 1,
            area: AreaConfig::default(),
            poll_hz: 60,
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            drain_hz: 30,
            history: crate::dispatch::HISTORY_CAPACITY,
            pending_capacity: crate::dispatch::DEFAULT_PENDING_CAPACITY,
        }
    }
}

impl MidiConfig {
    /// 0-based channel for the wire
    pub fn wire_channel(&self) -> u8 {
        self.channel.clamp(1, 16) - 1
    }
}

impl AppConfig {
    /// Load configuration from file
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;

        Ok(config)
    }

    /// Reject values the engine cannot honour
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        let invalid = |msg: String| -> std::result::Result<(), EngineError> {
            Err(EngineError::InvalidConfig(msg))
        };

        if !(1..=16).contains(&self.midi.channel) {
            return invalid(format!("midi.channel must be 1-16, got {}", self.midi.channel));
        }
        if self.keyboard.base_note > 127 {
            return invalid(format!("keyboard.base_note must be 0-127, got {}", self.keyboard.base_note));
        }
        let expr = &self.expression;
        if !(expr.max_speed > 0.0) {
            return invalid(format!("expression.max_speed must be positive, got {}", expr.max_speed));
        }
        if !(expr.area.width > 0.0 && expr.area.height > 0.0) {
            return invalid(format!(
                "expression.area must be positive, got {}x{}",
                expr.area.width, expr.area.height
            ));
        }
        if expr.note_velocity_floor > 127 {
            return invalid(format!(
                "expression.note_velocity_floor must be 0-127, got {}",
                expr.note_velocity_floor
            ));
        }
        if expr.poll_hz == 0 || self.observer.drain_hz == 0 {
            return invalid("poll_hz and drain_hz must be non-zero".to_string());
        }
        if self.observer.history == 0 || self.observer.pending_capacity == 0 {
            return invalid("observer.history and observer.pending_capacity must be non-zero".to_string());
        }

        Ok(())
    }
}
