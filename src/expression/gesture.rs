//! Bellows gesture controller
//!
//! Turns timestamped pointer samples into two continuous-controller streams
//! and a direction-change signal, emulating accordion bellows:
//!
//! - pointer speed drives the speed controller (CC1 or CC7), decaying
//!   linearly to zero once the pointer has been idle for a while
//! - inverted vertical position drives CC11 (top of the area = 127)
//! - a reversal of lateral movement fires `direction_changed` once
//!
//! Samples may come from native pointer events or a fixed-rate poll; the
//! controller only sees [`PointerSample`]s and behaves the same either way.

use tracing::trace;

use super::curve::{shape, to_7bit, CurveType};
use crate::config::{ExpressionConfig, SpeedMetric};

/// Elapsed time is floored to this so identical timestamps never divide by zero
pub const MIN_ELAPSED_MS: u64 = 1;

/// Lateral displacement below this is not considered movement
pub const MOVEMENT_EPSILON_PX: f32 = 0.5;

/// Note velocity used before any pointer sample has arrived
pub const DEFAULT_NOTE_VELOCITY: u8 = 100;

const SPEED: usize = 0;
const POSITION: usize = 1;

/// Pointer position in pixels, relative to the tracked area
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One pointer observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub position: Point,
    pub timestamp_ms: u64,
}

impl PointerSample {
    pub fn new(x: f32, y: f32, timestamp_ms: u64) -> Self {
        Self {
            position: Point::new(x, y),
            timestamp_ms,
        }
    }
}

/// Sign of the last lateral movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Unknown,
    Left,
    Right,
}

/// Mutable tracking state, owned by the controller
#[derive(Debug, Clone, Default)]
pub struct GestureState {
    pub last_position: Option<Point>,
    pub last_sample_time_ms: u64,
    /// Last value handed out per channel (speed, position)
    pub last_emitted: [Option<u8>; 2],
    /// Last sample that counted as movement under the speed metric
    pub last_x_movement_time_ms: u64,
    pub direction: Direction,
    pub was_moving_last_frame: bool,
    /// Speed value at the moment the current decay began
    decay_from: Option<u8>,
}

/// Result of processing one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GestureUpdate {
    /// New speed controller value, if it changed
    pub speed: Option<u8>,
    /// New position (CC11) value, if it changed
    pub position: Option<u8>,
    pub direction_changed: bool,
}

impl GestureUpdate {
    pub fn is_empty(&self) -> bool {
        self.speed.is_none() && self.position.is_none() && !self.direction_changed
    }
}

/// Stateful gesture-to-controller mapper
#[derive(Debug, Clone)]
pub struct GestureController {
    config: ExpressionConfig,
    state: GestureState,
}

impl GestureController {
    pub fn new(config: ExpressionConfig) -> Self {
        Self {
            config,
            state: GestureState::default(),
        }
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn config(&self) -> &ExpressionConfig {
        &self.config
    }

    pub fn set_curve(&mut self, curve: CurveType) {
        self.config.curve = curve;
    }

    pub fn set_speed_enabled(&mut self, enabled: bool) {
        self.config.speed_enabled = enabled;
    }

    pub fn set_position_enabled(&mut self, enabled: bool) {
        self.config.position_enabled = enabled;
    }

    /// Re-anchor tracking at `sample` without emitting anything
    pub fn reset_tracking(&mut self, sample: PointerSample) {
        self.state.last_position = Some(sample.position);
        self.state.last_sample_time_ms = sample.timestamp_ms;
        self.state.last_x_movement_time_ms = sample.timestamp_ms;
    }

    /// Process one pointer sample
    pub fn on_sample(&mut self, sample: PointerSample) -> GestureUpdate {
        let mut update = GestureUpdate::default();

        let Some(last) = self.state.last_position else {
            self.reset_tracking(sample);
            update.position = self.evaluate_position(sample.position);
            return update;
        };

        let now = sample.timestamp_ms;
        let elapsed_ms = now
            .saturating_sub(self.state.last_sample_time_ms)
            .max(MIN_ELAPSED_MS);

        let dx = sample.position.x - last.x;
        let dy = sample.position.y - last.y;

        let distance = match self.config.speed_metric {
            SpeedMetric::Euclidean => (dx * dx + dy * dy).sqrt(),
            SpeedMetric::Horizontal => dx.abs(),
        };

        if distance >= MOVEMENT_EPSILON_PX {
            // Direction only follows lateral motion
            if dx.abs() >= MOVEMENT_EPSILON_PX {
                let direction = if dx > 0.0 { Direction::Right } else { Direction::Left };

                if self.state.was_moving_last_frame
                    && self.state.direction != Direction::Unknown
                    && self.state.direction != direction
                {
                    update.direction_changed = true;
                    trace!("Bellows reversed: {:?} -> {:?}", self.state.direction, direction);
                }
                self.state.direction = direction;
            }

            self.state.last_x_movement_time_ms = now;
            self.state.was_moving_last_frame = true;
            self.state.decay_from = None;

            let speed = distance / (elapsed_ms as f32 / 1000.0);
            let normalized = (speed / self.config.max_speed).clamp(0.0, 1.0);

            trace!("Gesture speed {:.1} px/s over {} ms", speed, elapsed_ms);

            if self.config.speed_enabled {
                update.speed = self.emit(SPEED, to_7bit(shape(normalized, self.config.curve)));
            }
        } else {
            update.speed = self.evaluate_decay(now);
        }

        update.position = self.evaluate_position(sample.position);

        self.state.last_position = Some(sample.position);
        self.state.last_sample_time_ms = now;

        update
    }

    /// Velocity for newly struck notes, from vertical position only
    ///
    /// Linear between the configured floor (bottom of the area) and 127
    /// (top), independent of the curve and of decay.
    pub fn current_note_velocity(&self) -> u8 {
        let floor = self.config.note_velocity_floor.min(127);

        match self.state.last_position {
            None => DEFAULT_NOTE_VELOCITY.max(floor),
            Some(position) => {
                let normalized = self.normalized_height(position);
                let span = (127 - floor) as f32;
                (floor as f32 + normalized * span).round().clamp(floor as f32, 127.0) as u8
            }
        }
    }

    /// Linear decay of the speed controller while the pointer rests
    fn evaluate_decay(&mut self, now: u64) -> Option<u8> {
        let idle_ms = now.saturating_sub(self.state.last_x_movement_time_ms);
        if idle_ms <= self.config.decay_threshold_ms {
            return None;
        }

        if self.state.was_moving_last_frame || self.state.decay_from.is_none() {
            self.state.was_moving_last_frame = false;
            self.state.decay_from = Some(self.state.last_emitted[SPEED].unwrap_or(0));
        }

        if !self.config.speed_enabled {
            return None;
        }

        let from = self.state.decay_from.unwrap_or(0);
        let window = self.config.decay_window_ms.max(1) as f32;
        let progress = ((idle_ms - self.config.decay_threshold_ms) as f32 / window).min(1.0);
        let value = (from as f32 * (1.0 - progress)) as u8;

        // Decay only ever lowers the value
        match self.state.last_emitted[SPEED] {
            Some(last) if value >= last => None,
            None if value == 0 => None,
            _ => self.emit(SPEED, value),
        }
    }

    fn evaluate_position(&mut self, position: Point) -> Option<u8> {
        if !self.config.position_enabled {
            return None;
        }

        let normalized = self.normalized_height(position);
        self.emit(POSITION, to_7bit(shape(normalized, self.config.curve)))
    }

    /// Inverted vertical position: top = 1.0, bottom = 0.0
    fn normalized_height(&self, position: Point) -> f32 {
        (1.0 - position.y / self.config.area.height).clamp(0.0, 1.0)
    }

    /// Record and return `value` unless it matches the last emitted value
    fn emit(&mut self, channel: usize, value: u8) -> Option<u8> {
        let value = value.min(127);
        match self.state.last_emitted[channel] {
            Some(last) if last.abs_diff(value) < 1 => None,
            _ => {
                self.state.last_emitted[channel] = Some(value);
                Some(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> GestureController {
        GestureController::new(ExpressionConfig::default())
    }

    #[test]
    fn test_first_sample_only_sets_position() {
        let mut gc = controller();
        let update = gc.on_sample(PointerSample::new(100.0, 0.0, 0));
        assert_eq!(update.speed, None);
        assert_eq!(update.position, Some(127));
        assert!(!update.direction_changed);
    }

    #[test]
    fn test_direction_change_fires_once_per_flip() {
        let mut gc = controller();
        let xs = [0.0, 10.0, 20.0, 10.0, 0.0];
        let fired: Vec<bool> = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| gc.on_sample(PointerSample::new(x, 500.0, i as u64 * 16)).direction_changed)
            .collect();

        assert_eq!(fired, vec![false, false, false, true, false]);
        assert_eq!(gc.state().direction, Direction::Left);
    }

    #[test]
    fn test_reversal_through_stationary_frame_still_fires() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 500.0, 0));
        gc.on_sample(PointerSample::new(10.0, 500.0, 16));
        assert!(!gc.on_sample(PointerSample::new(10.0, 500.0, 32)).direction_changed);
        assert!(gc.on_sample(PointerSample::new(0.0, 500.0, 48)).direction_changed);
    }

    #[test]
    fn test_no_direction_change_after_decay() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 500.0, 0));
        gc.on_sample(PointerSample::new(10.0, 500.0, 16));
        gc.on_sample(PointerSample::new(10.0, 500.0, 500));
        assert!(!gc.state().was_moving_last_frame);
        assert!(!gc.on_sample(PointerSample::new(0.0, 500.0, 516)).direction_changed);
    }

    #[test]
    fn test_identical_timestamps_floor_elapsed() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 500.0, 100));
        let update = gc.on_sample(PointerSample::new(5.0, 500.0, 100));
        // 5 px in 1 ms is well above max speed
        assert_eq!(update.speed, Some(127));
    }

    #[test]
    fn test_non_monotonic_timestamp_is_absorbed() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 500.0, 100));
        let update = gc.on_sample(PointerSample::new(1.0, 500.0, 50));
        assert!(update.speed.is_some());
    }

    #[test]
    fn test_speed_normalization_and_curve() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 500.0, 0));
        // 20 px / 16 ms = 1250 px/s -> 0.625 -> 79
        assert_eq!(gc.on_sample(PointerSample::new(20.0, 500.0, 16)).speed, Some(79));

        let mut gc = controller();
        gc.set_curve(CurveType::Exponential);
        gc.on_sample(PointerSample::new(0.0, 500.0, 0));
        // 0.625² * 127 = 49.6
        assert_eq!(gc.on_sample(PointerSample::new(20.0, 500.0, 16)).speed, Some(49));
    }

    #[test]
    fn test_horizontal_metric_ignores_vertical_motion() {
        let mut config = ExpressionConfig::default();
        config.speed_metric = SpeedMetric::Horizontal;
        let mut gc = GestureController::new(config);
        gc.on_sample(PointerSample::new(0.0, 0.0, 0));
        // 20 px lateral, 300 px vertical
        assert_eq!(gc.on_sample(PointerSample::new(20.0, 300.0, 16)).speed, Some(79));
    }

    #[test]
    fn test_vertical_drag_drives_speed() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(500.0, 1000.0, 0));

        let mut speeds = Vec::new();
        for i in 1..20u64 {
            let y = 1000.0 - 30.0 * i as f32;
            speeds.push(gc.on_sample(PointerSample::new(500.0, y, i * 16)).speed);
        }

        // 30 px / 16 ms = 1875 px/s -> 0.9375 -> 119
        assert_eq!(speeds[0], Some(119));
        assert!(speeds[1..].iter().all(Option::is_none), "{:?}", speeds);
        assert!(gc.state().was_moving_last_frame);
        assert_eq!(gc.state().direction, Direction::Unknown);
    }

    #[test]
    fn test_vertical_drag_keeps_decay_away() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 500.0, 0));
        gc.on_sample(PointerSample::new(20.0, 500.0, 16));
        for t in (32..=400).step_by(16) {
            let y = 500.0 - (t as f32 / 16.0) * 10.0;
            let speed = gc.on_sample(PointerSample::new(20.0, y, t)).speed;
            assert_ne!(speed, Some(0));
        }
        assert!(gc.state().was_moving_last_frame);
    }

    #[test]
    fn test_unchanged_values_are_suppressed() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 540.0, 0));
        let update = gc.on_sample(PointerSample::new(0.0, 540.0, 16));
        assert!(update.is_empty());
    }

    #[test]
    fn test_no_decay_before_threshold() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 500.0, 0));
        gc.on_sample(PointerSample::new(20.0, 500.0, 16));
        let update = gc.on_sample(PointerSample::new(20.0, 500.0, 150));
        assert_eq!(update.speed, None);
        assert!(gc.state().was_moving_last_frame);
    }

    #[test]
    fn test_decay_is_strictly_decreasing_to_zero() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 500.0, 0));
        let start = gc.on_sample(PointerSample::new(20.0, 500.0, 16)).speed.unwrap();

        let mut sent = vec![start];
        for t in (32..=1200).step_by(16) {
            if let Some(value) = gc.on_sample(PointerSample::new(20.0, 500.0, t)).speed {
                sent.push(value);
            }
        }

        assert!(sent.len() > 2);
        assert!(sent.windows(2).all(|w| w[1] < w[0]), "{:?}", sent);
        assert_eq!(*sent.last().unwrap(), 0);
        assert!(!gc.state().was_moving_last_frame);
    }

    #[test]
    fn test_motion_resumes_during_decay() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 500.0, 0));
        gc.on_sample(PointerSample::new(20.0, 500.0, 16));
        let decayed = gc.on_sample(PointerSample::new(20.0, 500.0, 400)).speed.unwrap();
        assert!(decayed < 79);

        let resumed = gc.on_sample(PointerSample::new(60.0, 500.0, 416)).speed.unwrap();
        assert!(resumed > decayed);
        assert!(gc.state().was_moving_last_frame);
    }

    #[test]
    fn test_position_channel_inverted_and_shaped() {
        let mut gc = controller();
        assert_eq!(gc.on_sample(PointerSample::new(0.0, 1080.0, 0)).position, Some(0));
        assert_eq!(gc.on_sample(PointerSample::new(0.0, 540.0, 16)).position, Some(63));

        let mut gc = controller();
        gc.set_curve(CurveType::Logarithmic);
        assert_eq!(gc.on_sample(PointerSample::new(0.0, 540.0, 0)).position, Some(89));
    }

    #[test]
    fn test_disabled_channels_never_emit() {
        let mut gc = controller();
        gc.set_speed_enabled(false);
        gc.set_position_enabled(false);
        gc.on_sample(PointerSample::new(0.0, 0.0, 0));
        let update = gc.on_sample(PointerSample::new(50.0, 300.0, 16));
        assert_eq!(update.speed, None);
        assert_eq!(update.position, None);
    }

    #[test]
    fn test_note_velocity_from_height() {
        let mut gc = controller();
        assert_eq!(gc.current_note_velocity(), DEFAULT_NOTE_VELOCITY);

        gc.on_sample(PointerSample::new(0.0, 0.0, 0));
        assert_eq!(gc.current_note_velocity(), 127);

        gc.on_sample(PointerSample::new(0.0, 1080.0, 16));
        assert_eq!(gc.current_note_velocity(), 1);
    }

    #[test]
    fn test_note_velocity_floor_zero() {
        let mut config = ExpressionConfig::default();
        config.note_velocity_floor = 0;
        let mut gc = GestureController::new(config);
        gc.on_sample(PointerSample::new(0.0, 2000.0, 0));
        assert_eq!(gc.current_note_velocity(), 0);
    }

    #[test]
    fn test_reset_tracking_reanchors() {
        let mut gc = controller();
        gc.on_sample(PointerSample::new(0.0, 500.0, 0));
        gc.reset_tracking(PointerSample::new(500.0, 500.0, 1000));
        // no jump from the re-anchor itself
        let update = gc.on_sample(PointerSample::new(500.0, 500.0, 1016));
        assert_eq!(update.speed, None);
    }
}
