//! Observation path: message log and key highlighting
//!
//! Runs at its own cadence (~30 Hz), draining the dispatch queue filled by
//! the critical path. Nothing here is ever awaited by the send path; the
//! only shared point is the queue swap.

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::dispatch::{DispatchQueue, EventHistory, HISTORY_CAPACITY};
use crate::mapping::KeyCode;
use crate::midi::MidiMessage;

/// What happened on the critical path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedKind {
    /// A message handed to the sink; `delivered` is false in degraded mode
    Midi { message: MidiMessage, delivered: bool },
    /// A key should be shown pressed or released
    KeyHighlight { key: KeyCode, down: bool },
}

/// Timestamped event queued for the observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedEvent {
    /// UTC capture time; converted to local time only when formatted
    pub at: DateTime<Utc>,
    pub kind: ObservedKind,
}

impl ObservedEvent {
    pub fn midi(message: MidiMessage, delivered: bool) -> Self {
        Self {
            at: Utc::now(),
            kind: ObservedKind::Midi { message, delivered },
        }
    }

    pub fn highlight(key: KeyCode, down: bool) -> Self {
        Self {
            at: Utc::now(),
            kind: ObservedKind::KeyHighlight { key, down },
        }
    }
}

/// Single subscriber receiving each formatted log line
pub type LineListener = Box<dyn FnMut(&str) + Send>;

/// Observer state: formatted history and highlighted keys
pub struct Observer {
    queue: Arc<DispatchQueue<ObservedEvent>>,
    history: EventHistory<String>,
    highlighted: BTreeSet<KeyCode>,
    scratch: VecDeque<ObservedEvent>,
    listener: Option<LineListener>,
    reported_drops: u64,
}

pub type SharedObserver = Arc<Mutex<Observer>>;

impl Observer {
    pub fn new(queue: Arc<DispatchQueue<ObservedEvent>>) -> Self {
        Self::with_history(queue, HISTORY_CAPACITY)
    }

    pub fn with_history(queue: Arc<DispatchQueue<ObservedEvent>>, history: usize) -> Self {
        Self {
            queue,
            history: EventHistory::with_capacity(history),
            highlighted: BTreeSet::new(),
            scratch: VecDeque::new(),
            listener: None,
            reported_drops: 0,
        }
    }

    pub fn shared(self) -> SharedObserver {
        Arc::new(Mutex::new(self))
    }

    pub fn set_listener(&mut self, listener: LineListener) {
        self.listener = Some(listener);
    }

    /// Pull pending events and apply them; returns how many were taken
    pub fn drain(&mut self) -> usize {
        let taken = self.queue.drain_into(&mut self.scratch);

        let dropped = self.queue.dropped_count();
        if dropped > self.reported_drops {
            warn!("Observer fell behind, {} events dropped", dropped - self.reported_drops);
            self.reported_drops = dropped;
        }

        let events = std::mem::take(&mut self.scratch);
        for event in &events {
            self.apply(event);
        }
        self.scratch = events;

        taken
    }

    fn apply(&mut self, event: &ObservedEvent) {
        match event.kind {
            ObservedKind::KeyHighlight { key, down: true } => {
                self.highlighted.insert(key);
            }
            ObservedKind::KeyHighlight { key, down: false } => {
                self.highlighted.remove(&key);
            }
            ObservedKind::Midi { .. } => {
                if let Some(line) = format_event(event) {
                    if let Some(listener) = self.listener.as_mut() {
                        listener(&line);
                    }
                    self.history.push(line);
                }
            }
        }
    }

    /// Formatted lines, oldest first
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Keys currently shown as pressed
    pub fn highlighted(&self) -> &BTreeSet<KeyCode> {
        &self.highlighted
    }

    /// Clear the log (highlighting follows the keys and is kept)
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Clear the log and highlighting
    pub fn reset(&mut self) {
        self.history.clear();
        self.highlighted.clear();
    }
}

/// Human-readable line for a MIDI event, `None` for highlight events
pub fn format_event(event: &ObservedEvent) -> Option<String> {
    match event.kind {
        ObservedKind::Midi { message, delivered } => {
            let suffix = if delivered { "" } else { " (not sent)" };
            Some(format!("{}{}{}", event.at.with_timezone(&Local).format("[%H:%M:%S] "), message, suffix))
        }
        ObservedKind::KeyHighlight { .. } => None,
    }
}

/// Running periodic drain
pub struct ObserverTask {
    handle: JoinHandle<()>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl ObserverTask {
    /// Stop after one final drain
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

/// Drain `observer` at `drain_hz` until shut down
pub fn spawn_observer(observer: SharedObserver, drain_hz: u32) -> ObserverTask {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let period = Duration::from_secs_f64(1.0 / drain_hz.max(1) as f64);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("Observer started ({} Hz)", drain_hz);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    observer.lock().drain();
                }
                _ = &mut stop_rx => {
                    observer.lock().drain();
                    break;
                }
            }
        }

        debug!("Observer stopped");
    });

    ObserverTask {
        handle,
        stop_tx: Some(stop_tx),
    }
}
