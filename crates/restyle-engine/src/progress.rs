//! Observer notifications
//!
//! The controller pushes phase changes and throttled progress updates into an
//! unbounded channel. Closed receivers are ignored; observers never slow a run
//! down.

use restyle_core::{Phase, ProgressUpdate, RunId};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Event delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// Phase transition
    PhaseChanged {
        /// Run the transition belongs to (none for a manual reset)
        run_id: Option<RunId>,
        /// Previous phase
        from: Phase,
        /// New phase
        to: Phase,
    },
    /// Progress snapshot
    Progress(ProgressUpdate),
}

/// Sending half of the event channel
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ControllerEvent>>,
}

impl EventSink {
    /// Sink that drops everything
    #[inline]
    #[must_use]
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Fresh sink and its receiver
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Deliver an event
    pub fn emit(&self, event: ControllerEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!("event receiver dropped");
            }
        }
    }
}

/// Rate limiter for progress updates
///
/// Terminal-phase updates always pass.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    /// Create throttle
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Whether `update` should be delivered now
    pub fn admit(&mut self, update: &ProgressUpdate) -> bool {
        let now = Instant::now();
        let due = update.phase.is_terminal()
            || self.last.map_or(true, |last| now.duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }
}

/// Share of `done` over `total`, as a 0 - 100 percentage
#[must_use]
pub fn percentage(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = done.saturating_mul(100) / total;
    u8::try_from(pct.min(100)).unwrap_or(100)
}
