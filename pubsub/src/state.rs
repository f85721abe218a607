//! Lifecycle shared by Connection, WriterGroup, and ReaderGroup (spec.md §4.D).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Disabled,
    Paused,
    PreOperational,
    Operational,
    Error,
}

impl ComponentState {
    pub fn is_operational(self) -> bool {
        matches!(self, ComponentState::Operational)
    }
}

/// Tracks the retry back-off applied to a component stuck in `Error`,
/// capped at `keyLifetimeMs` per §4.D's "Any → Error" transition note.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    current: Duration,
    cap: Duration,
}

impl RetryBackoff {
    pub fn new(cap: Duration) -> Self {
        Self {
            current: Duration::from_millis(100),
            cap,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.current = Duration::from_millis(100);
    }
}
