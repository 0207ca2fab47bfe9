/// A deadline-based debouncer driven by host-supplied timestamps.
///
/// Nothing here owns a timer: the host calls [`Debouncer::poll`] from its tick loop. Each
/// `trigger` restarts the delay, so a burst of triggers fires once, `delay_ms` after the last
/// one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Debouncer {
    delay_ms: u64,
    deadline_ms: Option<u64>,
}

impl Debouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            deadline_ms: None,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn set_delay_ms(&mut self, delay_ms: u64) {
        self.delay_ms = delay_ms;
    }

    /// Registers an event at `now_ms`, (re)starting the delay.
    pub fn trigger(&mut self, now_ms: u64) {
        self.deadline_ms = Some(now_ms.saturating_add(self.delay_ms));
    }

    /// Returns `true` exactly once when the pending deadline has passed.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => {
                self.deadline_ms = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline_ms.is_some()
    }

    /// Time left before the pending event fires, or `None` when nothing is pending.
    pub fn remaining(&self, now_ms: u64) -> Option<u64> {
        self.deadline_ms
            .map(|deadline| deadline.saturating_sub(now_ms))
    }

    pub fn cancel(&mut self) {
        self.deadline_ms = None;
    }
}
