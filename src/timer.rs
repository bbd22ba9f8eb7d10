//! The ARTIM (Association Request/Reject/Release Timer) timer.
//!
//! PS3.8 arms this timer whenever the state machine enters a state that
//! awaits a response from the peer, and expects the connection to be
//! aborted if it elapses before the expected PDU arrives.

use std::time::{Duration, Instant};

/// A simple monotonic deadline timer.
///
/// The timer is disarmed by default; [`Timer::arm`] starts it, and
/// [`Timer::expired`] is a cheap, side-effect-free predicate that callers
/// poll from the event loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// Create a disarmed timer.
    pub fn new() -> Self {
        Timer { deadline: None }
    }

    /// Arm the timer to expire `timeout` from now.
    pub fn arm(&mut self, timeout: Duration) {
        self.deadline = Some(Instant::now() + timeout);
    }

    /// Disarm the timer.
    pub fn clear(&mut self) {
        self.deadline = None;
    }

    /// Whether the timer is currently armed.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whether the timer is armed and its deadline has passed.
    pub fn expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::Timer;
    use std::time::Duration;

    #[test]
    fn disarmed_timer_never_expires() {
        let timer = Timer::new();
        assert!(!timer.is_armed());
        assert!(!timer.expired());
    }

    #[test]
    fn armed_timer_expires_after_duration() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_millis(10));
        assert!(timer.is_armed());
        assert!(!timer.expired());
        std::thread::sleep(Duration::from_millis(30));
        assert!(timer.expired());
    }

    #[test]
    fn clearing_disarms_timer() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_secs(60));
        timer.clear();
        assert!(!timer.is_armed());
        assert!(!timer.expired());
    }
}
