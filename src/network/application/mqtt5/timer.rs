//! Caller-clocked one-shot timer.
//!
//! The engine never reads a clock. Whoever drives [`Client::tick`] passes the
//! current time in milliseconds and the timer only answers "has it elapsed".
//!
//! [`Client::tick`]: super::client::Client::tick

/// A one-shot timer polled with the caller's notion of "now".
///
/// [`PollingTimer::start`] arms the timer without a timestamp; the deadline is
/// fixed by the first poll that follows. This lets code paths that have no
/// clock, such as the receive path, restart a timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollingTimer {
    interval_ms: u64,
    deadline: Option<u64>,
    armed: bool,
}

impl PollingTimer {
    /// A stopped timer.
    pub const fn new() -> Self {
        Self {
            interval_ms: 0,
            deadline: None,
            armed: false,
        }
    }

    /// Arm the timer; the interval starts counting at the next poll.
    pub fn start(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
        self.deadline = None;
        self.armed = true;
    }

    /// Arm the timer counting from `now_ms`.
    pub fn start_at(&mut self, interval_ms: u64, now_ms: u64) {
        self.interval_ms = interval_ms;
        self.deadline = Some(now_ms.saturating_add(interval_ms));
        self.armed = true;
    }

    /// Disarm the timer.
    pub fn stop(&mut self) {
        self.deadline = None;
        self.armed = false;
    }

    /// `true` while armed and not yet reported as expired.
    pub fn is_running(&self) -> bool {
        self.armed
    }

    /// Interval of the last start.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Report expiry once, then disarm.
    pub fn is_expired(&mut self, now_ms: u64) -> bool {
        if !self.armed {
            return false;
        }
        let interval = self.interval_ms;
        let deadline = *self
            .deadline
            .get_or_insert_with(|| now_ms.saturating_add(interval));
        if now_ms >= deadline {
            self.stop();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_timer_never_expires() {
        let mut timer = PollingTimer::new();
        assert!(!timer.is_running());
        assert!(!timer.is_expired(u64::MAX));
    }

    #[test]
    fn lazy_start_counts_from_first_poll() {
        let mut timer = PollingTimer::new();
        timer.start(100);
        assert!(!timer.is_expired(1_000));
        assert!(!timer.is_expired(1_099));
        assert!(timer.is_expired(1_100));
        assert!(!timer.is_running());
        assert!(!timer.is_expired(5_000));
    }

    #[test]
    fn start_at_uses_given_origin() {
        let mut timer = PollingTimer::new();
        timer.start_at(50, 10);
        assert!(!timer.is_expired(59));
        assert!(timer.is_expired(60));
    }

    #[test]
    fn restart_pushes_deadline() {
        let mut timer = PollingTimer::new();
        timer.start_at(100, 0);
        assert!(!timer.is_expired(90));
        timer.start(100);
        assert!(!timer.is_expired(150));
        assert!(!timer.is_expired(249));
        assert!(timer.is_expired(250));
    }

    #[test]
    fn stop_disarms() {
        let mut timer = PollingTimer::new();
        timer.start_at(10, 0);
        timer.stop();
        assert!(!timer.is_expired(100));
    }
}
