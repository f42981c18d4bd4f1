//! Deadline accounting shared by blocking and async wait paths (C3).
//!
//! A `Deadline` is an absolute point in monotonic time, not a duration, so it
//! can be threaded through a chain of calls (spawn, then wait, then drain)
//! without each step's latency eating into the next step's budget.

use std::time::{Duration, Instant};

/// An absolute point in time after which an operation should give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Deadline(Instant::now() + timeout)
    }

    /// A deadline that is already in the past; operations using it should
    /// make at most one non-blocking attempt.
    pub fn elapsed() -> Self {
        Deadline(Instant::now() - Duration::from_nanos(1))
    }

    /// Remaining time, or `None` if the deadline has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.checked_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }
}

/// An optional caller-supplied deadline; `None` means "wait indefinitely".
#[derive(Debug, Clone, Copy, Default)]
pub struct MaybeDeadline(Option<Deadline>);

impl MaybeDeadline {
    pub const NONE: MaybeDeadline = MaybeDeadline(None);

    pub fn new(deadline: Deadline) -> Self {
        MaybeDeadline(Some(deadline))
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        MaybeDeadline(timeout.map(Deadline::after))
    }

    /// Remaining time, or `None` for "no deadline" as well as "already
    /// expired" — callers distinguish the two via `is_bounded`/`is_expired`.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.and_then(|d| d.remaining())
    }

    pub fn is_bounded(&self) -> bool {
        self.0.is_some()
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.0, Some(d) if d.is_expired())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unbounded_has_no_remaining_but_is_not_expired() {
        let d = MaybeDeadline::NONE;
        assert!(!d.is_bounded());
        assert!(!d.is_expired());
        assert_eq!(d.remaining(), None);
    }

    #[test]
    fn bounded_deadline_counts_down() {
        let d = MaybeDeadline::from_timeout(Some(Duration::from_secs(60)));
        assert!(d.is_bounded());
        assert!(!d.is_expired());
        let remaining = d.remaining().expect("bounded deadline has remaining time");
        assert!(remaining <= Duration::from_secs(60));
    }

    #[test]
    fn elapsed_deadline_is_expired() {
        let d = Deadline::elapsed();
        assert!(d.is_expired());
        assert_eq!(d.remaining(), None);
    }
}
