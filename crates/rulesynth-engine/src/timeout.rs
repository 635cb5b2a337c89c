//! Deadline and per-check timeout helpers for the fitter.

use std::time::{Duration, Instant};

pub(crate) fn deadline_exceeded(deadline: Option<Instant>) -> bool {
    match deadline {
        Some(deadline) => Instant::now() >= deadline,
        None => false,
    }
}

pub(crate) fn overall_timeout_duration(timeout_secs: u64) -> Option<Duration> {
    if timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(timeout_secs))
    }
}

pub(crate) fn deadline_from_timeout_secs(timeout_secs: u64) -> Option<Instant> {
    overall_timeout_duration(timeout_secs).and_then(|t| Instant::now().checked_add(t))
}

/// Milliseconds left before `deadline`, rounded up and at least 1 while the
/// deadline is in the future; `Some(0)` once it has passed.
pub(crate) fn remaining_timeout_ms(deadline: Option<Instant>) -> Option<u64> {
    let deadline = deadline?;
    if Instant::now() >= deadline {
        return Some(0);
    }
    let remaining = deadline.saturating_duration_since(Instant::now());
    let millis = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX);
    let rounded_up = if remaining.subsec_nanos() % 1_000_000 > 0 {
        millis.saturating_add(1)
    } else {
        millis
    };
    Some(rounded_up.max(1))
}

/// Timeout for the next check: the per-check budget clipped to what is left
/// of the overall deadline. Zero means unbounded. `None` once the deadline
/// has passed.
pub(crate) fn check_timeout_ms(check_ms: u64, deadline: Option<Instant>) -> Option<u64> {
    match remaining_timeout_ms(deadline) {
        Some(0) => None,
        Some(remaining) if check_ms == 0 => Some(remaining),
        Some(remaining) => Some(check_ms.min(remaining)),
        None => Some(check_ms),
    }
}

pub(crate) fn timeout_unknown_reason(context: &str) -> String {
    format!("{context} timed out before completion.")
}
