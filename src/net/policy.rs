//! Accept-error policy.
//!
//! Decides whether a listener-level accept failure is retried (with
//! exponential backoff and jitter) or ends serving.

use std::time::Duration;

use rand::Rng;

use crate::config::ListenerErrorPolicy;

/// Delay before retry number `attempt` (1-based), or `None` to give up.
pub fn retry_delay(policy: &ListenerErrorPolicy, attempt: u32) -> Option<Duration> {
    match *policy {
        ListenerErrorPolicy::Shutdown => None,
        ListenerErrorPolicy::Retry {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        } => (attempt <= max_attempts).then(|| backoff(attempt, base_delay_ms, max_delay_ms)),
    }
}

/// Exponential backoff, capped, plus up to 10% jitter.
fn backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponential = 2u64.saturating_pow(attempt.saturating_sub(1));
    let capped = base_ms.saturating_mul(exponential).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}
