//! Circuit breaker (spec §4.6 Phase 0). Tracks consecutive evaluation
//! failures per formula key; once the threshold trips, the breaker
//! refuses further attempts until a cool-down elapses, then allows
//! exactly one retry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(60);

/// Telemetry snapshot a host can surface for a given formula key (spec
/// §4.6 "exposes `BreakerStatus`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerStatus {
    pub consecutive_failures: u32,
    pub tripped: bool,
}

struct BreakerState {
    consecutive_failures: AtomicU64,
    tripped_at: std::sync::Mutex<Option<Instant>>,
}

impl BreakerState {
    fn new() -> Self {
        Self { consecutive_failures: AtomicU64::new(0), tripped_at: std::sync::Mutex::new(None) }
    }
}

pub struct CircuitBreaker {
    threshold: u32,
    cool_down: Duration,
    states: DashMap<String, BreakerState>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cool_down: Duration) -> Self {
        Self { threshold, cool_down, states: DashMap::new() }
    }

    /// `true` if this key may attempt evaluation right now: either it
    /// hasn't tripped, or its cool-down has elapsed (allowing exactly
    /// one retry — a further failure re-trips the cool-down).
    pub fn may_attempt(&self, key: &str) -> bool {
        let entry = self.states.entry(key.to_string()).or_insert_with(BreakerState::new);
        let tripped_at = entry.tripped_at.lock().unwrap();
        match *tripped_at {
            None => true,
            Some(at) => {
                let elapsed = at.elapsed();
                if elapsed < self.cool_down {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(key = %key, elapsed_ms = elapsed.as_millis() as u64, "breaker still cooling down");
                    false
                } else {
                    true
                }
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        if let Some(entry) = self.states.get(key) {
            entry.consecutive_failures.store(0, Ordering::Relaxed);
            *entry.tripped_at.lock().unwrap() = None;
        }
    }

    pub fn record_failure(&self, key: &str) {
        let entry = self.states.entry(key.to_string()).or_insert_with(BreakerState::new);
        let failures = entry.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures as u32 >= self.threshold {
            *entry.tripped_at.lock().unwrap() = Some(Instant::now());
            #[cfg(feature = "tracing")]
            tracing::warn!(key = %key, consecutive_failures = failures, "circuit breaker tripped");
        }
    }

    pub fn status(&self, key: &str) -> BreakerStatus {
        match self.states.get(key) {
            Some(entry) => BreakerStatus {
                consecutive_failures: entry.consecutive_failures.load(Ordering::Relaxed) as u32,
                tripped: entry.tripped_at.lock().unwrap().is_some(),
            },
            None => BreakerStatus { consecutive_failures: 0, tripped: false },
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOL_DOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(3600));
        for _ in 0..2 {
            breaker.record_failure("s1");
        }
        assert!(breaker.may_attempt("s1"));
        breaker.record_failure("s1");
        assert!(!breaker.may_attempt("s1"));
        assert!(breaker.status("s1").tripped);
    }

    #[test]
    fn success_resets_the_counter() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(3600));
        breaker.record_failure("s1");
        breaker.record_failure("s1");
        breaker.record_success("s1");
        assert_eq!(breaker.status("s1").consecutive_failures, 0);
        assert!(!breaker.status("s1").tripped);
    }

    #[test]
    fn untouched_key_may_always_attempt() {
        let breaker = CircuitBreaker::default();
        assert!(breaker.may_attempt("never-seen"));
    }
}
