//! Circuit breaker state machine for bus publishing.
//!
//! Transitions: closed → open after a run of consecutive failures; open →
//! half-open once the cooldown elapses, admitting a single probe; half-open
//! → closed on probe success, back to open on probe failure.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open the breaker.
    pub failure_threshold: u32,
    /// Cooldown period while the breaker remains open.
    pub open_cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_cooldown: Duration::from_secs(30),
        }
    }
}

/// Snapshot of the breaker position.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitInternalState {
    Closed { consecutive_failures: u32 },
    Open { opened_at: DateTime<Utc> },
    HalfOpen { probe_in_flight: bool },
}

/// Mutable breaker state shared across drain cycles.
#[derive(Debug, Clone)]
pub struct BreakerState {
    config: CircuitBreakerConfig,
    state: CircuitInternalState,
}

impl BreakerState {
    /// Build a closed breaker with the given thresholds.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: CircuitBreakerConfig {
                failure_threshold: config.failure_threshold.max(1),
                open_cooldown: config.open_cooldown,
            },
            state: CircuitInternalState::Closed {
                consecutive_failures: 0,
            },
        }
    }

    /// Attempt to admit one publish call.
    pub fn admit(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            CircuitInternalState::Closed { .. } => true,
            CircuitInternalState::Open { opened_at }
                if cooldown_elapsed(opened_at, now, self.config.open_cooldown) =>
            {
                self.state = CircuitInternalState::HalfOpen {
                    probe_in_flight: true,
                };
                true
            }
            CircuitInternalState::Open { .. } => false,
            CircuitInternalState::HalfOpen { probe_in_flight } => {
                if probe_in_flight {
                    false
                } else {
                    self.state = CircuitInternalState::HalfOpen {
                        probe_in_flight: true,
                    };
                    true
                }
            }
        }
    }

    /// Record a successful publish: the breaker closes.
    pub fn record_success(&mut self) {
        self.state = CircuitInternalState::Closed {
            consecutive_failures: 0,
        };
    }

    /// Record a failed publish.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.state = match self.state {
            CircuitInternalState::Closed {
                consecutive_failures,
            } => {
                let next = consecutive_failures.saturating_add(1);
                if next >= self.config.failure_threshold {
                    CircuitInternalState::Open { opened_at: now }
                } else {
                    CircuitInternalState::Closed {
                        consecutive_failures: next,
                    }
                }
            }
            CircuitInternalState::HalfOpen { .. } => CircuitInternalState::Open { opened_at: now },
            CircuitInternalState::Open { opened_at } => CircuitInternalState::Open { opened_at },
        };
    }

    /// Snapshot current breaker position.
    #[cfg(test)]
    pub fn state(&self) -> CircuitBreakerState {
        match self.state {
            CircuitInternalState::Closed { .. } => CircuitBreakerState::Closed,
            CircuitInternalState::Open { .. } => CircuitBreakerState::Open,
            CircuitInternalState::HalfOpen { .. } => CircuitBreakerState::HalfOpen,
        }
    }
}

fn cooldown_elapsed(opened_at: DateTime<Utc>, now: DateTime<Utc>, cooldown: Duration) -> bool {
    let Ok(cooldown) = chrono::Duration::from_std(cooldown) else {
        return true;
    };
    now >= opened_at + cooldown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> BreakerState {
        BreakerState::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            open_cooldown: Duration::from_secs(60),
        })
    }

    #[test]
    fn stays_closed_below_the_threshold() {
        let now = Utc::now();
        let mut state = breaker(3);
        state.record_failure(now);
        state.record_failure(now);
        assert_eq!(state.state(), CircuitBreakerState::Closed);
        assert!(state.admit(now));
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let now = Utc::now();
        let mut state = breaker(2);
        state.record_failure(now);
        state.record_failure(now);
        assert_eq!(state.state(), CircuitBreakerState::Open);
        assert!(!state.admit(now));
    }

    #[test]
    fn success_resets_the_failure_run() {
        let now = Utc::now();
        let mut state = breaker(2);
        state.record_failure(now);
        state.record_success();
        state.record_failure(now);
        assert_eq!(state.state(), CircuitBreakerState::Closed);
    }

    #[test]
    fn cooldown_admits_a_single_probe() {
        let opened = Utc::now();
        let mut state = breaker(1);
        state.record_failure(opened);
        assert!(!state.admit(opened));

        let later = opened + chrono::Duration::seconds(61);
        assert!(state.admit(later), "first probe after cooldown is admitted");
        assert!(!state.admit(later), "second call waits for the probe result");
    }

    #[test]
    fn probe_failure_reopens_probe_success_closes() {
        let opened = Utc::now();
        let later = opened + chrono::Duration::seconds(61);

        let mut state = breaker(1);
        state.record_failure(opened);
        assert!(state.admit(later));
        state.record_failure(later);
        assert_eq!(state.state(), CircuitBreakerState::Open);

        let even_later = later + chrono::Duration::seconds(61);
        assert!(state.admit(even_later));
        state.record_success();
        assert_eq!(state.state(), CircuitBreakerState::Closed);
        assert!(state.admit(even_later));
    }
}
