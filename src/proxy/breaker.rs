use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::config::BreakerConfig;

/// Observable circuit state for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests are dispatched
    Closed,

    /// Target is considered down; requests are rejected or fall back
    Open,

    /// Cooldown elapsed; a single probe request is in flight
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen { probe_in_flight: bool },
}

/// Admission decision for a request against one target.
///
/// `Allow` and `Probe` carry a permit the dispatch must resolve with
/// [`BreakerPermit::succeed`] or [`BreakerPermit::fail`]. A probe permit
/// dropped unresolved (the dispatch future was cancelled) releases the probe
/// slot so the next request is admitted as the probe instead.
#[derive(Debug)]
pub enum Admission<'a> {
    /// Circuit closed, dispatch normally
    Allow(BreakerPermit<'a>),

    /// Circuit half-open, this request is the single probe
    Probe(BreakerPermit<'a>),

    /// Circuit open, do not dispatch
    Reject,
}

/// Outcome handle for one admitted dispatch
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl BreakerPermit<'_> {
    /// Record the dispatch as successful
    pub fn succeed(mut self) {
        self.resolved = true;
        self.breaker.record_success();
    }

    /// Record the dispatch as failed (timeout, connect failure, or 5xx)
    pub fn fail(mut self) {
        self.resolved = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.resolved || !self.probe {
            return;
        }

        // Probe cancelled mid-flight: release the slot without deciding the
        // circuit either way.
        let mut state = self.breaker.state.lock().expect("breaker lock poisoned");
        if let State::HalfOpen { probe_in_flight } = &mut *state {
            *probe_in_flight = false;
        }
    }
}

/// Per-target circuit breaker.
///
/// CLOSED counts consecutive failures; at the threshold the circuit opens for
/// a cooldown window during which requests are rejected without dispatch.
/// After the cooldown exactly one probe is admitted (HALF_OPEN); its outcome
/// closes or re-opens the circuit.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            state: Mutex::new(State::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    /// Decide whether a request may be dispatched right now
    pub fn try_acquire(&self) -> Admission<'_> {
        let mut state = self.state.lock().expect("breaker lock poisoned");

        match *state {
            State::Closed { .. } => Admission::Allow(self.permit(false)),
            State::Open { until } => {
                if Instant::now() >= until {
                    *state = State::HalfOpen {
                        probe_in_flight: true,
                    };
                    Admission::Probe(self.permit(true))
                } else {
                    Admission::Reject
                }
            }
            State::HalfOpen {
                ref mut probe_in_flight,
            } => {
                if *probe_in_flight {
                    Admission::Reject
                } else {
                    *probe_in_flight = true;
                    Admission::Probe(self.permit(true))
                }
            }
        }
    }

    fn permit(&self, probe: bool) -> BreakerPermit<'_> {
        BreakerPermit {
            breaker: self,
            probe,
            resolved: false,
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        *state = State::Closed {
            consecutive_failures: 0,
        };
    }

    fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");

        match *state {
            State::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.failure_threshold {
                    *state = State::Open {
                        until: Instant::now() + self.cooldown,
                    };
                } else {
                    *state = State::Closed {
                        consecutive_failures: failures,
                    };
                }
            }
            State::HalfOpen { .. } => {
                *state = State::Open {
                    until: Instant::now() + self.cooldown,
                };
            }
            State::Open { .. } => {}
        }
    }

    /// Current observable state
    pub fn state(&self) -> CircuitState {
        match *self.state.lock().expect("breaker lock poisoned") {
            State::Closed { .. } => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Per-target breaker registry.
///
/// The map is read-mostly; each breaker serializes its own updates so
/// concurrent requests to different targets never contend on one lock.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Breaker for a target, created on first use
    pub fn for_target(&self, target: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().expect("breaker registry lock poisoned");
            if let Some(breaker) = breakers.get(target) {
                return breaker.clone();
            }
        }

        let mut breakers = self.breakers.write().expect("breaker registry lock poisoned");
        breakers
            .entry(target.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    self.config.failure_threshold,
                    Duration::from_secs(self.config.cooldown_seconds),
                ))
            })
            .clone()
    }
}
