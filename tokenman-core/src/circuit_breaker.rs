//! Per-provider closed/open/half-open state machine. State transitions
//! are guarded by a mutex per provider; admission checks use an atomic
//! snapshot so the router's eligibility filter never blocks.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU8, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use crate::{config::CircuitBreakerConfig, types::InferenceProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_u8(self) -> u8 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Whether an upstream attempt counts as a breaker failure. 429 is a
/// retry trigger but never a breaker failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
}

pub fn classify(status: Option<u16>, transport_error: bool, timed_out: bool) -> AttemptOutcome {
    if transport_error || timed_out {
        return AttemptOutcome::Failure;
    }
    match status {
        Some(500 | 502 | 503 | 504) => AttemptOutcome::Failure,
        _ => AttemptOutcome::Success,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject,
}

struct Inner {
    state: Mutex<StateData>,
    snapshot: AtomicU8,
    half_open_inflight: AtomicUsize,
}

struct StateData {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_successes: usize,
}

/// A single provider's breaker.
pub struct Breaker {
    inner: Inner,
    config: CircuitBreakerConfig,
}

impl Breaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Inner {
                state: Mutex::new(StateData {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    opened_at: None,
                    half_open_successes: 0,
                }),
                snapshot: AtomicU8::new(CircuitState::Closed.as_u8()),
                half_open_inflight: AtomicUsize::new(0),
            },
            config,
        }
    }

    /// Lock-free read of the last-known state, used by the router's
    /// eligibility filter.
    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.inner.snapshot.load(Ordering::Acquire))
    }

    /// Called before dispatching an attempt. `Open` rejects immediately;
    /// `HalfOpen` admits at most `half_open_max` concurrent probes.
    pub fn admit(&self) -> Admission {
        let mut data = self.inner.state.lock().expect("breaker mutex poisoned");
        match data.state {
            CircuitState::Closed => Admission::Admit,
            CircuitState::Open => {
                if let Some(opened_at) = data.opened_at {
                    if opened_at.elapsed() >= self.config.reset_timeout {
                        data.state = CircuitState::HalfOpen;
                        data.half_open_successes = 0;
                        self.inner
                            .half_open_inflight
                            .store(0, Ordering::Release);
                        self.inner
                            .snapshot
                            .store(CircuitState::HalfOpen.as_u8(), Ordering::Release);
                        return self.admit_half_open();
                    }
                }
                Admission::Reject
            }
            CircuitState::HalfOpen => self.admit_half_open(),
        }
    }

    fn admit_half_open(&self) -> Admission {
        let mut current = self.inner.half_open_inflight.load(Ordering::Acquire);
        loop {
            if current >= self.config.half_open_max {
                return Admission::Reject;
            }
            match self.inner.half_open_inflight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Admission::Admit,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn record(&self, outcome: AttemptOutcome) {
        let mut data = self.inner.state.lock().expect("breaker mutex poisoned");
        match data.state {
            CircuitState::Closed => match outcome {
                AttemptOutcome::Success => data.consecutive_failures = 0,
                AttemptOutcome::Failure => {
                    data.consecutive_failures += 1;
                    if data.consecutive_failures >= self.config.failure_threshold {
                        data.state = CircuitState::Open;
                        data.opened_at = Some(Instant::now());
                        self.inner
                            .snapshot
                            .store(CircuitState::Open.as_u8(), Ordering::Release);
                    }
                }
            },
            CircuitState::HalfOpen => {
                self.inner
                    .half_open_inflight
                    .fetch_sub(1, Ordering::AcqRel);
                match outcome {
                    AttemptOutcome::Failure => {
                        data.state = CircuitState::Open;
                        data.opened_at = Some(Instant::now());
                        data.consecutive_failures = self.config.failure_threshold;
                        self.inner
                            .snapshot
                            .store(CircuitState::Open.as_u8(), Ordering::Release);
                    }
                    AttemptOutcome::Success => {
                        data.half_open_successes += 1;
                        if data.half_open_successes >= self.config.half_open_max {
                            data.state = CircuitState::Closed;
                            data.consecutive_failures = 0;
                            data.opened_at = None;
                            self.inner
                                .snapshot
                                .store(CircuitState::Closed.as_u8(), Ordering::Release);
                        }
                    }
                }
            }
            CircuitState::Open => {
                // A record racing in after the state already moved on
                // (e.g. a half-open probe result arriving late) is
                // ignored; the next `admit` call re-evaluates freshly.
            }
        }
    }
}

/// Registry of one [`Breaker`] per configured provider.
pub struct CircuitBreakerRegistry {
    breakers: HashMap<InferenceProvider, Breaker>,
}

impl CircuitBreakerRegistry {
    pub fn new(providers: &[InferenceProvider], config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: providers
                .iter()
                .map(|p| (*p, Breaker::new(config)))
                .collect(),
        }
    }

    pub fn state(&self, provider: InferenceProvider) -> CircuitState {
        self.breakers
            .get(&provider)
            .map(Breaker::state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn admit(&self, provider: InferenceProvider) -> Admission {
        self.breakers
            .get(&provider)
            .map(Breaker::admit)
            .unwrap_or(Admission::Admit)
    }

    pub fn record(&self, provider: InferenceProvider, outcome: AttemptOutcome) {
        if let Some(breaker) = self.breakers.get(&provider) {
            breaker.record(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(
            &[InferenceProvider::Anthropic],
            CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_millis(20),
                half_open_max: 2,
            },
        )
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let reg = registry();
        for _ in 0..3 {
            reg.record(InferenceProvider::Anthropic, AttemptOutcome::Failure);
        }
        assert_eq!(reg.state(InferenceProvider::Anthropic), CircuitState::Open);
        assert_eq!(reg.admit(InferenceProvider::Anthropic), Admission::Reject);
    }

    #[test]
    fn transitions_to_half_open_after_timeout_then_closes_on_success() {
        let reg = registry();
        for _ in 0..3 {
            reg.record(InferenceProvider::Anthropic, AttemptOutcome::Failure);
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(reg.admit(InferenceProvider::Anthropic), Admission::Admit);
        assert_eq!(
            reg.state(InferenceProvider::Anthropic),
            CircuitState::HalfOpen
        );
        reg.record(InferenceProvider::Anthropic, AttemptOutcome::Success);
        reg.record(InferenceProvider::Anthropic, AttemptOutcome::Success);
        assert_eq!(
            reg.state(InferenceProvider::Anthropic),
            CircuitState::Closed
        );
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let reg = registry();
        for _ in 0..3 {
            reg.record(InferenceProvider::Anthropic, AttemptOutcome::Failure);
        }
        std::thread::sleep(Duration::from_millis(30));
        reg.admit(InferenceProvider::Anthropic);
        reg.record(InferenceProvider::Anthropic, AttemptOutcome::Failure);
        assert_eq!(reg.state(InferenceProvider::Anthropic), CircuitState::Open);
    }

    #[test]
    fn half_open_caps_concurrent_probes() {
        let reg = registry();
        for _ in 0..3 {
            reg.record(InferenceProvider::Anthropic, AttemptOutcome::Failure);
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(reg.admit(InferenceProvider::Anthropic), Admission::Admit);
        assert_eq!(reg.admit(InferenceProvider::Anthropic), Admission::Admit);
        assert_eq!(reg.admit(InferenceProvider::Anthropic), Admission::Reject);
    }

    #[test]
    fn classify_treats_429_as_non_failure() {
        assert_eq!(
            classify(Some(429), false, false),
            AttemptOutcome::Success
        );
        assert_eq!(
            classify(Some(503), false, false),
            AttemptOutcome::Failure
        );
        assert_eq!(classify(None, true, false), AttemptOutcome::Failure);
    }
}
