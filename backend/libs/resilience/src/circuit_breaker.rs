/// Circuit Breaker with a sliding time window of failures and a single half-open probe
///
/// State transitions:
/// - Closed → Open: when failures inside `failure_window` reach `failure_threshold`
/// - Open → HalfOpen: after `timeout` elapses, the next caller becomes the probe
/// - HalfOpen → Closed: when `success_threshold` probes succeed in a row
/// - HalfOpen → Open: on a probe failure
use crate::metrics::CircuitBreakerMetrics;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Circuit is open, requests fail fast
    Open,
    /// Testing if service recovered, one probe at a time
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures inside the window that trip the circuit
    pub failure_threshold: u32,
    /// Sliding window in which failures are counted
    pub failure_window: Duration,
    /// Successful probes in HalfOpen needed to close the circuit
    pub success_threshold: u32,
    /// Duration to wait before transitioning from Open to HalfOpen
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::from_secs(30),
            success_threshold: 1,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<CircuitBreakerState>>,
}

struct CircuitBreakerState {
    current: CircuitState,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    /// Timestamps of failures still inside the window
    failures: VecDeque<Instant>,
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError {
    #[error("Circuit breaker is open - failing fast")]
    Open,
    #[error("Call failed: {0}")]
    CallFailed(String),
}

/// Admission to call the protected dependency.
///
/// Resolve it with [`CallPermit::success`] or [`CallPermit::failure`]. Dropping it
/// unresolved records nothing, but frees the half-open probe slot.
#[must_use = "a permit must be resolved with success() or failure()"]
pub struct CallPermit {
    breaker: CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl CallPermit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.record_success(self.probe);
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.record_failure(self.probe);
    }

    pub fn record(self, success: bool) {
        if success {
            self.success()
        } else {
            self.failure()
        }
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.resolved && self.probe {
            self.breaker.state.write().probe_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(CircuitBreakerState {
                current: CircuitState::Closed,
                consecutive_successes: 0,
                opened_at: None,
                probe_in_flight: false,
                failures: VecDeque::with_capacity(config.failure_threshold as usize),
            })),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask to make one call. Fails fast with [`CircuitBreakerError::Open`]
    /// while the circuit is open or a half-open probe is already in flight.
    pub fn try_acquire(&self) -> Result<CallPermit, CircuitBreakerError> {
        let mut state = self.state.write();

        let probe = match state.current {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled_down = state
                    .opened_at
                    .map(|opened_at| opened_at.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if !cooled_down {
                    self.record_rejected(state.current);
                    return Err(CircuitBreakerError::Open);
                }
                info!("Circuit breaker: Open → HalfOpen");
                self.transition(&mut state, CircuitState::HalfOpen);
                state.consecutive_successes = 0;
                true
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    self.record_rejected(state.current);
                    return Err(CircuitBreakerError::Open);
                }
                true
            }
        };

        if probe {
            state.probe_in_flight = true;
        }

        Ok(CallPermit {
            breaker: self.clone(),
            probe,
            resolved: false,
        })
    }

    /// Execute a future with circuit breaker protection
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let permit = self.try_acquire()?;

        match f().await {
            Ok(result) => {
                permit.success();
                Ok(result)
            }
            Err(e) => {
                permit.failure();
                Err(CircuitBreakerError::CallFailed(e.to_string()))
            }
        }
    }

    fn record_success(&self, probe: bool) {
        let mut state = self.state.write();

        if probe {
            state.probe_in_flight = false;
        }

        if state.current == CircuitState::HalfOpen && probe {
            state.consecutive_successes += 1;
            if state.consecutive_successes >= self.config.success_threshold {
                info!("Circuit breaker: HalfOpen → Closed");
                self.transition(&mut state, CircuitState::Closed);
                state.failures.clear();
                state.opened_at = None;
            }
        }
    }

    fn record_failure(&self, probe: bool) {
        let mut state = self.state.write();
        let now = Instant::now();

        if probe {
            state.probe_in_flight = false;
        }

        match state.current {
            CircuitState::Closed => {
                state.failures.push_back(now);
                self.evict_expired(&mut state, now);

                let failures = state.failures.len() as u32;
                if failures >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker: Closed → Open ({} failures within {:?})",
                        failures, self.config.failure_window
                    );
                    self.transition(&mut state, CircuitState::Open);
                    state.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen if probe => {
                warn!("Circuit breaker: HalfOpen → Open (probe failed)");
                self.transition(&mut state, CircuitState::Open);
                state.opened_at = Some(now);
                state.consecutive_successes = 0;
            }
            // Late results from calls admitted before the circuit tripped
            CircuitState::HalfOpen | CircuitState::Open => {
                debug!("Circuit breaker: ignoring failure recorded while {:?}", state.current);
            }
        }
    }

    fn evict_expired(&self, state: &mut CircuitBreakerState, now: Instant) {
        while let Some(oldest) = state.failures.front() {
            if now.duration_since(*oldest) > self.config.failure_window {
                state.failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&self, state: &mut CircuitBreakerState, to: CircuitState) {
        CircuitBreakerMetrics::record_state_transition(state.current.as_str(), to.as_str());
        if let (CircuitState::Open, Some(opened_at)) = (state.current, state.opened_at) {
            CircuitBreakerMetrics::record_open_duration(opened_at.elapsed().as_secs_f64());
        }
        state.current = to;
    }

    fn record_rejected(&self, state: CircuitState) {
        CircuitBreakerMetrics::record_call(state.as_str(), "rejected");
    }

    /// Operator reset: back to Closed with an empty failure window
    pub fn reset(&self) {
        let mut state = self.state.write();
        info!("Circuit breaker: reset to Closed (was {:?})", state.current);
        self.transition(&mut state, CircuitState::Closed);
        state.failures.clear();
        state.consecutive_successes = 0;
        state.opened_at = None;
        state.probe_in_flight = false;
    }

    /// Get current circuit state (for monitoring)
    pub fn state(&self) -> CircuitState {
        self.state.read().current
    }

    /// Failures currently counted in the sliding window
    pub fn recent_failures(&self) -> usize {
        let mut state = self.state.write();
        self.evict_expired(&mut state, Instant::now());
        state.failures.len()
    }
}
