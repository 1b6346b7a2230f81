use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    Open,
    #[error("Operation failed: {0}")]
    Operation(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
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

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl From<CircuitState> for u8 {
    fn from(state: CircuitState) -> Self {
        match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures inside the monitoring window required before tripping
    pub failure_threshold: u32,
    /// Consecutive half-open successes required to close again
    pub recovery_threshold: u32,
    /// Time spent open before a half-open probe is allowed
    pub timeout: Duration,
    /// Probe calls admitted while half-open
    pub half_open_max_calls: u32,
    /// Minimum calls inside the window before the breaker may trip
    pub volume_threshold: u32,
    /// Error rate (percent, 0-100) inside the window required to trip
    pub error_threshold_percentage: f64,
    /// Sliding window over which calls are counted
    pub monitoring_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_threshold: 2,
            timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
            volume_threshold: 10,
            error_threshold_percentage: 50.0,
            monitoring_window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CallRecord {
    at: Instant,
    success: bool,
}

/// Snapshot of the breaker's rolling window
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub window_calls: u32,
    pub window_failures: u32,
    pub error_rate: f64,
    pub forced_open: bool,
}

pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_successes: AtomicU32,
    half_open_calls: AtomicU32,
    /// Milliseconds since `epoch` at which the breaker last opened
    opened_at_ms: AtomicU64,
    forced_open: AtomicBool,
    window: Mutex<VecDeque<CallRecord>>,
    epoch: Instant,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed.into()),
            consecutive_successes: AtomicU32::new(0),
            half_open_calls: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            forced_open: AtomicBool::new(false),
            window: Mutex::new(VecDeque::new()),
            epoch: Instant::now(),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        let state_value = self.state.load(Ordering::Relaxed);
        CircuitState::from(state_value)
    }

    /// False while the breaker is open and its cooldown has not elapsed.
    ///
    /// An open breaker whose timeout elapsed moves to half-open here, so a
    /// healthy answer can mean "probing".
    pub fn is_healthy(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => self.try_transition_to_half_open(),
        }
    }

    /// Admission check for a single call. Half-open admits a bounded number
    /// of probes.
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.try_transition_to_half_open() {
                    self.half_open_calls.fetch_add(1, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                let attempts = self.half_open_calls.fetch_add(1, Ordering::SeqCst);
                attempts < self.config.half_open_max_calls
            }
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn should_attempt_reset(&self) -> bool {
        if self.forced_open.load(Ordering::SeqCst) {
            return false;
        }

        let opened_at = self.opened_at_ms.load(Ordering::Relaxed);
        let elapsed = self.now_ms().saturating_sub(opened_at);
        elapsed >= self.config.timeout.as_millis() as u64
    }

    fn try_transition_to_half_open(&self) -> bool {
        if !self.should_attempt_reset() {
            return false;
        }

        match self.state.compare_exchange(
            CircuitState::Open.into(),
            CircuitState::HalfOpen.into(),
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                self.consecutive_successes.store(0, Ordering::SeqCst);
                self.half_open_calls.store(0, Ordering::SeqCst);
                tracing::info!("Circuit breaker transitioned to HALF_OPEN");
                true
            }
            // Another caller already moved it to half-open
            Err(current) => CircuitState::from(current) == CircuitState::HalfOpen,
        }
    }

    fn push_outcome(&self, success: bool) -> (u32, u32) {
        let now = Instant::now();
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        window.push_back(CallRecord { at: now, success });

        while let Some(front) = window.front() {
            if now.duration_since(front.at) > self.config.monitoring_window {
                window.pop_front();
            } else {
                break;
            }
        }

        let total = window.len() as u32;
        let failures = window.iter().filter(|r| !r.success).count() as u32;
        (total, failures)
    }

    fn open(&self) {
        self.state.store(CircuitState::Open.into(), Ordering::SeqCst);
        self.opened_at_ms.store(self.now_ms(), Ordering::SeqCst);
        self.consecutive_successes.store(0, Ordering::SeqCst);
        self.half_open_calls.store(0, Ordering::SeqCst);
    }

    fn close(&self) {
        self.state.store(CircuitState::Closed.into(), Ordering::SeqCst);
        self.consecutive_successes.store(0, Ordering::SeqCst);
        self.half_open_calls.store(0, Ordering::SeqCst);
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn record_success(&self) {
        self.push_outcome(true);

        match self.state() {
            CircuitState::HalfOpen => {
                let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.recovery_threshold {
                    self.close();
                    tracing::info!("Circuit breaker transitioned to CLOSED");
                }
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let (total, failures) = self.push_outcome(false);

        match self.state() {
            CircuitState::Closed => {
                let error_rate = if total == 0 {
                    0.0
                } else {
                    failures as f64 * 100.0 / total as f64
                };

                if failures >= self.config.failure_threshold
                    && total >= self.config.volume_threshold
                    && error_rate >= self.config.error_threshold_percentage
                {
                    self.open();
                    tracing::warn!(
                        failures,
                        total,
                        error_rate,
                        "Circuit breaker transitioned to OPEN"
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Any failure in half-open goes back to open
                self.open();
                tracing::warn!("Circuit breaker transitioned back to OPEN from HALF_OPEN");
            }
            CircuitState::Open => {
                self.opened_at_ms.store(self.now_ms(), Ordering::SeqCst);
            }
        }
    }

    /// Trip the breaker and keep it open until `reset` is called.
    pub fn force_open(&self) {
        self.forced_open.store(true, Ordering::SeqCst);
        self.open();
        tracing::error!("Circuit breaker forced OPEN");
    }

    pub fn is_forced_open(&self) -> bool {
        self.forced_open.load(Ordering::SeqCst)
    }

    /// Operator reset: closes the breaker and clears a forced open.
    pub fn reset(&self) {
        self.forced_open.store(false, Ordering::SeqCst);
        self.close();
        tracing::info!("Circuit breaker reset to CLOSED");
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let now = Instant::now();
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let live: Vec<&CallRecord> = window
            .iter()
            .filter(|r| now.duration_since(r.at) <= self.config.monitoring_window)
            .collect();
        let window_calls = live.len() as u32;
        let window_failures = live.iter().filter(|r| !r.success).count() as u32;

        CircuitBreakerStats {
            state: self.state(),
            window_calls,
            window_failures,
            error_rate: if window_calls == 0 {
                0.0
            } else {
                window_failures as f64 * 100.0 / window_calls as f64
            },
            forced_open: self.is_forced_open(),
        }
    }

    pub fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.try_acquire() {
            return Err(CircuitBreakerError::Open);
        }

        match f() {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::Operation(e))
            }
        }
    }

    pub async fn call_async<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(CircuitBreakerError::Open);
        }

        match f().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::Operation(e))
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
