use rand::Rng;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification used to decide whether an error is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Timeout,
    Transient,
    RateLimited,
    Validation,
    CircuitOpen,
    Permanent,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Transient => "transient",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::Validation => "validation",
            ErrorCategory::CircuitOpen => "circuit_open",
            ErrorCategory::Permanent => "permanent",
        }
    }
}

/// Errors that can be classified for retry purposes
pub trait Categorize {
    fn category(&self) -> ErrorCategory;
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("non-retryable error: {0}")]
    NonRetryable(E),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::NonRetryable(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Fraction of the computed delay applied as +/- jitter
    pub jitter_ratio: f64,
    pub retryable: HashSet<ErrorCategory>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            exponential_base: 2.0,
            jitter_ratio: 0.1,
            retryable: [
                ErrorCategory::Timeout,
                ErrorCategory::Transient,
                ErrorCategory::RateLimited,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    pub fn with_exponential_base(mut self, exponential_base: f64) -> Self {
        self.exponential_base = exponential_base;
        self
    }

    pub fn with_jitter(mut self, jitter_ratio: f64) -> Self {
        self.jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_retryable(mut self, categories: impl IntoIterator<Item = ErrorCategory>) -> Self {
        self.retryable = categories.into_iter().collect();
        self
    }

    /// Unjittered, uncapped backoff in milliseconds
    fn exponential_ms(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * self.exponential_base.powi(exponent);
        // 0 * inf
        if delay_ms.is_nan() {
            0.0
        } else {
            delay_ms
        }
    }

    /// Backoff for a 1-based attempt number without jitter
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let max_ms = self.max_delay.as_millis() as f64;
        Duration::from_millis(self.exponential_ms(attempt).min(max_ms) as u64)
    }

    /// Backoff for a 1-based attempt number, jittered and capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay_ms = self.exponential_ms(attempt);

        if self.jitter_ratio > 0.0 {
            let factor = rand::thread_rng().gen_range(-self.jitter_ratio..=self.jitter_ratio);
            delay_ms *= 1.0 + factor;
        }

        let max_ms = self.max_delay.as_millis() as f64;
        Duration::from_millis(delay_ms.clamp(0.0, max_ms) as u64)
    }

    pub fn is_retryable(&self, category: ErrorCategory) -> bool {
        self.retryable.contains(&category)
    }

    pub fn should_retry<E: Categorize>(&self, error: &E, attempt: u32) -> bool {
        attempt < self.max_attempts && self.is_retryable(error.category())
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The closure receives the 1-based attempt number.
    pub async fn retry<F, Fut, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Categorize + std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !self.is_retryable(e.category()) {
                        return Err(RetryError::NonRetryable(e));
                    }
                    if attempt >= max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: e,
                        });
                    }

                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        category = e.category().as_str(),
                        error = %e,
                        "Retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
