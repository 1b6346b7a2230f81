//! Resilience primitives for auction settlement
//!
//! - `CircuitBreaker`: sliding-window failure detection with half-open probing
//! - `RetryPolicy`: exponential backoff with jitter over an allow-set of error categories
//! - `BackpressureHandler`: non-blocking admission control for concurrent settlements

pub mod backpressure;
pub mod circuit_breaker;
pub mod retry;

pub use backpressure::{AdmissionPermit, BackpressureError, BackpressureHandler};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStats, CircuitState,
};
pub use retry::{Categorize, ErrorCategory, RetryError, RetryPolicy};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Debug)]
    struct Unavailable;

    impl std::fmt::Display for Unavailable {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "service unavailable")
        }
    }

    impl Categorize for Unavailable {
        fn category(&self) -> ErrorCategory {
            ErrorCategory::Transient
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_with_retry() {
        let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_threshold: 1,
            timeout: Duration::from_millis(50),
            half_open_max_calls: 2,
            volume_threshold: 3,
            error_threshold_percentage: 50.0,
            monitoring_window: Duration::from_secs(10),
        });

        for _ in 0..3 {
            circuit_breaker
                .call(|| -> Result<(), &str> { Err("service unavailable") })
                .ok();
        }
        assert_eq!(circuit_breaker.state(), CircuitState::Open);

        let policy = RetryPolicy::new(10, Duration::from_millis(20), Duration::from_millis(200));

        let cb = &circuit_breaker;
        let result = policy
            .retry(|_| async move {
                cb
                    .call(|| -> Result<i32, Unavailable> { Ok(42) })
                    .map_err(|_| Unavailable)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(circuit_breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_admission_with_circuit_breaker() {
        let admission = Arc::new(BackpressureHandler::new(2));
        let circuit_breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            volume_threshold: 3,
            ..Default::default()
        }));

        let make_request = |id: u32| {
            let bp = admission.clone();
            let cb = circuit_breaker.clone();

            async move {
                let result = bp
                    .submit(cb.call_async(|| async move {
                        sleep(Duration::from_millis(50)).await;
                        if id % 2 == 0 {
                            Err("simulated failure")
                        } else {
                            Ok(id)
                        }
                    }))
                    .await;

                match result {
                    Ok(Ok(val)) => Ok(val),
                    Ok(Err(_)) => Err("circuit breaker error"),
                    Err(_) => Err("admission rejected"),
                }
            }
        };

        let mut handles = vec![];
        for i in 0..6 {
            handles.push(tokio::spawn(make_request(i)));
        }

        let mut rejected = 0;
        for handle in handles {
            if let Ok(Err("admission rejected")) = handle.await {
                rejected += 1;
            }
        }

        assert!(rejected > 0);
        assert_eq!(admission.in_flight(), 0);
    }
}
