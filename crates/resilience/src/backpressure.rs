use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackpressureError {
    #[error("Too many settlements in flight ({in_flight}/{limit})")]
    Saturated { in_flight: u32, limit: u32 },
    #[error("Admission controller is closed")]
    Closed,
}

/// Held for the lifetime of an admitted settlement. Dropping it frees the
/// slot.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicU32>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounds the number of settlements running at once.
///
/// `try_admit` never waits, so an overloaded orchestrator rejects work
/// instead of queueing it.
pub struct BackpressureHandler {
    max_in_flight: u32,
    in_flight: Arc<AtomicU32>,
    rejected: AtomicU64,
    semaphore: Arc<Semaphore>,
}

impl BackpressureHandler {
    pub fn new(max_in_flight: u32) -> Self {
        Self {
            max_in_flight,
            in_flight: Arc::new(AtomicU32::new(0)),
            rejected: AtomicU64::new(0),
            semaphore: Arc::new(Semaphore::new(max_in_flight as usize)),
        }
    }

    pub fn try_admit(&self) -> Result<AdmissionPermit, BackpressureError> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                Ok(AdmissionPermit {
                    _permit: permit,
                    in_flight: self.in_flight.clone(),
                })
            }
            Err(tokio::sync::TryAcquireError::NoPermits) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(BackpressureError::Saturated {
                    in_flight: self.in_flight(),
                    limit: self.max_in_flight,
                })
            }
            Err(tokio::sync::TryAcquireError::Closed) => Err(BackpressureError::Closed),
        }
    }

    /// Runs `f` under an admission permit, rejecting immediately when full.
    pub async fn submit<F, T>(&self, f: F) -> Result<T, BackpressureError>
    where
        F: Future<Output = T>,
    {
        let permit = self.try_admit()?;
        let result = f.await;
        drop(permit);
        Ok(result)
    }

    pub fn is_accepting(&self) -> bool {
        self.semaphore.available_permits() > 0
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}
