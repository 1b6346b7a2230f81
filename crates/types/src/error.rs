use auction_settlement_resilience::{Categorize, ErrorCategory};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable failure kind carried by every settlement error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    CircuitBreakerOpen,
    Timeout,
    Transient,
    RateLimited,
    ParallelExecutionFailed,
    MaxRetriesExceeded,
    ConsensusNotReached,
    RollbackFailed,
    EmergencyHalt,
    Execution,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::CircuitBreakerOpen => "circuit_breaker_open",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transient => "transient",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ParallelExecutionFailed => "parallel_execution_failed",
            ErrorKind::MaxRetriesExceeded => "max_retries_exceeded",
            ErrorKind::ConsensusNotReached => "consensus_not_reached",
            ErrorKind::RollbackFailed => "rollback_failed",
            ErrorKind::EmergencyHalt => "emergency_halt",
            ErrorKind::Execution => "execution_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("circuit breaker is open")]
    CircuitBreakerOpen,

    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("transient failure in {component}: {reason}")]
    Transient { component: String, reason: String },

    #[error("rate limited: {in_flight}/{limit} settlements in flight")]
    RateLimited { in_flight: u32, limit: u32 },

    #[error("parallel execution failed: {failed} of {batches} batches errored: {reason}")]
    ParallelExecutionFailed {
        failed: usize,
        batches: usize,
        reason: String,
    },

    #[error("gave up after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error("consensus not reached in {phase} phase: {ratio:.3} < {threshold:.3}")]
    ConsensusNotReached {
        phase: String,
        ratio: f64,
        threshold: f64,
    },

    #[error("rollback of {transaction_id} failed: {reason}")]
    RollbackFailed {
        transaction_id: String,
        reason: String,
    },

    #[error("emergency halt: {reason}")]
    EmergencyHalt { reason: String },

    #[error("execution failed: {reason}")]
    Execution { reason: String },
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Validation { .. } => ErrorKind::Validation,
            SettlementError::CircuitBreakerOpen => ErrorKind::CircuitBreakerOpen,
            SettlementError::Timeout { .. } => ErrorKind::Timeout,
            SettlementError::Transient { .. } => ErrorKind::Transient,
            SettlementError::RateLimited { .. } => ErrorKind::RateLimited,
            SettlementError::ParallelExecutionFailed { .. } => ErrorKind::ParallelExecutionFailed,
            SettlementError::MaxRetriesExceeded { .. } => ErrorKind::MaxRetriesExceeded,
            SettlementError::ConsensusNotReached { .. } => ErrorKind::ConsensusNotReached,
            SettlementError::RollbackFailed { .. } => ErrorKind::RollbackFailed,
            SettlementError::EmergencyHalt { .. } => ErrorKind::EmergencyHalt,
            SettlementError::Execution { .. } => ErrorKind::Execution,
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        SettlementError::Validation {
            reason: reason.into(),
        }
    }

    pub fn transient(component: impl Into<String>, reason: impl Into<String>) -> Self {
        SettlementError::Transient {
            component: component.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        SettlementError::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }
}

impl Categorize for SettlementError {
    fn category(&self) -> ErrorCategory {
        match self {
            SettlementError::Timeout { .. } => ErrorCategory::Timeout,
            SettlementError::Transient { .. } => ErrorCategory::Transient,
            SettlementError::RateLimited { .. } => ErrorCategory::RateLimited,
            SettlementError::Validation { .. } => ErrorCategory::Validation,
            SettlementError::CircuitBreakerOpen => ErrorCategory::CircuitOpen,
            _ => ErrorCategory::Permanent,
        }
    }
}

/// Serializable snapshot of a settlement error
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SettlementError> for ErrorReport {
    fn from(err: &SettlementError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
