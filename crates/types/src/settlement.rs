use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ErrorReport, ExecutionResult, SettlementError, TransactionStatus};

/// Outcome of one `orchestrate_settlement` call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub transaction_id: String,
    pub auction_id: String,
    pub success: bool,
    pub status: TransactionStatus,
    pub execution: Option<ExecutionResult>,
    /// Name of the MEV protection applied
    pub protection: String,
    pub mev_confidence: f64,
    pub phantom_improvement_bps: Option<Decimal>,
    pub final_price: Decimal,
    pub final_volume: Decimal,
    pub duration_ms: u64,
    pub error: Option<ErrorReport>,
}

impl SettlementResult {
    /// Report for a settlement that raised instead of completing
    pub fn failed(
        transaction_id: impl Into<String>,
        auction_id: impl Into<String>,
        error: &SettlementError,
        duration_ms: u64,
    ) -> Self {
        let status = match error {
            SettlementError::EmergencyHalt { .. } | SettlementError::RollbackFailed { .. } => {
                TransactionStatus::EmergencyHalt
            }
            SettlementError::Validation { .. }
            | SettlementError::CircuitBreakerOpen
            | SettlementError::RateLimited { .. } => TransactionStatus::Pending,
            _ => TransactionStatus::RolledBack,
        };

        Self {
            transaction_id: transaction_id.into(),
            auction_id: auction_id.into(),
            success: false,
            status,
            execution: None,
            protection: String::from("none"),
            mev_confidence: 0.0,
            phantom_improvement_bps: None,
            final_price: Decimal::ZERO,
            final_volume: Decimal::ZERO,
            duration_ms,
            error: Some(ErrorReport::from(error)),
        }
    }
}

/// Per-call switches layered over the orchestrator's configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementOverrides {
    pub parallel_execution: Option<bool>,
    pub phantom_auction: Option<bool>,
    pub require_consensus: Option<bool>,
    pub mev_protection: Option<bool>,
    pub timeout_ms: Option<u64>,
}

impl SettlementOverrides {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_parallel_execution(mut self, enabled: bool) -> Self {
        self.parallel_execution = Some(enabled);
        self
    }

    pub fn with_phantom_auction(mut self, enabled: bool) -> Self {
        self.phantom_auction = Some(enabled);
        self
    }

    pub fn with_consensus(mut self, required: bool) -> Self {
        self.require_consensus = Some(required);
        self
    }

    pub fn with_mev_protection(mut self, enabled: bool) -> Self {
        self.mev_protection = Some(enabled);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Running totals maintained by the orchestrator
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementTotals {
    pub settlements: u64,
    pub settled_volume: Decimal,
    pub failures: u64,
    pub rollbacks: u64,
    pub emergency_halts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_failed_result_status_mapping() {
        let halted = SettlementResult::failed(
            "tx",
            "auction",
            &SettlementError::RollbackFailed {
                transaction_id: "tx".into(),
                reason: "state store down".into(),
            },
            12,
        );
        assert!(!halted.success);
        assert_eq!(halted.status, TransactionStatus::EmergencyHalt);

        let rejected =
            SettlementResult::failed("", "auction", &SettlementError::CircuitBreakerOpen, 0);
        assert_eq!(rejected.status, TransactionStatus::Pending);
        assert_eq!(
            rejected.error.map(|e| e.kind),
            Some(ErrorKind::CircuitBreakerOpen)
        );

        let rolled_back = SettlementResult::failed(
            "tx",
            "auction",
            &SettlementError::Execution {
                reason: "reverted".into(),
            },
            40,
        );
        assert_eq!(rolled_back.status, TransactionStatus::RolledBack);
    }

    #[test]
    fn test_overrides_builder() {
        let overrides = SettlementOverrides::none()
            .with_parallel_execution(false)
            .with_timeout_ms(500);

        assert_eq!(overrides.parallel_execution, Some(false));
        assert_eq!(overrides.timeout_ms, Some(500));
        assert_eq!(overrides.phantom_auction, None);
    }
}
