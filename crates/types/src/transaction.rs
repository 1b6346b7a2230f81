use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{AuctionResult, SettlementError, Side, TokenPair};

/// Metadata keys written during a settlement
pub mod metadata_keys {
    pub const MEV_STRATEGY: &str = "mev_protection";
    pub const MEV_CONFIDENCE: &str = "mev_confidence";
    pub const MEV_COMMITMENT: &str = "mev_commitment";
    pub const PHANTOM_WINNER: &str = "phantom_winner";
    pub const PHANTOM_IMPROVEMENT_BPS: &str = "phantom_improvement_bps";
    pub const PHANTOM_PARTICIPANTS: &str = "phantom_participants";
    pub const CONSENSUS_OUTCOME: &str = "consensus_outcome";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Executing,
    Committed,
    RolledBack,
    EmergencyHalt,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed
                | TransactionStatus::RolledBack
                | TransactionStatus::EmergencyHalt
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Executing => "executing",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled_back",
            TransactionStatus::EmergencyHalt => "emergency_halt",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg of a settlement through a venue
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    pub venue: String,
    pub amount: Decimal,
    pub expected_price: Decimal,
}

impl Route {
    pub fn new(
        route_id: impl Into<String>,
        venue: impl Into<String>,
        amount: Decimal,
        expected_price: Decimal,
    ) -> Self {
        Self {
            route_id: route_id.into(),
            venue: venue.into(),
            amount,
            expected_price,
        }
    }
}

/// Settlement urgency. Scales the base timeout into the deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn timeout_multiplier(&self) -> f64 {
        match self {
            Priority::Critical => 0.5,
            Priority::High => 0.75,
            Priority::Normal => 1.0,
            Priority::Low => 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// Report returned by the route executor
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub gas_used: u64,
    pub success: bool,
    pub paths: Vec<String>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(gas_used: u64, paths: Vec<String>) -> Self {
        Self {
            gas_used,
            success: true,
            paths,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            gas_used: 0,
            success: false,
            paths: vec![],
            error: Some(error.into()),
        }
    }

    /// Fold batch results into one report. Any failed batch fails the whole.
    pub fn combine(results: impl IntoIterator<Item = ExecutionResult>) -> Self {
        results
            .into_iter()
            .fold(ExecutionResult::succeeded(0, vec![]), |mut acc, r| {
                acc.gas_used += r.gas_used;
                acc.paths.extend(r.paths);
                if !r.success {
                    acc.success = false;
                    acc.error = acc.error.or(r.error);
                }
                acc
            })
    }
}

/// A settlement attempt owned by the orchestrator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub auction_id: String,
    pub status: TransactionStatus,
    pub pair: TokenPair,
    pub side: Side,
    pub price: Decimal,
    pub volume: Decimal,
    pub routes: Vec<Route>,
    /// Absolute deadline, Unix milliseconds
    pub deadline_ms: u64,
    /// Optimistic-concurrency version, bumped on every mutation
    pub version: u64,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at_ms: u64,
}

impl Transaction {
    pub fn from_auction(id: impl Into<String>, auction: &AuctionResult, deadline_ms: u64) -> Self {
        Self {
            id: id.into(),
            auction_id: auction.auction_id.clone(),
            status: TransactionStatus::Pending,
            pair: auction.pair.clone(),
            side: auction.side,
            price: auction.clearing_price,
            volume: auction.volume,
            routes: vec![],
            deadline_ms,
            version: 0,
            metadata: BTreeMap::new(),
            created_at_ms: crate::now_ms(),
        }
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn routed_volume(&self) -> Decimal {
        self.routes.iter().map(|r| r.amount).sum()
    }

    pub fn notional(&self) -> Decimal {
        self.price * self.volume
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }

    /// Apply `mutate` only if the caller observed the current version.
    pub fn update<F>(&mut self, expected_version: u64, mutate: F) -> Result<u64, SettlementError>
    where
        F: FnOnce(&mut Transaction),
    {
        if self.version != expected_version {
            return Err(SettlementError::Validation {
                reason: format!(
                    "concurrent modification of {}: expected version {}, found {}",
                    self.id, expected_version, self.version
                ),
            });
        }
        mutate(self);
        self.version += 1;
        Ok(self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_tx() -> Transaction {
        let auction = AuctionResult::new(
            "auction-7",
            TokenPair::new("ATOM", "USDC"),
            Side::Sell,
            Decimal::from_str("12.34").unwrap(),
            Decimal::from(50),
        );
        Transaction::from_auction("tx-1", &auction, 1_000)
    }

    #[test]
    fn test_priority_multipliers() {
        assert_eq!(Priority::Critical.timeout_multiplier(), 0.5);
        assert_eq!(Priority::High.timeout_multiplier(), 0.75);
        assert_eq!(Priority::Normal.timeout_multiplier(), 1.0);
        assert_eq!(Priority::Low.timeout_multiplier(), 2.0);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_versioned_update() {
        let mut tx = sample_tx();
        assert_eq!(tx.status, TransactionStatus::Pending);

        let v = tx
            .update(0, |t| t.status = TransactionStatus::Executing)
            .unwrap();
        assert_eq!(v, 1);

        // Stale writer loses
        let err = tx
            .update(0, |t| t.status = TransactionStatus::Committed)
            .unwrap_err();
        assert!(matches!(err, SettlementError::Validation { .. }));
        assert_eq!(tx.status, TransactionStatus::Executing);
    }

    #[test]
    fn test_execution_result_combine() {
        let combined = ExecutionResult::combine(vec![
            ExecutionResult::succeeded(100, vec!["a".into()]),
            ExecutionResult::failed("venue down"),
            ExecutionResult::succeeded(50, vec!["b".into()]),
        ]);

        assert!(!combined.success);
        assert_eq!(combined.gas_used, 150);
        assert_eq!(combined.paths, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(combined.error.as_deref(), Some("venue down"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Executing.is_terminal());
        assert!(TransactionStatus::Committed.is_terminal());
        assert!(TransactionStatus::RolledBack.is_terminal());
        assert!(TransactionStatus::EmergencyHalt.is_terminal());
    }
}
