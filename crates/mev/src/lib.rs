//! Sandwich-attack risk scoring and protection selection
//!
//! `MevProtector::analyze_mev_risk` scores a settlement from five independent
//! market features and picks a mitigation from a fixed ladder:
//! commit-reveal, private bundle, batch settlement, or nothing.

pub mod commit_reveal;
pub mod features;
pub mod protector;

pub use commit_reveal::{compute_commitment, CommitRevealParams, Nonce, NoncePool};
pub use features::{FeatureWeights, MevFeatures};
pub use protector::{MevConfig, MevProtector, ProtectionResult, ProtectionStrategy, SandwichDetection};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MevError {
    #[error("no pending commitment for transaction {transaction_id}")]
    UnknownCommitment { transaction_id: String },

    #[error("reveal for transaction {transaction_id} does not match its commitment")]
    CommitmentMismatch { transaction_id: String },

    #[error("failed to serialize commitment payload: {reason}")]
    Serialization { reason: String },
}

impl From<MevError> for auction_settlement_types::SettlementError {
    fn from(err: MevError) -> Self {
        auction_settlement_types::SettlementError::Validation {
            reason: err.to_string(),
        }
    }
}
