pub mod context;
pub mod coordinator;
pub mod participant;
pub mod protocol;
pub mod transport;


pub use context::CoordinationContext;
pub use coordinator::{CoordinationOutcome, Coordinator, RoundSummary, VoteRound};
pub use participant::{validate_address, Participant, ParticipantStatus, Vote};
pub use protocol::{ConsensusProtocol, CoordinationPhase};
pub use transport::{
    ParticipantTransport, ParticipantValidator, TransportValidator, ValidationRequest,
    ValidationResult,
};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinatorError {
    #[error("consensus threshold {threshold} must be in (0.5, 1.0]")]
    InvalidThreshold { threshold: f64 },

    #[error("minimum response rate {rate} must be in (0, 1.0]")]
    InvalidResponseRate { rate: f64 },

    #[error("invalid participant address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("participant {id} is already registered")]
    DuplicateParticipant { id: String },

    #[error("unknown participant {id}")]
    UnknownParticipant { id: String },

    #[error("no active participants")]
    NoActiveParticipants,

    #[error("only {responded} of {active} participants responded, need rate {required}")]
    InsufficientResponses {
        responded: usize,
        active: usize,
        required: f64,
    },

    #[error("transport error for {participant_id}: {reason}")]
    Transport {
        participant_id: String,
        reason: String,
    },
}

impl From<CoordinatorError> for auction_settlement_types::SettlementError {
    fn from(err: CoordinatorError) -> Self {
        use auction_settlement_types::SettlementError;
        match err {
            CoordinatorError::Transport { participant_id, reason } => {
                SettlementError::Transient {
                    component: format!("participant {participant_id}"),
                    reason,
                }
            }
            CoordinatorError::InsufficientResponses { .. }
            | CoordinatorError::NoActiveParticipants => SettlementError::ConsensusNotReached {
                phase: "collection".into(),
                ratio: 0.0,
                threshold: 0.0,
            },
            other => SettlementError::Validation {
                reason: other.to_string(),
            },
        }
    }
}
