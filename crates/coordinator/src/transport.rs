use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{CoordinationPhase, CoordinatorError, Participant};

/// Request sent to a participant for one phase vote
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub transaction_id: String,
    pub participant_id: String,
    pub phase: CoordinationPhase,
    pub payload: serde_json::Value,
    /// Absolute deadline, Unix milliseconds
    pub deadline_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub approved: bool,
    pub reason: Option<String>,
    pub response_time: Duration,
}

impl ValidationResult {
    pub fn approve(response_time: Duration) -> Self {
        Self {
            approved: true,
            reason: None,
            response_time,
        }
    }

    pub fn reject(reason: impl Into<String>, response_time: Duration) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
            response_time,
        }
    }
}

/// Wire transport to a participant. Implementations own encoding and
/// connection management.
#[async_trait]
pub trait ParticipantTransport: Send + Sync {
    async fn request_validation(
        &self,
        address: &str,
        request: ValidationRequest,
    ) -> Result<ValidationResult, CoordinatorError>;
}

/// Queries a participant for its vote
#[async_trait]
pub trait ParticipantValidator: Send + Sync {
    async fn validate(
        &self,
        participant: &Participant,
        request: ValidationRequest,
    ) -> Result<ValidationResult, CoordinatorError>;
}

/// Validator that asks each participant over a transport at its address
pub struct TransportValidator<T: ParticipantTransport> {
    transport: T,
}

impl<T: ParticipantTransport> TransportValidator<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: ParticipantTransport> ParticipantValidator for TransportValidator<T> {
    async fn validate(
        &self,
        participant: &Participant,
        request: ValidationRequest,
    ) -> Result<ValidationResult, CoordinatorError> {
        if request.participant_id != participant.id {
            return Err(CoordinatorError::Transport {
                participant_id: participant.id.clone(),
                reason: format!("request addressed to {}", request.participant_id),
            });
        }
        self.transport
            .request_validation(&participant.address, request)
            .await
    }
}
