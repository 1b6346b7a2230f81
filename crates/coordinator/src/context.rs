use auction_settlement_types::now_ms;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::participant::validate_address;
use crate::{
    ConsensusProtocol, CoordinationPhase, CoordinatorError, Participant, ParticipantStatus,
    ParticipantValidator, Vote,
};

#[derive(Debug, Clone)]
struct CoordinationState {
    transaction_id: Option<String>,
    phase: CoordinationPhase,
    /// Votes for the current phase only
    votes: Vec<Vote>,
}

/// Owns the participant registry and the state of the protocol run in
/// progress. Locks are held only for the structural mutation.
pub struct CoordinationContext {
    participants: RwLock<HashMap<String, Participant>>,
    protocol: ConsensusProtocol,
    state: Mutex<CoordinationState>,
    validator: Arc<dyn ParticipantValidator>,
}

impl CoordinationContext {
    pub fn new(protocol: ConsensusProtocol, validator: Arc<dyn ParticipantValidator>) -> Self {
        Self {
            participants: RwLock::new(HashMap::new()),
            protocol,
            state: Mutex::new(CoordinationState {
                transaction_id: None,
                phase: CoordinationPhase::Idle,
                votes: Vec::new(),
            }),
            validator,
        }
    }

    pub fn protocol(&self) -> &ConsensusProtocol {
        &self.protocol
    }

    pub fn validator(&self) -> Arc<dyn ParticipantValidator> {
        self.validator.clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REGISTRY
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn register_participant(
        &self,
        id: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<(), CoordinatorError> {
        let id = id.into();
        let address = address.into();
        validate_address(&address)?;

        let mut participants = self.participants.write().await;
        if participants.contains_key(&id) {
            return Err(CoordinatorError::DuplicateParticipant { id });
        }

        info!(participant_id = %id, address = %address, "Participant registered");
        participants.insert(id.clone(), Participant::new(id, address, now_ms()));
        Ok(())
    }

    pub async fn unregister_participant(&self, id: &str) -> Result<Participant, CoordinatorError> {
        let removed = self
            .participants
            .write()
            .await
            .remove(id)
            .ok_or_else(|| CoordinatorError::UnknownParticipant { id: id.to_string() })?;

        info!(participant_id = %id, "Participant unregistered");
        Ok(removed)
    }

    pub async fn participant(&self, id: &str) -> Option<Participant> {
        self.participants.read().await.get(id).cloned()
    }

    pub async fn participants(&self) -> Vec<Participant> {
        let mut all: Vec<Participant> = self.participants.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Snapshot of the participants currently eligible to vote
    pub async fn active_participants(&self) -> Vec<Participant> {
        let mut active: Vec<Participant> = self
            .participants
            .read()
            .await
            .values()
            .filter(|p| p.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        active
    }

    pub async fn active_ids(&self) -> Vec<String> {
        self.active_participants()
            .await
            .into_iter()
            .map(|p| p.id)
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        self.participants
            .read()
            .await
            .values()
            .filter(|p| p.is_active())
            .count()
    }

    pub async fn record_heartbeat_at(&self, id: &str, at_ms: u64) -> Result<(), CoordinatorError> {
        let mut participants = self.participants.write().await;
        let participant = participants
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::UnknownParticipant { id: id.to_string() })?;

        match participant.status {
            ParticipantStatus::Failed => {
                debug!(participant_id = %id, "Ignoring heartbeat from failed participant");
            }
            ParticipantStatus::Inactive => {
                participant.last_heartbeat_ms = at_ms;
                participant.status = ParticipantStatus::Active;
                info!(participant_id = %id, "Participant reactivated by heartbeat");
            }
            ParticipantStatus::Active => {
                participant.last_heartbeat_ms = participant.last_heartbeat_ms.max(at_ms);
            }
        }
        Ok(())
    }

    pub(crate) async fn note_connection(&self, id: &str) {
        if let Some(p) = self.participants.write().await.get_mut(id) {
            p.connection_count += 1;
        }
    }

    /// Marks stale active participants inactive
    pub(crate) async fn expire_heartbeats(&self, now_ms: u64) -> Vec<String> {
        let timeout_ms = self.protocol.heartbeat_timeout().as_millis() as u64;
        let mut expired = Vec::new();

        let mut participants = self.participants.write().await;
        for participant in participants.values_mut() {
            if participant.is_active() && participant.heartbeat_age_ms(now_ms) > timeout_ms {
                participant.status = ParticipantStatus::Inactive;
                warn!(
                    participant_id = %participant.id,
                    heartbeat_age_ms = participant.heartbeat_age_ms(now_ms),
                    "Participant marked inactive"
                );
                expired.push(participant.id.clone());
            }
        }
        expired.sort();
        expired
    }

    pub(crate) async fn mark_failed(&self, id: &str, audit: Vote) -> Result<(), CoordinatorError> {
        let mut participants = self.participants.write().await;
        let participant = participants
            .get_mut(id)
            .ok_or_else(|| CoordinatorError::UnknownParticipant { id: id.to_string() })?;

        participant.status = ParticipantStatus::Failed;
        participant.last_heartbeat_ms = 0;
        participant.votes.push(audit);
        Ok(())
    }

    pub(crate) async fn append_vote_history(&self, vote: &Vote) {
        if let Some(p) = self.participants.write().await.get_mut(&vote.participant_id) {
            p.votes.push(vote.clone());
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PROTOCOL STATE
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn phase(&self) -> CoordinationPhase {
        self.state.lock().await.phase
    }

    pub async fn transaction_id(&self) -> Option<String> {
        self.state.lock().await.transaction_id.clone()
    }

    /// Votes collected for the current phase
    pub async fn current_votes(&self) -> Vec<Vote> {
        self.state.lock().await.votes.clone()
    }

    pub(crate) async fn begin(&self, transaction_id: &str) {
        let mut state = self.state.lock().await;
        state.transaction_id = Some(transaction_id.to_string());
        state.phase = CoordinationPhase::Idle;
        state.votes.clear();
    }

    pub(crate) async fn transition(&self, phase: CoordinationPhase) {
        let mut state = self.state.lock().await;
        debug!(
            transaction_id = state.transaction_id.as_deref().unwrap_or(""),
            from = %state.phase,
            to = %phase,
            "Coordination phase transition"
        );
        state.phase = phase;
    }

    pub(crate) async fn clear_votes(&self) {
        self.state.lock().await.votes.clear();
    }

    pub(crate) async fn push_vote(&self, vote: Vote) {
        self.state.lock().await.votes.push(vote);
    }
}
