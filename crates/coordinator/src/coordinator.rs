use auction_settlement_types::{now_ms, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    ConsensusProtocol, CoordinationContext, CoordinationPhase, CoordinatorError, Participant,
    ValidationRequest, ValidationResult, Vote,
};

/// Tally of one vote round
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub phase: CoordinationPhase,
    pub positive: usize,
    pub negative: usize,
    pub responded: usize,
    /// Active participants when the round was judged
    pub active: usize,
    pub response_rate: f64,
    pub consensus_ratio: f64,
    pub reached: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinationOutcome {
    pub transaction_id: String,
    pub phase: CoordinationPhase,
    pub prepare: Option<RoundSummary>,
    pub commit: Option<RoundSummary>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl CoordinationOutcome {
    pub fn is_committed(&self) -> bool {
        self.phase == CoordinationPhase::Completed
    }

    /// Ratio and threshold of the round that decided the outcome
    pub fn deciding_round(&self) -> Option<&RoundSummary> {
        self.commit.as_ref().or(self.prepare.as_ref())
    }
}

/// Votes gathered in one round before the consensus check
#[derive(Clone, Debug)]
pub struct VoteRound {
    pub phase: CoordinationPhase,
    pub votes: Vec<Vote>,
    pub requested: usize,
}

impl VoteRound {
    pub fn response_rate(&self) -> f64 {
        if self.requested == 0 {
            return 0.0;
        }
        self.votes.len() as f64 / self.requested as f64
    }
}

/// Two-phase-commit coordinator over the participants of a context
pub struct Coordinator {
    context: Arc<CoordinationContext>,
    run_lock: Mutex<()>,
}

impl Coordinator {
    pub fn new(context: Arc<CoordinationContext>) -> Self {
        Self {
            context,
            run_lock: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &Arc<CoordinationContext> {
        &self.context
    }

    pub fn protocol(&self) -> &ConsensusProtocol {
        self.context.protocol()
    }

    /// Runs prepare then commit for `transaction`. Protocol runs are
    /// serialized because the context tracks one phase at a time.
    pub async fn coordinate_settlement(&self, transaction: &Transaction) -> CoordinationOutcome {
        let _run = self.run_lock.lock().await;
        let started = Instant::now();
        let tx_id = transaction.id.clone();

        self.context.begin(&tx_id).await;

        let mut outcome = CoordinationOutcome {
            transaction_id: tx_id.clone(),
            phase: CoordinationPhase::Idle,
            prepare: None,
            commit: None,
            error: None,
            duration: Duration::ZERO,
        };

        let payload = match serde_json::to_value(transaction) {
            Ok(payload) => payload,
            Err(e) => {
                return self
                    .finish(outcome, CoordinationPhase::Error, Some(e.to_string()), started)
                    .await
            }
        };

        // Phase 1: prepare. Failure aborts; nothing has been committed yet.
        self.context.transition(CoordinationPhase::Prepare).await;
        match self.run_round(CoordinationPhase::Prepare, &tx_id, &payload).await {
            Ok(summary) => {
                let reached = summary.reached;
                outcome.prepare = Some(summary);
                if !reached {
                    return self.finish(outcome, CoordinationPhase::Aborted, None, started).await;
                }
            }
            Err(CoordinatorError::InsufficientResponses { .. }) | Err(CoordinatorError::NoActiveParticipants) => {
                return self
                    .finish(
                        outcome,
                        CoordinationPhase::Aborted,
                        Some("insufficient responses in prepare phase".into()),
                        started,
                    )
                    .await
            }
            Err(e) => {
                return self
                    .finish(outcome, CoordinationPhase::Error, Some(e.to_string()), started)
                    .await
            }
        }

        // Phase 2: commit. Failure rolls back the prepared work.
        self.context.clear_votes().await;
        self.context.transition(CoordinationPhase::Commit).await;
        match self.run_round(CoordinationPhase::Commit, &tx_id, &payload).await {
            Ok(summary) => {
                let reached = summary.reached;
                outcome.commit = Some(summary);
                let phase = if reached {
                    CoordinationPhase::Completed
                } else {
                    CoordinationPhase::Rollback
                };
                self.finish(outcome, phase, None, started).await
            }
            Err(CoordinatorError::InsufficientResponses { .. }) | Err(CoordinatorError::NoActiveParticipants) => {
                self.finish(
                    outcome,
                    CoordinationPhase::Rollback,
                    Some("insufficient responses in commit phase".into()),
                    started,
                )
                .await
            }
            Err(e) => {
                self.finish(outcome, CoordinationPhase::Error, Some(e.to_string()), started)
                    .await
            }
        }
    }

    async fn finish(
        &self,
        mut outcome: CoordinationOutcome,
        phase: CoordinationPhase,
        error: Option<String>,
        started: Instant,
    ) -> CoordinationOutcome {
        self.context.transition(phase).await;
        outcome.phase = phase;
        outcome.error = error;
        outcome.duration = started.elapsed();

        match phase {
            CoordinationPhase::Completed => info!(
                transaction_id = %outcome.transaction_id,
                duration_ms = outcome.duration.as_millis() as u64,
                "Consensus reached, settlement committed"
            ),
            CoordinationPhase::Error => error!(
                transaction_id = %outcome.transaction_id,
                error = outcome.error.as_deref().unwrap_or(""),
                "Coordination failed"
            ),
            _ => warn!(
                transaction_id = %outcome.transaction_id,
                phase = %phase,
                ratio = outcome.deciding_round().map(|r| r.consensus_ratio).unwrap_or(0.0),
                threshold = self.protocol().threshold(),
                "Consensus not reached"
            ),
        }
        outcome
    }

    async fn run_round(
        &self,
        phase: CoordinationPhase,
        transaction_id: &str,
        payload: &serde_json::Value,
    ) -> Result<RoundSummary, CoordinatorError> {
        let round = self.collect_votes(phase, transaction_id, payload).await?;
        let active = self.context.active_ids().await;
        let positive = count_positive(&round.votes, &active);
        let ratio = ConsensusProtocol::consensus_ratio(positive, active.len());
        let reached = self.check_consensus(&round.votes).await;

        let summary = RoundSummary {
            phase,
            positive,
            negative: round.votes.iter().filter(|v| !v.decision).count(),
            responded: round.votes.len(),
            active: active.len(),
            response_rate: round.response_rate(),
            consensus_ratio: ratio,
            reached,
        };
        info!(
            transaction_id,
            phase = %phase,
            positive = summary.positive,
            active = summary.active,
            ratio = summary.consensus_ratio,
            reached,
            "Vote round complete"
        );
        Ok(summary)
    }

    /// Fans one validation request out to every active participant and
    /// gathers the votes that arrive before the deadline.
    pub async fn collect_votes(
        &self,
        phase: CoordinationPhase,
        transaction_id: &str,
        payload: &serde_json::Value,
    ) -> Result<VoteRound, CoordinatorError> {
        let participants = self.context.active_participants().await;
        if participants.is_empty() {
            return Err(CoordinatorError::NoActiveParticipants);
        }

        let protocol = self.protocol().clone();
        let vote_timeout = protocol.vote_timeout();
        let deadline = tokio::time::Instant::now() + vote_timeout;
        let deadline_ms = now_ms() + vote_timeout.as_millis() as u64;
        let (tx, mut rx) = mpsc::channel::<(String, ValidationResult)>(participants.len());

        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(participants.len());
        for participant in participants.iter().cloned() {
            self.context.note_connection(&participant.id).await;

            let request = ValidationRequest {
                transaction_id: transaction_id.to_string(),
                participant_id: participant.id.clone(),
                phase,
                payload: payload.clone(),
                deadline_ms,
            };
            let validator = self.context.validator();
            let tx = tx.clone();
            let attempts = protocol.retry_count() + 1;

            tasks.push(tokio::spawn(async move {
                if let Some(result) =
                    request_vote(validator, &participant, request, attempts, deadline).await
                {
                    // The receiver is gone once the round closed
                    let _ = tx.send((participant.id, result)).await;
                }
            }));
        }
        drop(tx);

        let mut votes = Vec::with_capacity(participants.len());
        while votes.len() < participants.len() {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((participant_id, result))) => {
                    let vote = Vote {
                        participant_id,
                        transaction_id: transaction_id.to_string(),
                        phase,
                        decision: result.approved,
                        timestamp_ms: now_ms(),
                        reason: result.reason,
                    };
                    self.context.push_vote(vote.clone()).await;
                    self.context.append_vote_history(&vote).await;
                    // A timely answer doubles as a heartbeat
                    self.context
                        .record_heartbeat_at(&vote.participant_id, vote.timestamp_ms)
                        .await
                        .ok();
                    votes.push(vote);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        transaction_id,
                        phase = %phase,
                        received = votes.len(),
                        expected = participants.len(),
                        "Vote collection timed out"
                    );
                    break;
                }
            }
        }

        // Late votes are excluded from this round
        for task in tasks {
            task.abort();
        }

        let round = VoteRound {
            phase,
            votes,
            requested: participants.len(),
        };
        let rate = round.response_rate();
        if rate < protocol.min_response_rate() {
            return Err(CoordinatorError::InsufficientResponses {
                responded: round.votes.len(),
                active: round.requested,
                required: protocol.min_response_rate(),
            });
        }
        Ok(round)
    }

    /// Positive votes from currently active participants over the number of
    /// currently active participants.
    pub async fn check_consensus(&self, votes: &[Vote]) -> bool {
        let active = self.context.active_ids().await;
        let positive = count_positive(votes, &active);
        self.protocol().is_reached(positive, active.len())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIVENESS
    // ═══════════════════════════════════════════════════════════════════════

    /// Marks every participant whose heartbeat is older than
    /// `heartbeat_interval * multiplier` inactive. Returns their ids.
    pub async fn monitor_health(&self) -> Vec<String> {
        self.monitor_health_at(now_ms()).await
    }

    pub async fn monitor_health_at(&self, now_ms: u64) -> Vec<String> {
        self.context.expire_heartbeats(now_ms).await
    }

    pub async fn record_heartbeat(&self, participant_id: &str) -> Result<(), CoordinatorError> {
        self.context.record_heartbeat_at(participant_id, now_ms()).await
    }

    /// Marks a participant failed, zeroes its heartbeat and appends an
    /// audit vote recording the failure.
    pub async fn handle_failure(
        &self,
        participant_id: &str,
        reason: impl Into<String>,
    ) -> Result<(), CoordinatorError> {
        let reason = reason.into();
        let audit = Vote {
            participant_id: participant_id.to_string(),
            transaction_id: self.context.transaction_id().await.unwrap_or_default(),
            phase: self.context.phase().await,
            decision: false,
            timestamp_ms: now_ms(),
            reason: Some(format!("participant failure: {reason}")),
        };

        self.context.mark_failed(participant_id, audit).await?;
        error!(participant_id, reason = %reason, "Participant failed");
        Ok(())
    }

    /// Runs `monitor_health` on a fixed interval until the handle is aborted
    pub fn spawn_health_monitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let expired = coordinator.monitor_health().await;
                if !expired.is_empty() {
                    info!(count = expired.len(), "Health monitor deactivated participants");
                }
            }
        })
    }
}

fn count_positive(votes: &[Vote], active: &[String]) -> usize {
    votes
        .iter()
        .filter(|v| v.decision && active.contains(&v.participant_id))
        .count()
}

async fn request_vote(
    validator: Arc<dyn crate::ParticipantValidator>,
    participant: &Participant,
    request: ValidationRequest,
    attempts: u32,
    deadline: tokio::time::Instant,
) -> Option<ValidationResult> {
    for attempt in 1..=attempts {
        match tokio::time::timeout_at(deadline, validator.validate(participant, request.clone())).await {
            Ok(Ok(result)) => return Some(result),
            Ok(Err(e)) => {
                warn!(
                    participant_id = %participant.id,
                    attempt,
                    error = %e,
                    "Validation request failed"
                );
            }
            // Out of time; the vote is simply missing from this round
            Err(_) => return None,
        }
    }
    None
}
