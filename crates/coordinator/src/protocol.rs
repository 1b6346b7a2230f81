use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::CoordinatorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationPhase {
    Idle,
    Prepare,
    Commit,
    Completed,
    Aborted,
    Rollback,
    Error,
}

impl CoordinationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoordinationPhase::Completed
                | CoordinationPhase::Aborted
                | CoordinationPhase::Rollback
                | CoordinationPhase::Error
        )
    }

    /// Rollback and error both require the caller to undo prepared work
    pub fn requires_rollback(&self) -> bool {
        matches!(self, CoordinationPhase::Rollback | CoordinationPhase::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinationPhase::Idle => "idle",
            CoordinationPhase::Prepare => "prepare",
            CoordinationPhase::Commit => "commit",
            CoordinationPhase::Completed => "completed",
            CoordinationPhase::Aborted => "aborted",
            CoordinationPhase::Rollback => "rollback",
            CoordinationPhase::Error => "error",
        }
    }
}

impl fmt::Display for CoordinationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable consensus settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusProtocol {
    threshold: f64,
    vote_timeout: Duration,
    retry_count: u32,
    heartbeat_interval: Duration,
    heartbeat_multiplier: u32,
    min_response_rate: f64,
}

impl ConsensusProtocol {
    /// `threshold` must lie in (0.5, 1.0]
    pub fn new(threshold: f64, vote_timeout: Duration) -> Result<Self, CoordinatorError> {
        if !(threshold > 0.5 && threshold <= 1.0) {
            return Err(CoordinatorError::InvalidThreshold { threshold });
        }
        Ok(Self {
            threshold,
            vote_timeout,
            retry_count: 1,
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_multiplier: 3,
            min_response_rate: 0.5,
        })
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration, multiplier: u32) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_multiplier = multiplier.max(1);
        self
    }

    pub fn with_min_response_rate(mut self, rate: f64) -> Result<Self, CoordinatorError> {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(CoordinatorError::InvalidResponseRate { rate });
        }
        self.min_response_rate = rate;
        Ok(self)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn vote_timeout(&self) -> Duration {
        self.vote_timeout
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn min_response_rate(&self) -> f64 {
        self.min_response_rate
    }

    /// Heartbeat age beyond which a participant is considered inactive
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_interval * self.heartbeat_multiplier
    }

    pub fn consensus_ratio(positive: usize, active: usize) -> f64 {
        if active == 0 {
            return 0.0;
        }
        positive as f64 / active as f64
    }

    pub fn is_reached(&self, positive: usize, active: usize) -> bool {
        active > 0 && Self::consensus_ratio(positive, active) >= self.threshold
    }
}

impl Default for ConsensusProtocol {
    fn default() -> Self {
        Self {
            threshold: 0.67,
            vote_timeout: Duration::from_secs(5),
            retry_count: 1,
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_multiplier: 3,
            min_response_rate: 0.5,
        }
    }
}
