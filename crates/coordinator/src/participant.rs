use serde::{Deserialize, Serialize};

use crate::{CoordinationPhase, CoordinatorError};

const ALLOWED_SCHEMES: [&str; 5] = ["http", "https", "ws", "wss", "grpc"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Active,
    Inactive,
    Failed,
}

/// One participant's decision for one phase of one transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub participant_id: String,
    pub transaction_id: String,
    pub phase: CoordinationPhase,
    pub decision: bool,
    pub timestamp_ms: u64,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub address: String,
    pub status: ParticipantStatus,
    pub last_heartbeat_ms: u64,
    /// Vote history, oldest first
    pub votes: Vec<Vote>,
    pub connection_count: u64,
}

impl Participant {
    pub fn new(id: impl Into<String>, address: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            status: ParticipantStatus::Active,
            last_heartbeat_ms: now_ms,
            votes: Vec::new(),
            connection_count: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }

    pub fn heartbeat_age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_heartbeat_ms)
    }
}

/// Accepts `scheme://host[:port][/path]` for the supported transports
pub fn validate_address(address: &str) -> Result<(), CoordinatorError> {
    let invalid = |reason: &str| CoordinatorError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let (scheme, rest) = address
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;

    if !ALLOWED_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
        return Err(invalid("unsupported scheme"));
    }

    let authority = rest.split('/').next().unwrap_or_default();
    let host = match authority.rsplit_once(':') {
        Some((host, port)) => {
            if port.parse::<u16>().is_err() {
                return Err(invalid("invalid port"));
            }
            host
        }
        None => authority,
    };

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(invalid("missing host"));
    }
    Ok(())
}
