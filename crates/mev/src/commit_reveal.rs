use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::MevError;

pub type Nonce = [u8; 32];

/// Parameters for a commit-reveal submission of one transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommitRevealParams {
    pub transaction_id: String,
    /// Hex SHA-256 over the serialized transaction followed by the nonce
    pub commitment: String,
    pub nonce: Nonce,
    /// Last block at which the reveal is accepted
    pub reveal_deadline_block: u64,
    pub bond: Decimal,
}

impl CommitRevealParams {
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce)
    }
}

pub fn compute_commitment(payload: &[u8], nonce: &Nonce) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.update(nonce);
    hex::encode(hasher.finalize())
}

/// Pre-generated random nonces. Refills itself when drained.
pub struct NoncePool {
    nonces: Mutex<Vec<Nonce>>,
    capacity: usize,
}

impl NoncePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            nonces: Mutex::new(Self::generate(capacity)),
            capacity,
        }
    }

    fn generate(count: usize) -> Vec<Nonce> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let mut nonce = [0u8; 32];
                rng.fill_bytes(&mut nonce);
                nonce
            })
            .collect()
    }

    pub fn take(&self) -> Nonce {
        let mut nonces = self.nonces.lock().unwrap_or_else(PoisonError::into_inner);
        if nonces.is_empty() {
            tracing::debug!(capacity = self.capacity, "Refilling nonce pool");
            *nonces = Self::generate(self.capacity);
        }
        match nonces.pop() {
            Some(nonce) => nonce,
            None => Self::generate(1)[0],
        }
    }

    pub fn available(&self) -> usize {
        self.nonces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Commitments awaiting their reveal, keyed by transaction id
#[derive(Default)]
pub struct RevealRegistry {
    pending: Mutex<HashMap<String, CommitRevealParams>>,
}

impl RevealRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, params: CommitRevealParams) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(params.transaction_id.clone(), params);
    }

    /// Checks a reveal and clears the commitment when it matches
    pub fn verify(
        &self,
        transaction_id: &str,
        payload: &[u8],
        nonce: &Nonce,
    ) -> Result<CommitRevealParams, MevError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let params = pending
            .get(transaction_id)
            .ok_or_else(|| MevError::UnknownCommitment {
                transaction_id: transaction_id.to_string(),
            })?;

        if compute_commitment(payload, nonce) != params.commitment {
            return Err(MevError::CommitmentMismatch {
                transaction_id: transaction_id.to_string(),
            });
        }

        pending
            .remove(transaction_id)
            .ok_or_else(|| MevError::UnknownCommitment {
                transaction_id: transaction_id.to_string(),
            })
    }

    pub fn discard(&self, transaction_id: &str) -> Option<CommitRevealParams> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(transaction_id)
    }

    /// Drops commitments whose reveal deadline is behind `current_block`
    pub fn expire(&self, current_block: u64) -> Vec<String> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<String> = pending
            .values()
            .filter(|p| p.reveal_deadline_block < current_block)
            .map(|p| p.transaction_id.clone())
            .collect();

        for id in &expired {
            pending.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
