use auction_settlement_mev::MevProtector;
use auction_settlement_resilience::{CircuitBreaker, CircuitState};
use auction_settlement_types::{SettlementError, Transaction, TransactionStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::collaborators::{CacheManager, MetricsSink, RouteOptimizer, StateManager};

/// Transactions currently owned by the orchestrator, keyed by id.
///
/// The lock is held only for the structural change itself, never across a
/// collaborator call.
#[derive(Default)]
pub struct ActiveTransactions {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl ActiveTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, transaction: Transaction) -> Result<usize, SettlementError> {
        let mut active = self.inner.write().await;
        if active.contains_key(&transaction.id) {
            return Err(SettlementError::validation(format!(
                "transaction {} is already active",
                transaction.id
            )));
        }
        active.insert(transaction.id.clone(), transaction);
        Ok(active.len())
    }

    pub async fn get(&self, id: &str) -> Option<Transaction> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.contains_key(id)
    }

    pub async fn remove(&self, id: &str) -> Option<Transaction> {
        self.inner.write().await.remove(id)
    }

    /// Removes `id` unless an emergency halt holds it
    pub async fn release(&self, id: &str) -> Release {
        let mut active = self.inner.write().await;
        match active.get(id).map(|tx| tx.status) {
            None => Release::Absent,
            Some(TransactionStatus::EmergencyHalt) => Release::Halted,
            Some(_) => active
                .remove(id)
                .map(Release::Released)
                .unwrap_or(Release::Absent),
        }
    }

    /// Write back a mutation of `id` made against `expected_version`.
    /// Returns the stored transaction after the update.
    pub async fn update<F>(
        &self,
        id: &str,
        expected_version: u64,
        mutate: F,
    ) -> Result<Transaction, SettlementError>
    where
        F: FnOnce(&mut Transaction),
    {
        let mut active = self.inner.write().await;
        let stored = active.get_mut(id).ok_or_else(|| {
            SettlementError::validation(format!("transaction {id} is no longer active"))
        })?;
        stored.update(expected_version, mutate)?;
        Ok(stored.clone())
    }

    /// Marks every active transaction `EmergencyHalt` and returns their ids
    pub async fn mark_all_halted(&self) -> Vec<String> {
        let mut active = self.inner.write().await;
        let mut ids = Vec::with_capacity(active.len());
        for (id, transaction) in active.iter_mut() {
            transaction.status = TransactionStatus::EmergencyHalt;
            transaction.version += 1;
            ids.push(id.clone());
        }
        ids.sort();
        ids
    }

    /// Removes and returns every transaction held by an emergency halt
    pub async fn drain_halted(&self) -> Vec<Transaction> {
        let mut active = self.inner.write().await;
        let ids: Vec<String> = active
            .iter()
            .filter(|(_, tx)| tx.status == TransactionStatus::EmergencyHalt)
            .map(|(id, _)| id.clone())
            .collect();
        ids.into_iter().filter_map(|id| active.remove(&id)).collect()
    }

    pub async fn snapshot(&self) -> Vec<Transaction> {
        let mut transactions: Vec<Transaction> = self.inner.read().await.values().cloned().collect();
        transactions.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.cmp(&b.id)));
        transactions
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Release {
    Released(Transaction),
    /// Frozen by an emergency halt until `resume`
    Halted,
    Absent,
}

/// What a rollback request did
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackOutcome {
    /// The transaction was active and its effects were undone
    RolledBack {
        transaction: Transaction,
        cancelled_operations: bool,
    },
    /// Left untouched for operator reconciliation
    Halted,
    /// Nothing to do: already committed, rolled back or never registered
    NotActive,
}

impl RollbackOutcome {
    pub fn rolled_back(&self) -> bool {
        matches!(self, RollbackOutcome::RolledBack { .. })
    }
}

/// Undoes failed settlements and escalates to an emergency halt when that
/// is not possible.
pub struct RecoveryManager {
    active: Arc<ActiveTransactions>,
    state: Arc<dyn StateManager>,
    optimizer: Arc<dyn RouteOptimizer>,
    cache: Arc<dyn CacheManager>,
    metrics: Arc<dyn MetricsSink>,
    mev: Arc<MevProtector>,
    breaker: Arc<CircuitBreaker>,
    halted: AtomicBool,
    halt_reason: Mutex<Option<String>>,
}

impl RecoveryManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        active: Arc<ActiveTransactions>,
        state: Arc<dyn StateManager>,
        optimizer: Arc<dyn RouteOptimizer>,
        cache: Arc<dyn CacheManager>,
        metrics: Arc<dyn MetricsSink>,
        mev: Arc<MevProtector>,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            active,
            state,
            optimizer,
            cache,
            metrics,
            mev,
            breaker,
            halted: AtomicBool::new(false),
            halt_reason: Mutex::new(None),
        }
    }

    /// Roll back `transaction_id`. A second call for the same id finds it
    /// absent from the active set and does nothing. Transactions frozen by
    /// an emergency halt are not touched.
    ///
    /// Cache invalidation is best-effort. A failure to cancel pending
    /// operations or to roll back settlement state returns
    /// `RollbackFailed`, and the transaction is put back in the active set
    /// as `EmergencyHalt` so it stays visible for recovery.
    pub async fn rollback(&self, transaction_id: &str) -> Result<RollbackOutcome, SettlementError> {
        let mut transaction = match self.active.release(transaction_id).await {
            Release::Released(transaction) => transaction,
            Release::Halted => {
                warn!(transaction_id, "Rollback skipped, transaction held by emergency halt");
                return Ok(RollbackOutcome::Halted);
            }
            Release::Absent => {
                debug!(transaction_id, "Rollback skipped, transaction not active");
                return Ok(RollbackOutcome::NotActive);
            }
        };
        self.metrics.set_active_transactions(self.active.len().await);

        info!(
            transaction_id,
            auction_id = %transaction.auction_id,
            status = %transaction.status,
            "Rolling back transaction"
        );

        let mut cancelled_operations = false;
        if self.optimizer.has_pending_operations(transaction_id).await {
            if let Err(e) = self.optimizer.cancel_operations(transaction_id).await {
                return Err(self.rollback_failed(transaction, format!("cancel failed: {e}")).await);
            }
            cancelled_operations = true;
        }

        if let Err(e) = self.state.rollback_transaction(&transaction).await {
            return Err(self
                .rollback_failed(transaction, format!("state rollback failed: {e}"))
                .await);
        }

        if let Err(e) = self.cache.invalidate_transaction_cache(transaction_id).await {
            warn!(transaction_id, error = %e, "Cache invalidation failed during rollback");
        }

        if self.mev.discard_reveal(transaction_id) {
            debug!(transaction_id, "Discarded pending MEV commitment");
        }

        transaction.status = TransactionStatus::RolledBack;
        transaction.version += 1;

        info!(transaction_id, cancelled_operations, "Transaction rolled back");
        Ok(RollbackOutcome::RolledBack {
            transaction,
            cancelled_operations,
        })
    }

    async fn rollback_failed(&self, mut transaction: Transaction, reason: String) -> SettlementError {
        error!(
            transaction_id = %transaction.id,
            error_type = "rollback_failed",
            reason = %reason,
            "Rollback failed"
        );

        let transaction_id = transaction.id.clone();
        transaction.status = TransactionStatus::EmergencyHalt;
        transaction.version += 1;
        if self.active.insert(transaction).await.is_err() {
            warn!(transaction_id = %transaction_id, "Transaction re-registered during rollback");
        }
        self.metrics.set_active_transactions(self.active.len().await);

        SettlementError::RollbackFailed {
            transaction_id,
            reason,
        }
    }

    /// Force the breaker open and freeze every active transaction.
    /// Returns the ids that were halted.
    pub async fn emergency_halt(&self, reason: &str) -> Vec<String> {
        self.breaker.force_open();
        self.metrics.set_circuit_state(CircuitState::Open);
        self.halted.store(true, Ordering::SeqCst);
        *self.halt_reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());

        let halted = self.active.mark_all_halted().await;
        error!(
            error_type = "emergency_halt",
            reason,
            halted = halted.len(),
            "Emergency halt triggered"
        );

        self.metrics
            .send_critical_alert(&format!(
                "Emergency halt: {reason} ({} transactions halted)",
                halted.len()
            ))
            .await;
        halted
    }

    /// Clear an emergency halt. The breaker is reset and halted
    /// transactions are released from the active set for manual
    /// reconciliation.
    pub async fn resume(&self) -> Vec<Transaction> {
        if !self.halted.swap(false, Ordering::SeqCst) {
            return Vec::new();
        }

        self.breaker.reset();
        self.metrics.set_circuit_state(CircuitState::Closed);
        self.halt_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let released = self.active.drain_halted().await;
        self.metrics.set_active_transactions(self.active.len().await);
        info!(released = released.len(), "Resumed after emergency halt");
        released
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.halt_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
