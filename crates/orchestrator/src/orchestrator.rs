use auction_settlement_coordinator::{CoordinationOutcome, Coordinator};
use auction_settlement_metrics::{SettlementPhase, SettlementSpan};
use auction_settlement_mev::{MevConfig, MevProtector, ProtectionResult, ProtectionStrategy};
use auction_settlement_phantom::{
    BidSource, PhantomAuction, PhantomAuctionConfig, PhantomAuctionResult, PhantomBaseline,
};
use auction_settlement_resilience::{
    BackpressureError, BackpressureHandler, CircuitBreaker, CircuitBreakerConfig, RetryPolicy,
};
use auction_settlement_types::{
    metadata_keys, now_ms, AuctionResult, Priority, SettlementError, SettlementOverrides,
    SettlementResult, SettlementTotals, Transaction, TransactionStatus,
};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

use crate::collaborators::{
    CacheManager, MetricsSink, NoopCacheManager, NoopMetricsSink, RouteOptimizer, StateManager,
};
use crate::executor::{ExecutionReport, RouteExecutor};
use crate::recovery::{ActiveTransactions, RecoveryManager, Release, RollbackOutcome};
use crate::validator::TransactionValidator;

/// Configuration for the orchestrator
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Settlement timeout at `Priority::Normal`
    pub base_timeout: Duration,

    /// Fan out independent route batches
    pub parallel_execution: bool,

    /// Run a phantom auction for price improvement when a bid source is set
    pub phantom_auction: bool,

    /// Require two-phase-commit consensus before execution
    pub require_consensus: bool,

    pub mev_protection: bool,

    /// Settlements admitted at once
    pub max_concurrent_settlements: u32,

    pub max_parallel_batches: usize,
}

impl OrchestratorConfig {
    pub fn with_base_timeout(mut self, timeout: Duration) -> Self {
        self.base_timeout = timeout;
        self
    }

    pub fn with_parallel_execution(mut self, enabled: bool) -> Self {
        self.parallel_execution = enabled;
        self
    }

    pub fn with_phantom_auction(mut self, enabled: bool) -> Self {
        self.phantom_auction = enabled;
        self
    }

    pub fn with_consensus(mut self, required: bool) -> Self {
        self.require_consensus = required;
        self
    }

    pub fn with_mev_protection(mut self, enabled: bool) -> Self {
        self.mev_protection = enabled;
        self
    }

    pub fn with_max_concurrent_settlements(mut self, max: u32) -> Self {
        self.max_concurrent_settlements = max;
        self
    }

    pub fn with_max_parallel_batches(mut self, max: usize) -> Self {
        self.max_parallel_batches = max;
        self
    }

    /// Settlement timeout scaled by priority
    pub fn timeout_for(&self, priority: Priority, override_ms: Option<u64>) -> Duration {
        let base = override_ms
            .map(Duration::from_millis)
            .unwrap_or(self.base_timeout);
        base.mul_f64(priority.timeout_multiplier())
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(30),
            parallel_execution: true,
            phantom_auction: true,
            require_consensus: false,
            mev_protection: true,
            max_concurrent_settlements: 100,
            max_parallel_batches: 4,
        }
    }
}

/// Switches for one settlement after overrides are applied
#[derive(Clone, Copy, Debug)]
struct SettlementPlan {
    parallel: bool,
    phantom: bool,
    consensus: bool,
    mev: bool,
    timeout: Duration,
}

/// Builder error
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Builder for SettlementOrchestrator
pub struct SettlementOrchestratorBuilder {
    config: OrchestratorConfig,
    circuit_breaker: CircuitBreakerConfig,
    retry_policy: RetryPolicy,
    mev_config: MevConfig,
    phantom_config: PhantomAuctionConfig,
    validator: TransactionValidator,
    state_manager: Option<Arc<dyn StateManager>>,
    route_optimizer: Option<Arc<dyn RouteOptimizer>>,
    cache_manager: Option<Arc<dyn CacheManager>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    coordinator: Option<Arc<Coordinator>>,
    bid_source: Option<Arc<dyn BidSource>>,
}

impl SettlementOrchestratorBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry_policy: RetryPolicy::default(),
            mev_config: MevConfig::default(),
            phantom_config: PhantomAuctionConfig::default(),
            validator: TransactionValidator::default(),
            state_manager: None,
            route_optimizer: None,
            cache_manager: None,
            metrics: None,
            coordinator: None,
            bid_source: None,
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_mev_config(mut self, config: MevConfig) -> Self {
        self.mev_config = config;
        self
    }

    pub fn with_phantom_config(mut self, config: PhantomAuctionConfig) -> Self {
        self.phantom_config = config;
        self
    }

    pub fn with_validator(mut self, validator: TransactionValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_state_manager(mut self, state_manager: Arc<dyn StateManager>) -> Self {
        self.state_manager = Some(state_manager);
        self
    }

    pub fn with_route_optimizer(mut self, route_optimizer: Arc<dyn RouteOptimizer>) -> Self {
        self.route_optimizer = Some(route_optimizer);
        self
    }

    pub fn with_cache_manager(mut self, cache_manager: Arc<dyn CacheManager>) -> Self {
        self.cache_manager = Some(cache_manager);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_coordinator(mut self, coordinator: Arc<Coordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn with_bid_source(mut self, bid_source: Arc<dyn BidSource>) -> Self {
        self.bid_source = Some(bid_source);
        self
    }

    /// Build the SettlementOrchestrator, validating that all required fields are set
    pub fn build(self) -> Result<SettlementOrchestrator, BuilderError> {
        let state = self.state_manager.ok_or_else(|| BuilderError::MissingField {
            field: "state_manager".to_string(),
        })?;
        let optimizer = self.route_optimizer.ok_or_else(|| BuilderError::MissingField {
            field: "route_optimizer".to_string(),
        })?;
        if self.config.require_consensus && self.coordinator.is_none() {
            return Err(BuilderError::MissingField {
                field: "coordinator".to_string(),
            });
        }
        self.phantom_config
            .validate()
            .map_err(|e| BuilderError::InvalidConfig {
                reason: e.to_string(),
            })?;
        if self.config.max_concurrent_settlements == 0 {
            return Err(BuilderError::InvalidConfig {
                reason: "max_concurrent_settlements must be at least 1".to_string(),
            });
        }

        let cache = self
            .cache_manager
            .unwrap_or_else(|| Arc::new(NoopCacheManager));
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NoopMetricsSink));
        let breaker = Arc::new(CircuitBreaker::new(self.circuit_breaker));
        let mev = Arc::new(MevProtector::new(self.mev_config));
        let active = Arc::new(ActiveTransactions::new());

        let recovery = RecoveryManager::new(
            active.clone(),
            state.clone(),
            optimizer.clone(),
            cache,
            metrics.clone(),
            mev.clone(),
            breaker.clone(),
        );

        Ok(SettlementOrchestrator {
            executor: RouteExecutor::new(
                optimizer.clone(),
                self.retry_policy,
                self.config.max_parallel_batches,
            ),
            admission: BackpressureHandler::new(self.config.max_concurrent_settlements),
            phantom: PhantomAuction::new(self.phantom_config),
            validator: self.validator,
            bid_source: self.bid_source,
            coordinator: self.coordinator,
            config: self.config,
            state,
            optimizer,
            metrics,
            breaker,
            mev,
            active,
            recovery,
            totals: Mutex::new(SettlementTotals::default()),
        })
    }
}

impl Default for SettlementOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives an auction result through MEV analysis, preparation, optional
/// consensus, optional phantom auction, execution and finalization, rolling
/// back on any failure.
pub struct SettlementOrchestrator {
    config: OrchestratorConfig,
    validator: TransactionValidator,
    mev: Arc<MevProtector>,
    phantom: PhantomAuction,
    bid_source: Option<Arc<dyn BidSource>>,
    coordinator: Option<Arc<Coordinator>>,
    executor: RouteExecutor,
    state: Arc<dyn StateManager>,
    optimizer: Arc<dyn RouteOptimizer>,
    metrics: Arc<dyn MetricsSink>,
    breaker: Arc<CircuitBreaker>,
    admission: BackpressureHandler,
    active: Arc<ActiveTransactions>,
    recovery: RecoveryManager,
    totals: Mutex<SettlementTotals>,
}

impl SettlementOrchestrator {
    pub fn builder() -> SettlementOrchestratorBuilder {
        SettlementOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn mev_protector(&self) -> &Arc<MevProtector> {
        &self.mev
    }

    /// Settle one auction result. Errors are structured and the
    /// transaction has already been rolled back when one is returned.
    pub async fn orchestrate_settlement(
        &self,
        auction: &AuctionResult,
        priority: Priority,
        overrides: SettlementOverrides,
    ) -> Result<SettlementResult, SettlementError> {
        let transaction_id = uuid::Uuid::new_v4().to_string();
        self.orchestrate_with_id(&transaction_id, auction, priority, &overrides)
            .await
    }

    /// Like `orchestrate_settlement`, but a failure is reported as a
    /// `SettlementResult` with `success == false`.
    pub async fn settle(
        &self,
        auction: &AuctionResult,
        priority: Priority,
        overrides: SettlementOverrides,
    ) -> SettlementResult {
        let started = Instant::now();
        let transaction_id = uuid::Uuid::new_v4().to_string();
        match self
            .orchestrate_with_id(&transaction_id, auction, priority, &overrides)
            .await
        {
            Ok(result) => result,
            Err(e) => SettlementResult::failed(
                transaction_id,
                auction.auction_id.clone(),
                &e,
                started.elapsed().as_millis() as u64,
            ),
        }
    }

    /// Settle independent auction results concurrently
    pub async fn settle_batch(
        &self,
        auctions: &[AuctionResult],
        priority: Priority,
        overrides: SettlementOverrides,
    ) -> Vec<SettlementResult> {
        info!(count = auctions.len(), "Settling batch");
        let settlements = auctions
            .iter()
            .map(|auction| self.settle(auction, priority, overrides.clone()));
        join_all(settlements).await
    }

    async fn orchestrate_with_id(
        &self,
        transaction_id: &str,
        auction: &AuctionResult,
        priority: Priority,
        overrides: &SettlementOverrides,
    ) -> Result<SettlementResult, SettlementError> {
        let span = SettlementSpan::new(transaction_id, auction.auction_id.clone());
        self.run_settlement(transaction_id, auction, priority, overrides)
            .instrument(span.span())
            .await
    }

    fn plan(
        &self,
        overrides: &SettlementOverrides,
        priority: Priority,
    ) -> Result<SettlementPlan, SettlementError> {
        let plan = SettlementPlan {
            parallel: overrides
                .parallel_execution
                .unwrap_or(self.config.parallel_execution),
            phantom: overrides.phantom_auction.unwrap_or(self.config.phantom_auction),
            consensus: overrides
                .require_consensus
                .unwrap_or(self.config.require_consensus),
            mev: overrides.mev_protection.unwrap_or(self.config.mev_protection),
            timeout: self.config.timeout_for(priority, overrides.timeout_ms),
        };

        if plan.consensus && self.coordinator.is_none() {
            return Err(SettlementError::validation(
                "consensus requested but no coordinator is configured",
            ));
        }
        if plan.timeout.is_zero() {
            return Err(SettlementError::validation("settlement timeout must be positive"));
        }
        Ok(plan)
    }

    async fn run_settlement(
        &self,
        transaction_id: &str,
        auction: &AuctionResult,
        priority: Priority,
        overrides: &SettlementOverrides,
    ) -> Result<SettlementResult, SettlementError> {
        let started = Instant::now();

        if self.recovery.is_halted() {
            return Err(self.halted_error());
        }

        // Pure checks: no side effects, no breaker accounting
        let plan = self.plan(overrides, priority)?;
        self.validator.validate_auction(auction)?;

        let _permit = self.admission.try_admit().map_err(|e| match e {
            BackpressureError::Saturated { in_flight, limit } => {
                warn!(in_flight, limit, "Settlement rejected, orchestrator saturated");
                SettlementError::RateLimited { in_flight, limit }
            }
            BackpressureError::Closed => SettlementError::RateLimited {
                in_flight: self.admission.in_flight(),
                limit: self.admission.max_in_flight(),
            },
        })?;

        if !self.breaker.try_acquire() {
            self.metrics.record_circuit_rejection();
            warn!(state = %self.breaker.state().as_str(), "Settlement rejected, circuit breaker open");
            return Err(SettlementError::CircuitBreakerOpen);
        }
        self.metrics.set_circuit_state(self.breaker.state());
        self.metrics.record_settlement_started();

        info!(
            auction_id = %auction.auction_id,
            priority = %priority.as_str(),
            timeout_ms = plan.timeout.as_millis() as u64,
            "Starting settlement"
        );

        let protection = if plan.mev {
            let phase_started = Instant::now();
            let protection = self.mev.analyze_mev_risk(transaction_id, auction);
            self.metrics
                .record_phase(SettlementPhase::MevAnalysis, phase_started.elapsed());
            protection
        } else {
            ProtectionResult::unprotected()
        };
        self.metrics.record_protection(&protection);

        let deadline = started + plan.timeout;
        let deadline_ms = now_ms() + plan.timeout.as_millis() as u64;

        let outcome = self
            .settle_transaction(transaction_id, auction, &protection, &plan, deadline, deadline_ms)
            .await;

        match outcome {
            Ok(settled) => {
                self.breaker.record_success();
                self.metrics.set_circuit_state(self.breaker.state());

                {
                    let mut totals = self.totals.lock().await;
                    totals.settlements += 1;
                    totals.settled_volume += settled.transaction.volume;
                }

                let result = SettlementResult {
                    transaction_id: transaction_id.to_string(),
                    auction_id: auction.auction_id.clone(),
                    success: true,
                    status: TransactionStatus::Committed,
                    execution: Some(settled.report.result),
                    protection: protection.strategy.as_str().to_string(),
                    mev_confidence: protection.detection.confidence,
                    phantom_improvement_bps: settled
                        .phantom
                        .as_ref()
                        .filter(|p| p.improved())
                        .map(|p| p.improvement_bps),
                    final_price: settled.transaction.price,
                    final_volume: settled.transaction.volume,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                };
                self.metrics.record_settlement_metrics(&result).await;

                info!(
                    final_price = %result.final_price,
                    final_volume = %result.final_volume,
                    duration_ms = result.duration_ms,
                    "Settlement committed"
                );
                Ok(result)
            }
            Err(err) => {
                let err = self.fail(transaction_id, err).await;

                let mut result = SettlementResult::failed(
                    transaction_id,
                    auction.auction_id.clone(),
                    &err,
                    started.elapsed().as_millis() as u64,
                );
                result.protection = protection.strategy.as_str().to_string();
                result.mev_confidence = protection.detection.confidence;
                self.metrics.record_settlement_metrics(&result).await;
                Err(err)
            }
        }
    }

    /// Steps 3 to 7 of a settlement. Any error returned here leaves the
    /// transaction for `fail` to roll back.
    async fn settle_transaction(
        &self,
        transaction_id: &str,
        auction: &AuctionResult,
        protection: &ProtectionResult,
        plan: &SettlementPlan,
        deadline: Instant,
        deadline_ms: u64,
    ) -> Result<Settled, SettlementError> {
        // Prepare
        let phase_started = Instant::now();
        let mut transaction = within(
            deadline,
            "create transaction",
            self.state.create_transaction(transaction_id, auction, deadline_ms),
        )
        .await?;
        if transaction.id != transaction_id {
            return Err(SettlementError::validation(format!(
                "state manager returned transaction {} for {}",
                transaction.id, transaction_id
            )));
        }

        transaction.set_metadata(metadata_keys::MEV_STRATEGY, protection.strategy.as_str());
        transaction.set_metadata(metadata_keys::MEV_CONFIDENCE, protection.detection.confidence);
        if let ProtectionStrategy::CommitReveal(params) = &protection.strategy {
            transaction.set_metadata(metadata_keys::MEV_COMMITMENT, params.commitment.clone());
        }

        let active = self.active.insert(transaction.clone()).await?;
        self.metrics.set_active_transactions(active);
        debug!(active, "Transaction registered");

        within(
            deadline,
            "validate transaction",
            self.state.validate_transaction(&transaction),
        )
        .await?;
        self.metrics
            .record_phase(SettlementPhase::Preparation, phase_started.elapsed());

        // Route
        let phase_started = Instant::now();
        let routes = within(
            deadline,
            "prepare routes",
            self.optimizer.prepare_routes(&transaction),
        )
        .await?;
        transaction = self
            .active
            .update(transaction_id, transaction.version, |tx| tx.routes = routes)
            .await?;
        self.validator.validate_routes(&transaction)?;
        self.metrics
            .record_phase(SettlementPhase::Routing, phase_started.elapsed());

        if plan.consensus {
            transaction = self.run_consensus(transaction, deadline).await?;
        }

        let phantom = if plan.phantom {
            match &self.bid_source {
                Some(source) => {
                    let (updated, result) = self.run_phantom(transaction, source.as_ref()).await?;
                    transaction = updated;
                    Some(result)
                }
                None => {
                    debug!("Phantom auction enabled but no bid source configured");
                    None
                }
            }
        } else {
            None
        };

        // Execute
        let phase_started = Instant::now();
        transaction = self
            .active
            .update(transaction_id, transaction.version, |tx| {
                tx.status = TransactionStatus::Executing
            })
            .await?;
        let report = self
            .executor
            .execute(&transaction, plan.parallel, deadline)
            .await?;
        for category in &report.retried {
            self.metrics.record_retry(*category);
        }
        self.metrics
            .record_phase(SettlementPhase::Execution, phase_started.elapsed());

        // Finalize. The versioned write is the commit point: it fails if an
        // emergency halt touched the transaction during execution.
        let phase_started = Instant::now();
        transaction = self
            .active
            .update(transaction_id, transaction.version, |tx| {
                tx.status = TransactionStatus::Committed
            })
            .await?;
        within(
            deadline,
            "finalize transaction",
            self.state.finalize_transaction(&transaction, &report.result),
        )
        .await?;

        if let ProtectionStrategy::CommitReveal(params) = &protection.strategy {
            let payload = MevProtector::commitment_payload(auction)?;
            self.mev
                .verify_reveal(transaction_id, &payload, &params.nonce)?;
            debug!("MEV commitment revealed");
        }

        let transaction = match self.active.release(transaction_id).await {
            Release::Released(transaction) => transaction,
            Release::Halted => return Err(self.halted_error()),
            Release::Absent => {
                return Err(SettlementError::validation(format!(
                    "transaction {transaction_id} left the active set during settlement"
                )))
            }
        };
        self.metrics.set_active_transactions(self.active.len().await);
        self.metrics
            .record_phase(SettlementPhase::Finalization, phase_started.elapsed());

        Ok(Settled {
            transaction,
            report,
            phantom,
        })
    }

    async fn run_consensus(
        &self,
        transaction: Transaction,
        deadline: Instant,
    ) -> Result<Transaction, SettlementError> {
        let Some(coordinator) = &self.coordinator else {
            return Err(SettlementError::validation(
                "consensus requested but no coordinator is configured",
            ));
        };

        let phase_started = Instant::now();
        let outcome: CoordinationOutcome = within(deadline, "consensus", async {
            Ok(coordinator.coordinate_settlement(&transaction).await)
        })
        .await?;
        self.metrics.record_consensus(&outcome);
        self.metrics
            .record_phase(SettlementPhase::Consensus, phase_started.elapsed());

        let phase = outcome.phase;
        let transaction = self
            .active
            .update(&transaction.id, transaction.version, |tx| {
                tx.set_metadata(metadata_keys::CONSENSUS_OUTCOME, phase.as_str())
            })
            .await?;

        if outcome.is_committed() {
            info!(phase = %phase.as_str(), "Consensus reached");
            return Ok(transaction);
        }

        let ratio = outcome
            .deciding_round()
            .map(|round| round.consensus_ratio)
            .unwrap_or(0.0);
        warn!(
            phase = %phase.as_str(),
            ratio,
            threshold = coordinator.protocol().threshold(),
            error = ?outcome.error,
            "Consensus not reached"
        );
        Err(SettlementError::ConsensusNotReached {
            phase: phase.as_str().to_string(),
            ratio,
            threshold: coordinator.protocol().threshold(),
        })
    }

    /// Run the phantom auction and merge a winning bid's price into the
    /// transaction and its routes. Volume stays at the auction's volume.
    async fn run_phantom(
        &self,
        transaction: Transaction,
        source: &dyn BidSource,
    ) -> Result<(Transaction, PhantomAuctionResult), SettlementError> {
        let phase_started = Instant::now();
        let baseline = PhantomBaseline {
            pair: transaction.pair.clone(),
            side: transaction.side,
            price: transaction.price,
            volume: transaction.volume,
        };
        let result = self
            .phantom
            .run_with_source(&transaction.auction_id, baseline, source)
            .await;
        self.metrics.record_phantom_auction(&result);
        self.metrics
            .record_phase(SettlementPhase::PhantomAuction, phase_started.elapsed());

        let Some(winner) = result.winning_bid.clone() else {
            debug!(
                participants = result.participants,
                sealed = result.sealed_bids,
                "Phantom auction kept baseline"
            );
            return Ok((transaction, result));
        };

        let clearing_price = result.clearing_price;
        let improvement_bps = result.improvement_bps;
        let participants = result.participants;
        let transaction = self
            .active
            .update(&transaction.id, transaction.version, |tx| {
                tx.price = clearing_price;
                for route in tx.routes.iter_mut() {
                    route.expected_price = clearing_price;
                }
                tx.set_metadata(metadata_keys::PHANTOM_WINNER, winner.bidder_id.clone());
                tx.set_metadata(
                    metadata_keys::PHANTOM_IMPROVEMENT_BPS,
                    improvement_bps.round_dp(4).to_string(),
                );
                tx.set_metadata(metadata_keys::PHANTOM_PARTICIPANTS, participants as u64);
            })
            .await?;

        info!(
            winner = %winner.bidder_id,
            price = %clearing_price,
            improvement_bps = %improvement_bps.round_dp(2),
            "Phantom auction improved price"
        );
        Ok((transaction, result))
    }

    /// Roll back after a failure, record it on the breaker and return the
    /// error the caller sees.
    async fn fail(&self, transaction_id: &str, err: SettlementError) -> SettlementError {
        error!(
            error_type = %err.kind().as_str(),
            error = %err,
            "Settlement failed"
        );

        let phase_started = Instant::now();
        let err = match self.rollback_transaction(transaction_id).await {
            Ok(RollbackOutcome::Halted) => self.halted_error(),
            Ok(_) => err,
            Err(rollback_err) => rollback_err,
        };
        // The commitment is registered before the transaction becomes active
        if self.mev.discard_reveal(transaction_id) {
            debug!("Discarded pending MEV commitment");
        }
        self.metrics
            .record_phase(SettlementPhase::Rollback, phase_started.elapsed());

        self.breaker.record_failure();
        self.metrics.set_circuit_state(self.breaker.state());
        self.totals.lock().await.failures += 1;
        err
    }

    /// Roll back an active transaction. Idempotent: an id that is no
    /// longer active is a no-op. A rollback that cannot complete triggers
    /// an emergency halt.
    pub async fn rollback_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<RollbackOutcome, SettlementError> {
        match self.recovery.rollback(transaction_id).await {
            Ok(outcome) => {
                if outcome.rolled_back() {
                    self.totals.lock().await.rollbacks += 1;
                }
                Ok(outcome)
            }
            Err(e) => {
                self.emergency_halt(&e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Force-open the breaker and mark every active transaction
    /// `EmergencyHalt`. New settlements are rejected until `resume`.
    pub async fn emergency_halt(&self, reason: &str) -> Vec<String> {
        let halted = self.recovery.emergency_halt(reason).await;
        self.totals.lock().await.emergency_halts += 1;
        halted
    }

    /// Clear an emergency halt and return the transactions it held
    pub async fn resume(&self) -> Vec<Transaction> {
        self.recovery.resume().await
    }

    pub fn is_halted(&self) -> bool {
        self.recovery.is_halted()
    }

    fn halted_error(&self) -> SettlementError {
        SettlementError::EmergencyHalt {
            reason: self
                .recovery
                .halt_reason()
                .unwrap_or_else(|| "emergency halt in effect".to_string()),
        }
    }

    pub async fn active_transactions(&self) -> Vec<Transaction> {
        self.active.snapshot().await
    }

    pub async fn get_transaction(&self, transaction_id: &str) -> Option<Transaction> {
        self.active.get(transaction_id).await
    }

    pub async fn totals(&self) -> SettlementTotals {
        self.totals.lock().await.clone()
    }
}

struct Settled {
    transaction: Transaction,
    report: ExecutionReport,
    phantom: Option<PhantomAuctionResult>,
}

/// Bound a collaborator call by the settlement deadline
async fn within<T, F>(deadline: Instant, operation: &str, call: F) -> Result<T, SettlementError>
where
    F: Future<Output = Result<T, SettlementError>>,
{
    let started = Instant::now();
    match tokio::time::timeout_at(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(SettlementError::timeout(
            operation,
            started.elapsed().as_millis() as u64,
        )),
    }
}
