//! Settlement pipeline tests against in-memory collaborators

#[cfg(test)]
mod orchestrator_tests {
    use crate::{
        MetricsSink, OrchestratorConfig, RollbackOutcome, RouteOptimizer, SettlementOrchestrator,
        SettlementOrchestratorBuilder, StateManager, TransactionValidator,
    };
    use async_trait::async_trait;
    use auction_settlement_mev::ProtectionResult;
    use auction_settlement_phantom::{
        AuctionMessage, AuctionSchedule, BidEnvelope, BidSource, ImprovementBid,
        PhantomAuctionConfig, PhantomBaseline,
    };
    use auction_settlement_resilience::{
        CircuitBreakerConfig, CircuitState, ErrorCategory, RetryPolicy,
    };
    use auction_settlement_types::{
        metadata_keys, AuctionResult, MarketContext, ExecutionResult, Priority, Route, SettlementError,
        SettlementOverrides, SettlementResult, Side, TokenPair, Transaction, TransactionStatus,
    };
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MOCK COLLABORATORS
    // ═══════════════════════════════════════════════════════════════════════

    #[derive(Default)]
    struct MockStateManager {
        should_fail_creation: AtomicBool,
        should_fail_validation: AtomicBool,
        should_fail_rollback: AtomicBool,
        finalized: Mutex<Vec<Transaction>>,
        rolled_back: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StateManager for MockStateManager {
        async fn create_transaction(
            &self,
            transaction_id: &str,
            auction: &AuctionResult,
            deadline_ms: u64,
        ) -> Result<Transaction, SettlementError> {
            if self.should_fail_creation.load(Ordering::SeqCst) {
                return Err(SettlementError::transient("state", "ledger unreachable"));
            }
            Ok(Transaction::from_auction(transaction_id, auction, deadline_ms))
        }

        async fn validate_transaction(&self, transaction: &Transaction) -> Result<(), SettlementError> {
            if self.should_fail_validation.load(Ordering::SeqCst) {
                return Err(SettlementError::validation(format!(
                    "{} conflicts with pending settlement",
                    transaction.id
                )));
            }
            Ok(())
        }

        async fn finalize_transaction(
            &self,
            transaction: &Transaction,
            _execution: &ExecutionResult,
        ) -> Result<(), SettlementError> {
            self.finalized.lock().unwrap().push(transaction.clone());
            Ok(())
        }

        async fn rollback_transaction(&self, transaction: &Transaction) -> Result<(), SettlementError> {
            if self.should_fail_rollback.load(Ordering::SeqCst) {
                return Err(SettlementError::transient("state", "ledger unreachable"));
            }
            self.rolled_back.lock().unwrap().push(transaction.id.clone());
            Ok(())
        }
    }

    /// Splits the volume evenly across `venues`; pops scripted execution
    /// outcomes, then succeeds.
    struct MockRouteOptimizer {
        venues: Vec<&'static str>,
        script: Mutex<VecDeque<Result<ExecutionResult, SettlementError>>>,
        delay: Duration,
        executions: AtomicU32,
        executed: Mutex<Vec<Transaction>>,
        pending: AtomicBool,
        cancelled: Mutex<Vec<String>>,
    }

    impl MockRouteOptimizer {
        fn new(venues: Vec<&'static str>) -> Self {
            Self {
                venues,
                script: Mutex::new(VecDeque::new()),
                delay: Duration::ZERO,
                executions: AtomicU32::new(0),
                executed: Mutex::new(Vec::new()),
                pending: AtomicBool::new(false),
                cancelled: Mutex::new(Vec::new()),
            }
        }

        fn with_script(self, script: Vec<Result<ExecutionResult, SettlementError>>) -> Self {
            *self.script.lock().unwrap() = script.into();
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl RouteOptimizer for MockRouteOptimizer {
        async fn prepare_routes(&self, transaction: &Transaction) -> Result<Vec<Route>, SettlementError> {
            let share = transaction.volume / Decimal::from(self.venues.len() as u64);
            Ok(self
                .venues
                .iter()
                .enumerate()
                .map(|(i, venue)| {
                    Route::new(format!("route-{i}"), *venue, share, transaction.price)
                })
                .collect())
        }

        async fn execute_transaction(
            &self,
            transaction: &Transaction,
        ) -> Result<ExecutionResult, SettlementError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            self.pending.store(true, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.executed.lock().unwrap().push(transaction.clone());

            let scripted = self.script.lock().unwrap().pop_front();
            match scripted {
                Some(outcome) => outcome,
                None => {
                    self.pending.store(false, Ordering::SeqCst);
                    Ok(ExecutionResult::succeeded(
                        21_000,
                        transaction.routes.iter().map(|r| r.venue.clone()).collect(),
                    ))
                }
            }
        }

        async fn cancel_operations(&self, transaction_id: &str) -> Result<(), SettlementError> {
            self.cancelled.lock().unwrap().push(transaction_id.to_string());
            self.pending.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn has_pending_operations(&self, _transaction_id: &str) -> bool {
            self.pending.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct MockMetrics {
        results: Mutex<Vec<SettlementResult>>,
        alerts: Mutex<Vec<String>>,
        retries: Mutex<Vec<ErrorCategory>>,
        rejections: AtomicU32,
        strategies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MetricsSink for MockMetrics {
        async fn record_settlement_metrics(&self, result: &SettlementResult) {
            self.results.lock().unwrap().push(result.clone());
        }

        async fn send_critical_alert(&self, message: &str) {
            self.alerts.lock().unwrap().push(message.to_string());
        }

        fn record_protection(&self, protection: &ProtectionResult) {
            self.strategies
                .lock()
                .unwrap()
                .push(protection.strategy.as_str().to_string());
        }

        fn record_retry(&self, category: ErrorCategory) {
            self.retries.lock().unwrap().push(category);
        }

        fn record_circuit_rejection(&self) {
            self.rejections.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Seals every bid, then reveals them once the reveal window opens
    struct ScriptedBidSource {
        bids: Vec<ImprovementBid>,
    }

    #[async_trait]
    impl BidSource for ScriptedBidSource {
        async fn solicit(
            &self,
            _auction_id: &str,
            _baseline: &PhantomBaseline,
            schedule: AuctionSchedule,
            bids: mpsc::Sender<AuctionMessage>,
        ) {
            for bid in &self.bids {
                bids.send(AuctionMessage::Seal(bid.seal())).await.ok();
            }
            tokio::time::sleep_until(schedule.reveal_opens_at).await;
            for bid in &self.bids {
                bids.send(AuctionMessage::Reveal(bid.reveal())).await.ok();
            }
        }
    }

    fn improvement_bid(bidder: &str, price: &str) -> ImprovementBid {
        ImprovementBid::new(
            bidder,
            BidEnvelope {
                pair: TokenPair::new("ATOM", "USDC"),
                improved_price: dec(price),
                volume: dec("100"),
                priority_fee: Decimal::ZERO,
            },
        )
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════

    struct Harness {
        orchestrator: SettlementOrchestrator,
        state: Arc<MockStateManager>,
        optimizer: Arc<MockRouteOptimizer>,
        metrics: Arc<MockMetrics>,
    }

    fn auction(id: &str) -> AuctionResult {
        AuctionResult::new(
            id,
            TokenPair::new("ATOM", "USDC"),
            Side::Buy,
            dec("10"),
            dec("100"),
        )
    }

    /// Late-in-block, gas-spiking, repeatedly flagged flow large against the pool
    fn exposed_auction(id: &str) -> AuctionResult {
        AuctionResult::new(
            id,
            TokenPair::new("ATOM", "USDC"),
            Side::Buy,
            dec("10"),
            dec("200"),
        )
        .with_market(MarketContext {
            pool_liquidity: dec("1000"),
            average_volume: dec("20"),
            gas_price: dec("300"),
            median_gas_price: dec("100"),
            block_offset_ms: 5_900,
            block_time_ms: 6_000,
            current_block: 500,
            sender: "0xabc".into(),
            sender_tx_count: 9,
            sender_flagged_count: 9,
        })
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(5), Duration::from_millis(20)).with_jitter(0.0)
    }

    fn trip_on_first_failure() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 1,
            volume_threshold: 1,
            error_threshold_percentage: 50.0,
            timeout: Duration::from_secs(60),
            ..Default::default()
        }
    }

    fn harness_with(
        optimizer: MockRouteOptimizer,
        configure: impl FnOnce(SettlementOrchestratorBuilder) -> SettlementOrchestratorBuilder,
    ) -> Harness {
        let state = Arc::new(MockStateManager::default());
        let optimizer = Arc::new(optimizer);
        let metrics = Arc::new(MockMetrics::default());

        let builder = SettlementOrchestrator::builder()
            .with_config(OrchestratorConfig::default().with_phantom_auction(false))
            .with_retry_policy(fast_retry())
            .with_state_manager(state.clone())
            .with_route_optimizer(optimizer.clone())
            .with_metrics(metrics.clone());

        Harness {
            orchestrator: configure(builder).build().unwrap(),
            state,
            optimizer,
            metrics,
        }
    }

    fn harness(optimizer: MockRouteOptimizer) -> Harness {
        harness_with(optimizer, |b| b)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // HAPPY PATH
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_settlement_commits_and_updates_totals() {
        let h = harness(MockRouteOptimizer::new(vec!["osmosis", "astroport"]));

        let result = h
            .orchestrator
            .orchestrate_settlement(&auction("auction-1"), Priority::Normal, SettlementOverrides::none())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.status, TransactionStatus::Committed);
        assert_eq!(result.final_price, dec("10"));
        assert_eq!(result.final_volume, dec("100"));
        assert_eq!(result.protection, "none");
        assert!(result.error.is_none());

        // Two venues fan out into two batches
        let execution = result.execution.unwrap();
        assert_eq!(execution.gas_used, 42_000);
        assert_eq!(h.optimizer.executions.load(Ordering::SeqCst), 2);

        let finalized = h.state.finalized.lock().unwrap();
        assert_eq!(finalized.len(), 1);
        assert_eq!(finalized[0].status, TransactionStatus::Committed);
        assert_eq!(
            finalized[0].metadata_str(metadata_keys::MEV_STRATEGY),
            Some("none")
        );

        assert!(h.orchestrator.active_transactions().await.is_empty());
        let totals = h.orchestrator.totals().await;
        assert_eq!(totals.settlements, 1);
        assert_eq!(totals.settled_volume, dec("100"));
        assert_eq!(totals.failures, 0);
        assert_eq!(h.metrics.results.lock().unwrap().len(), 1);
        assert_eq!(h.orchestrator.circuit_breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_sequential_override_retries_transient_failures() {
        let optimizer = MockRouteOptimizer::new(vec!["osmosis", "astroport"]).with_script(vec![
            Err(SettlementError::transient("osmosis", "node lagging")),
            Err(SettlementError::timeout("route execution", 50)),
        ]);
        let h = harness(optimizer);

        let result = h
            .orchestrator
            .orchestrate_settlement(
                &auction("auction-1"),
                Priority::Normal,
                SettlementOverrides::none().with_parallel_execution(false),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(h.optimizer.executions.load(Ordering::SeqCst), 3);
        assert_eq!(
            *h.metrics.retries.lock().unwrap(),
            vec![ErrorCategory::Transient, ErrorCategory::Timeout]
        );
    }

    #[tokio::test]
    async fn test_mev_protection_can_be_disabled_per_call() {
        let h = harness(MockRouteOptimizer::new(vec!["osmosis"]));

        h.orchestrator
            .orchestrate_settlement(
                &auction("auction-1"),
                Priority::Normal,
                SettlementOverrides::none().with_mev_protection(false),
            )
            .await
            .unwrap();

        let strategies = h.metrics.strategies.lock().unwrap();
        assert_eq!(*strategies, vec!["none".to_string()]);
        assert_eq!(h.orchestrator.mev_protector().pending_reveals(), 0);
    }

    #[tokio::test]
    async fn test_commit_reveal_settlement_consumes_commitment() {
        let h = harness(MockRouteOptimizer::new(vec!["osmosis"]));

        let result = h
            .orchestrator
            .orchestrate_settlement(
                &exposed_auction("auction-1"),
                Priority::Normal,
                SettlementOverrides::none(),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.protection, "commit_reveal");
        assert!(result.mev_confidence > 0.0);

        let finalized = h.state.finalized.lock().unwrap();
        assert_eq!(
            finalized[0].metadata_str(metadata_keys::MEV_STRATEGY),
            Some("commit_reveal")
        );
        assert!(finalized[0]
            .metadata_str(metadata_keys::MEV_COMMITMENT)
            .is_some_and(|c| !c.is_empty()));

        assert_eq!(
            *h.metrics.strategies.lock().unwrap(),
            vec!["commit_reveal".to_string()]
        );
        assert_eq!(h.orchestrator.mev_protector().pending_reveals(), 0);
    }

    #[tokio::test]
    async fn test_failure_before_registration_discards_commitment() {
        let h = harness(MockRouteOptimizer::new(vec!["osmosis"]));
        h.state.should_fail_creation.store(true, Ordering::SeqCst);

        let err = h
            .orchestrator
            .orchestrate_settlement(
                &exposed_auction("auction-1"),
                Priority::Normal,
                SettlementOverrides::none(),
            )
            .await
            .unwrap_err();

        assert!(!matches!(err, SettlementError::CircuitBreakerOpen));
        assert_eq!(
            *h.metrics.strategies.lock().unwrap(),
            vec!["commit_reveal".to_string()]
        );
        assert!(h.state.rolled_back.lock().unwrap().is_empty());
        assert!(h.orchestrator.active_transactions().await.is_empty());
        assert_eq!(h.orchestrator.mev_protector().pending_reveals(), 0);
        assert_eq!(h.orchestrator.totals().await.failures, 1);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PHANTOM AUCTION
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_phantom_auction_improves_price() {
        let source = Arc::new(ScriptedBidSource {
            bids: vec![
                improvement_bid("solver-a", "9.9"),
                improvement_bid("solver-b", "9.95"),
            ],
        });
        let h = harness_with(MockRouteOptimizer::new(vec!["osmosis"]), |b| {
            b.with_phantom_config(PhantomAuctionConfig {
                duration: Duration::from_millis(200),
                reveal_delay: Duration::from_millis(100),
                ..Default::default()
            })
            .with_bid_source(source)
        });

        let result = h
            .orchestrator
            .orchestrate_settlement(
                &auction("auction-1"),
                Priority::Normal,
                SettlementOverrides::none().with_phantom_auction(true),
            )
            .await
            .unwrap();

        assert_eq!(result.final_price, dec("9.9"));
        assert_eq!(result.final_volume, dec("100"));
        assert_eq!(result.phantom_improvement_bps, Some(dec("100")));

        let executed = h.optimizer.executed.lock().unwrap();
        assert!(executed[0]
            .routes
            .iter()
            .all(|route| route.expected_price == dec("9.9")));

        let finalized = h.state.finalized.lock().unwrap();
        assert_eq!(
            finalized[0].metadata_str(metadata_keys::PHANTOM_WINNER),
            Some("solver-a")
        );
    }

    #[tokio::test]
    async fn test_phantom_auction_below_min_participants_keeps_baseline() {
        let source = Arc::new(ScriptedBidSource {
            bids: vec![improvement_bid("solver-a", "9.9")],
        });
        let h = harness_with(MockRouteOptimizer::new(vec!["osmosis"]), |b| {
            b.with_phantom_config(PhantomAuctionConfig {
                duration: Duration::from_millis(200),
                reveal_delay: Duration::from_millis(100),
                min_participants: 2,
                ..Default::default()
            })
            .with_bid_source(source)
        });

        let result = h
            .orchestrator
            .orchestrate_settlement(
                &auction("auction-1"),
                Priority::Normal,
                SettlementOverrides::none().with_phantom_auction(true),
            )
            .await
            .unwrap();

        assert_eq!(result.final_price, dec("10"));
        assert!(result.phantom_improvement_bps.is_none());
    }

    // ═══════════════════════════════════════════════════════════════════════
    // REJECTIONS
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_invalid_auction_rejected_without_side_effects() {
        let h = harness_with(MockRouteOptimizer::new(vec!["osmosis"]), |b| {
            b.with_circuit_breaker(trip_on_first_failure())
        });

        let mut bad = auction("auction-1");
        bad.volume = Decimal::ZERO;
        let err = h
            .orchestrator
            .orchestrate_settlement(&bad, Priority::Normal, SettlementOverrides::none())
            .await
            .unwrap_err();

        assert!(matches!(err, SettlementError::Validation { .. }));
        assert_eq!(h.optimizer.executions.load(Ordering::SeqCst), 0);
        assert_eq!(h.orchestrator.circuit_breaker().state(), CircuitState::Closed);
        assert_eq!(h.orchestrator.totals().await.failures, 0);
    }

    #[tokio::test]
    async fn test_unsupported_pair_rejected_by_validator() {
        let mut validator = TransactionValidator::permissive();
        validator.add_supported_pair(TokenPair::new("OSMO", "USDC"));
        let h = harness_with(MockRouteOptimizer::new(vec!["osmosis"]), |b| {
            b.with_validator(validator)
        });

        let err = h
            .orchestrator
            .orchestrate_settlement(&auction("auction-1"), Priority::Normal, SettlementOverrides::none())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_open_breaker_fails_fast() {
        let optimizer = MockRouteOptimizer::new(vec!["osmosis"])
            .with_script(vec![Ok(ExecutionResult::failed("slippage exceeded"))]);
        let h = harness_with(optimizer, |b| b.with_circuit_breaker(trip_on_first_failure()));

        let first = h
            .orchestrator
            .orchestrate_settlement(&auction("auction-1"), Priority::Normal, SettlementOverrides::none())
            .await
            .unwrap_err();
        assert!(matches!(first, SettlementError::Execution { .. }));
        assert_eq!(h.orchestrator.circuit_breaker().state(), CircuitState::Open);

        let second = h
            .orchestrator
            .orchestrate_settlement(&auction("auction-2"), Priority::Normal, SettlementOverrides::none())
            .await
            .unwrap_err();
        assert_eq!(second, SettlementError::CircuitBreakerOpen);
        assert_eq!(h.optimizer.executions.load(Ordering::SeqCst), 1);
        assert_eq!(h.metrics.rejections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_saturated_orchestrator_rate_limits() {
        let optimizer =
            MockRouteOptimizer::new(vec!["osmosis"]).with_delay(Duration::from_millis(200));
        let h = harness_with(optimizer, |b| {
            b.with_config(
                OrchestratorConfig::default()
                    .with_phantom_auction(false)
                    .with_max_concurrent_settlements(1),
            )
        });

        let first_auction = auction("auction-1");
        let second_auction = auction("auction-2");
        let (first, second) = tokio::join!(
            h.orchestrator.orchestrate_settlement(
                &first_auction,
                Priority::Normal,
                SettlementOverrides::none()
            ),
            async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                h.orchestrator
                    .orchestrate_settlement(&second_auction, Priority::Normal, SettlementOverrides::none())
                    .await
            }
        );

        assert!(first.unwrap().success);
        assert_eq!(
            second.unwrap_err(),
            SettlementError::RateLimited {
                in_flight: 1,
                limit: 1
            }
        );
    }

    #[tokio::test]
    async fn test_consensus_without_coordinator_is_rejected() {
        let h = harness(MockRouteOptimizer::new(vec!["osmosis"]));

        let err = h
            .orchestrator
            .orchestrate_settlement(
                &auction("auction-1"),
                Priority::Normal,
                SettlementOverrides::none().with_consensus(true),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Validation { .. }));

        let build = SettlementOrchestrator::builder()
            .with_config(OrchestratorConfig::default().with_consensus(true))
            .with_state_manager(h.state.clone())
            .with_route_optimizer(h.optimizer.clone())
            .build();
        assert!(build.is_err());
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let err = SettlementOrchestrator::builder().build().err().unwrap();
        assert_eq!(err.to_string(), "missing required field: state_manager");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ROLLBACK & EMERGENCY HALT
    // ═══════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn test_execution_failure_rolls_back() {
        let optimizer = MockRouteOptimizer::new(vec!["osmosis"])
            .with_script(vec![Ok(ExecutionResult::failed("pool drained"))]);
        let h = harness(optimizer);

        let result = h
            .orchestrator
            .settle(&auction("auction-1"), Priority::Normal, SettlementOverrides::none())
            .await;

        assert!(!result.success);
        assert_eq!(result.status, TransactionStatus::RolledBack);
        assert_eq!(result.error.as_ref().unwrap().kind.as_str(), "execution_failed");

        // Failed report is not retried
        assert_eq!(h.optimizer.executions.load(Ordering::SeqCst), 1);
        assert_eq!(*h.state.rolled_back.lock().unwrap(), vec![result.transaction_id.clone()]);
        assert_eq!(
            *h.optimizer.cancelled.lock().unwrap(),
            vec![result.transaction_id.clone()]
        );
        assert!(h.orchestrator.active_transactions().await.is_empty());

        let totals = h.orchestrator.totals().await;
        assert_eq!(totals.failures, 1);
        assert_eq!(totals.rollbacks, 1);
        assert_eq!(totals.settlements, 0);
        assert_eq!(h.orchestrator.circuit_breaker().stats().window_failures, 1);
    }

    #[tokio::test]
    async fn test_state_validation_failure_rolls_back_registered_transaction() {
        let h = harness(MockRouteOptimizer::new(vec!["osmosis"]));
        h.state.should_fail_validation.store(true, Ordering::SeqCst);

        let result = h
            .orchestrator
            .settle(&auction("auction-1"), Priority::Normal, SettlementOverrides::none())
            .await;

        assert_eq!(result.error.as_ref().unwrap().kind.as_str(), "validation_error");
        assert_eq!(h.state.rolled_back.lock().unwrap().len(), 1);
        assert_eq!(h.optimizer.executions.load(Ordering::SeqCst), 0);
        assert!(h.orchestrator.active_transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_retry_exhaustion_reports_max_retries() {
        let optimizer = MockRouteOptimizer::new(vec!["osmosis"]).with_script(vec![
            Err(SettlementError::transient("osmosis", "503")),
            Err(SettlementError::transient("osmosis", "503")),
            Err(SettlementError::transient("osmosis", "503")),
        ]);
        let h = harness(optimizer);

        let err = h
            .orchestrator
            .orchestrate_settlement(&auction("auction-1"), Priority::Normal, SettlementOverrides::none())
            .await
            .unwrap_err();

        assert!(matches!(err, SettlementError::MaxRetriesExceeded { attempts: 3, .. }));
        assert_eq!(h.orchestrator.totals().await.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_failed_rollback_triggers_emergency_halt() {
        let optimizer = MockRouteOptimizer::new(vec!["osmosis"])
            .with_script(vec![Ok(ExecutionResult::failed("pool drained"))]);
        let h = harness(optimizer);
        h.state.should_fail_rollback.store(true, Ordering::SeqCst);

        let err = h
            .orchestrator
            .orchestrate_settlement(&auction("auction-1"), Priority::Normal, SettlementOverrides::none())
            .await
            .unwrap_err();

        assert!(matches!(err, SettlementError::RollbackFailed { .. }));
        assert!(h.orchestrator.is_halted());
        assert!(h.orchestrator.circuit_breaker().is_forced_open());
        assert_eq!(h.metrics.alerts.lock().unwrap().len(), 1);

        let active = h.orchestrator.active_transactions().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, TransactionStatus::EmergencyHalt);
        assert_eq!(h.orchestrator.totals().await.emergency_halts, 1);

        let halted = h
            .orchestrator
            .orchestrate_settlement(&auction("auction-2"), Priority::Normal, SettlementOverrides::none())
            .await
            .unwrap_err();
        assert!(matches!(halted, SettlementError::EmergencyHalt { .. }));

        // Operator clears the halt
        h.state.should_fail_rollback.store(false, Ordering::SeqCst);
        let released = h.orchestrator.resume().await;
        assert_eq!(released.len(), 1);
        assert!(!h.orchestrator.is_halted());

        let result = h
            .orchestrator
            .orchestrate_settlement(&auction("auction-3"), Priority::Normal, SettlementOverrides::none())
            .await
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_public_rollback_is_idempotent() {
        let h = harness(MockRouteOptimizer::new(vec!["osmosis"]));

        let first = h.orchestrator.rollback_transaction("unknown").await.unwrap();
        assert_eq!(first, RollbackOutcome::NotActive);

        let result = h
            .orchestrator
            .orchestrate_settlement(&auction("auction-1"), Priority::Normal, SettlementOverrides::none())
            .await
            .unwrap();

        // Committed transactions have left the active set
        let after_commit = h
            .orchestrator
            .rollback_transaction(&result.transaction_id)
            .await
            .unwrap();
        assert_eq!(after_commit, RollbackOutcome::NotActive);
        assert!(h.state.rolled_back.lock().unwrap().is_empty());
        assert_eq!(h.orchestrator.totals().await.rollbacks, 0);
    }

    #[tokio::test]
    async fn test_manual_emergency_halt_marks_active_transactions() {
        let optimizer =
            MockRouteOptimizer::new(vec!["osmosis"]).with_delay(Duration::from_millis(200));
        let h = harness(optimizer);

        let settling = auction("auction-1");
        let (result, halted) = tokio::join!(
            h.orchestrator
                .settle(&settling, Priority::Normal, SettlementOverrides::none()),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let active = h.orchestrator.active_transactions().await;
                assert_eq!(active.len(), 1);
                assert_eq!(
                    h.orchestrator.get_transaction(&active[0].id).await.unwrap().status,
                    TransactionStatus::Executing
                );
                h.orchestrator.emergency_halt("operator request").await
            }
        );

        assert_eq!(halted.len(), 1);
        assert!(h.orchestrator.is_halted());

        // The in-flight settlement loses its versioned commit and is left
        // frozen instead of rolled back
        assert!(!result.success);
        assert_eq!(result.status, TransactionStatus::EmergencyHalt);
        assert_eq!(result.error.as_ref().unwrap().kind.as_str(), "emergency_halt");
        assert!(h.state.finalized.lock().unwrap().is_empty());
        assert!(h.state.rolled_back.lock().unwrap().is_empty());

        let active = h.orchestrator.active_transactions().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, TransactionStatus::EmergencyHalt);
        assert_eq!(h.metrics.alerts.lock().unwrap().len(), 1);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DEADLINES
    // ═══════════════════════════════════════════════════════════════════════

    #[test]
    fn test_priority_scaled_timeouts() {
        let config = OrchestratorConfig::default().with_base_timeout(Duration::from_secs(30));
        assert_eq!(config.timeout_for(Priority::Critical, None), Duration::from_secs(15));
        assert_eq!(
            config.timeout_for(Priority::High, None),
            Duration::from_millis(22_500)
        );
        assert_eq!(config.timeout_for(Priority::Normal, None), Duration::from_secs(30));
        assert_eq!(config.timeout_for(Priority::Low, None), Duration::from_secs(60));
        assert_eq!(
            config.timeout_for(Priority::Critical, Some(1_000)),
            Duration::from_millis(500)
        );
    }

    #[tokio::test]
    async fn test_priority_deadline_bounds_execution() {
        let no_retry = RetryPolicy::default().with_retryable(Vec::<ErrorCategory>::new());
        let make = || {
            harness_with(
                MockRouteOptimizer::new(vec!["osmosis"]).with_delay(Duration::from_millis(300)),
                |b| {
                    b.with_config(
                        OrchestratorConfig::default()
                            .with_phantom_auction(false)
                            .with_base_timeout(Duration::from_millis(400)),
                    )
                    .with_retry_policy(no_retry.clone())
                },
            )
        };

        let critical = make();
        let err = critical
            .orchestrator
            .orchestrate_settlement(&auction("auction-1"), Priority::Critical, SettlementOverrides::none())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Timeout { .. }));
        assert_eq!(critical.orchestrator.totals().await.rollbacks, 1);

        let low = make();
        let result = low
            .orchestrator
            .orchestrate_settlement(&auction("auction-1"), Priority::Low, SettlementOverrides::none())
            .await
            .unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_settle_batch_runs_independent_settlements() {
        let optimizer = MockRouteOptimizer::new(vec!["osmosis"])
            .with_script(vec![Ok(ExecutionResult::failed("pool drained"))]);
        let h = harness(optimizer);

        let auctions = vec![auction("auction-1"), auction("auction-2"), auction("auction-3")];
        let results = h
            .orchestrator
            .settle_batch(&auctions, Priority::High, SettlementOverrides::none())
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.success).count(), 2);
        let totals = h.orchestrator.totals().await;
        assert_eq!(totals.settlements, 2);
        assert_eq!(totals.failures, 1);
        assert_eq!(totals.settled_volume, dec("200"));
    }
}
