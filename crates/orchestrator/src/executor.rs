use auction_settlement_resilience::{Categorize, ErrorCategory, RetryError, RetryPolicy};
use auction_settlement_types::{ExecutionResult, Route, SettlementError, Transaction};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::collaborators::RouteOptimizer;

/// How a transaction's routes were executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Parallel { batches: usize },
    Sequential,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub result: ExecutionResult,
    pub mode: ExecutionMode,
    pub attempts: u32,
    /// Categories of the failed attempts that were retried
    pub retried: Vec<ErrorCategory>,
}

/// Executes a transaction's routes either fanned out per independent batch
/// or sequentially under the retry policy.
pub struct RouteExecutor {
    optimizer: Arc<dyn RouteOptimizer>,
    retry: RetryPolicy,
    max_parallel_batches: usize,
}

impl RouteExecutor {
    pub fn new(
        optimizer: Arc<dyn RouteOptimizer>,
        retry: RetryPolicy,
        max_parallel_batches: usize,
    ) -> Self {
        Self {
            optimizer,
            retry,
            max_parallel_batches: max_parallel_batches.max(1),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Groups routes into independent batches. Routes on the same venue
    /// share venue state and always land in the same batch.
    pub fn batches(&self, routes: &[Route]) -> Vec<Vec<Route>> {
        let mut by_venue: BTreeMap<&str, Vec<Route>> = BTreeMap::new();
        for route in routes {
            by_venue
                .entry(route.venue.as_str())
                .or_default()
                .push(route.clone());
        }

        let mut batches: Vec<Vec<Route>> = Vec::new();
        for (i, venue_routes) in by_venue.into_values().enumerate() {
            if batches.len() < self.max_parallel_batches {
                batches.push(venue_routes);
            } else {
                batches[i % self.max_parallel_batches].extend(venue_routes);
            }
        }
        batches
    }

    pub async fn execute(
        &self,
        transaction: &Transaction,
        parallel: bool,
        deadline: Instant,
    ) -> Result<ExecutionReport, SettlementError> {
        let batches = self.batches(&transaction.routes);
        if parallel && batches.len() > 1 {
            self.execute_parallel(transaction, batches, deadline).await
        } else {
            self.execute_sequential(transaction, deadline).await
        }
    }

    /// All-or-nothing: any failed batch fails the whole step
    async fn execute_parallel(
        &self,
        transaction: &Transaction,
        batches: Vec<Vec<Route>>,
        deadline: Instant,
    ) -> Result<ExecutionReport, SettlementError> {
        let total = batches.len();
        info!(
            transaction_id = %transaction.id,
            batches = total,
            "Executing route batches in parallel"
        );

        let tasks = batches.into_iter().map(|routes| {
            let mut batch = transaction.clone();
            batch.routes = routes;
            async move { execute_once(self.optimizer.as_ref(), &batch, deadline).await }
        });
        let outcomes = join_all(tasks).await;

        let mut results = Vec::with_capacity(total);
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => errors.push(e.to_string()),
            }
        }

        if !errors.is_empty() {
            warn!(
                transaction_id = %transaction.id,
                failed = errors.len(),
                batches = total,
                "Parallel execution failed"
            );
            return Err(SettlementError::ParallelExecutionFailed {
                failed: errors.len(),
                batches: total,
                reason: errors.join("; "),
            });
        }

        Ok(ExecutionReport {
            result: ExecutionResult::combine(results),
            mode: ExecutionMode::Parallel { batches: total },
            attempts: 1,
            retried: Vec::new(),
        })
    }

    async fn execute_sequential(
        &self,
        transaction: &Transaction,
        deadline: Instant,
    ) -> Result<ExecutionReport, SettlementError> {
        let attempts = Mutex::new((0u32, Vec::<ErrorCategory>::new()));

        let outcome = self
            .retry
            .retry(|attempt| {
                let attempts = &attempts;
                async move {
                    let result = execute_once(self.optimizer.as_ref(), transaction, deadline).await;
                    let mut tally = attempts.lock().unwrap_or_else(PoisonError::into_inner);
                    tally.0 = attempt;
                    if let Err(e) = &result {
                        tally.1.push(e.category());
                    }
                    result
                }
            })
            .await;

        let (attempts, mut failures) = attempts.into_inner().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(result) => Ok(ExecutionReport {
                result,
                mode: ExecutionMode::Sequential,
                attempts,
                retried: failures,
            }),
            Err(RetryError::NonRetryable(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last }) => {
                failures.pop();
                warn!(
                    transaction_id = %transaction.id,
                    attempts,
                    error = %last,
                    "Route execution retries exhausted"
                );
                Err(SettlementError::MaxRetriesExceeded {
                    attempts,
                    last_error: last.to_string(),
                })
            }
        }
    }
}

/// One bounded execution attempt. A report with `success == false` is a
/// definitive venue answer and is not retried.
async fn execute_once(
    optimizer: &dyn RouteOptimizer,
    transaction: &Transaction,
    deadline: Instant,
) -> Result<ExecutionResult, SettlementError> {
    let started = Instant::now();
    let result = tokio::time::timeout_at(deadline, optimizer.execute_transaction(transaction))
        .await
        .map_err(|_| {
            SettlementError::timeout("route execution", started.elapsed().as_millis() as u64)
        })??;

    if !result.success {
        return Err(SettlementError::Execution {
            reason: result
                .error
                .unwrap_or_else(|| format!("routes of {} reported failure", transaction.id)),
        });
    }
    Ok(result)
}
