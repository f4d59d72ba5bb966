//! DeliveryEngine - batched delivery with partial retry
//!
//! Each submitted batch runs as its own task: build a request for the pending
//! events, dispatch, classify the reply, and shrink the pending set to the
//! events that are still unresolved. The loop ends on full success, on a
//! terminal error, or when the attempt cap is reached.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

use contracts::{Batch, DeliveryError, DeliveryLedger, RetryConfig, SinkAdapter};

use crate::completion::{completion, Completion};
use crate::metrics::SinkMetrics;

/// Attempt cap and inter-attempt delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of requests sent for one batch
    pub max_attempts: u32,
    /// Delay before each retry
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay: Duration::from_millis(500),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            delay: config.delay(),
        }
    }
}

/// Drives batches through a sink adapter
pub struct DeliveryEngine<A: SinkAdapter> {
    adapter: Arc<A>,
    policy: RetryPolicy,
    metrics: Arc<SinkMetrics>,
}

impl<A: SinkAdapter> Clone for DeliveryEngine<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            policy: self.policy,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<A: SinkAdapter> DeliveryEngine<A> {
    /// Create an engine with its own metrics
    pub fn new(adapter: A, policy: RetryPolicy) -> Self {
        Self {
            adapter: Arc::new(adapter),
            policy,
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    /// Share an existing metrics instance
    pub fn with_metrics(mut self, metrics: Arc<SinkMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sink name
    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Underlying adapter
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Retry policy in use
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Per-sink counters
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Start delivering a batch in the background.
    ///
    /// Must be called from within a Tokio runtime. The returned completion
    /// resolves exactly once; dropping it does not cancel the delivery.
    pub fn submit(&self, batch: Batch) -> Completion<A::Output> {
        if batch.is_empty() {
            return Completion::resolved(Ok(self.empty_result(&batch)));
        }

        let (completer, completion) = completion();
        let engine = self.clone();
        tokio::spawn(async move {
            let result = engine.deliver(batch).await;
            completer.finish(result);
        });
        completion
    }

    /// Deliver a batch on the current task
    #[instrument(
        name = "delivery_engine_deliver",
        skip(self, batch),
        fields(sink = %self.adapter.name(), events = batch.len())
    )]
    pub async fn deliver(&self, batch: Batch) -> Result<A::Output, DeliveryError> {
        if batch.is_empty() {
            debug!("Empty batch, nothing to dispatch");
            return Ok(self.empty_result(&batch));
        }

        let name = self.adapter.name();
        let started = Instant::now();
        self.metrics.inc_in_flight();
        let result = self.run_attempts(&batch, started).await;
        self.metrics.dec_in_flight();

        match result {
            Ok(ledger) => {
                self.metrics.record_delivered(batch.len());
                observability::record_batch_delivered(
                    name,
                    batch.len(),
                    ledger.attempts(),
                    ledger.elapsed(),
                );
                info!(
                    attempts = ledger.attempts(),
                    elapsed_ms = ledger.elapsed().as_millis() as u64,
                    "Batch delivered"
                );
                Ok(self.adapter.finish(&batch, &ledger))
            }
            Err(e) => {
                self.metrics.inc_failed_batches();
                observability::record_batch_failed(name, &e);
                error!(kind = e.kind(), error = %e, "Batch delivery failed");
                Err(e)
            }
        }
    }

    fn empty_result(&self, batch: &Batch) -> A::Output {
        self.adapter.finish(batch, &DeliveryLedger::new(0))
    }

    async fn run_attempts(
        &self,
        batch: &Batch,
        started: Instant,
    ) -> Result<DeliveryLedger, DeliveryError> {
        let name = self.adapter.name();
        let mut ledger = DeliveryLedger::new(batch.len());
        let mut pending = batch.ids();
        let mut attempt: u32 = 1;
        let prepared = self.adapter.prepare(batch)?;

        loop {
            let mut request = self.adapter.build(batch, &prepared, &pending)?;

            self.metrics.inc_dispatch_count();
            observability::record_dispatch(name, pending.len(), attempt);
            trace!(attempt, items = pending.len(), "Dispatching request");

            let reply = self.adapter.dispatch(&mut request).await?;
            let outcomes = self.adapter.parse(&request, &pending, reply)?;
            ledger.record_attempt(&pending, outcomes);

            let unresolved = ledger.unresolved();
            if unresolved.is_empty() {
                ledger.set_elapsed(started.elapsed());
                return Ok(ledger);
            }

            attempt += 1;
            if attempt > self.policy.max_attempts {
                return Err(DeliveryError::RetryExhausted {
                    sink: name.to_string(),
                    attempts: attempt - 1,
                    unresolved,
                });
            }

            self.metrics.add_retried_items(unresolved.len());
            observability::record_retry(name, unresolved.len());
            warn!(
                attempt,
                retry_items = unresolved.len(),
                delay_ms = self.policy.delay.as_millis() as u64,
                "Partial failure, retrying unresolved events"
            );

            sleep(self.policy.delay).await;
            pending = unresolved;
        }
    }
}
