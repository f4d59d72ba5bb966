//! SinkHandle - bounded concurrent delivery for one sink

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, instrument};

use contracts::{Batch, DeliveryError, ItemTally, SinkAdapter};

use crate::engine::DeliveryEngine;
use crate::metrics::SinkMetrics;

/// Outcome of one batch on one sink, with the sink-specific output erased
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReport {
    pub sink: String,
    pub events: usize,
    pub elapsed: Duration,
    /// Per-event counts of the delivered result; zero on failure
    pub tally: ItemTally,
    pub result: Result<(), DeliveryError>,
}

type ReportFuture = Pin<Box<dyn Future<Output = DeliveryReport> + Send>>;

/// Object-safe view of a delivery engine
trait BatchSink: Send + Sync {
    fn name(&self) -> &str;
    fn metrics(&self) -> &Arc<SinkMetrics>;
    fn deliver_boxed(&self, batch: Batch) -> ReportFuture;
}

impl<A: SinkAdapter> BatchSink for DeliveryEngine<A> {
    fn name(&self) -> &str {
        DeliveryEngine::name(self)
    }

    fn metrics(&self) -> &Arc<SinkMetrics> {
        DeliveryEngine::metrics(self)
    }

    fn deliver_boxed(&self, batch: Batch) -> ReportFuture {
        let engine = self.clone();
        let started = Instant::now();
        let events = batch.len();
        let completion = engine.submit(batch);
        Box::pin(async move {
            let (tally, result) = match completion.wait().await {
                Ok(output) => (engine.adapter().tally(&output), Ok(())),
                Err(e) => (ItemTally::default(), Err(e)),
            };
            DeliveryReport {
                sink: engine.name().to_string(),
                events,
                elapsed: started.elapsed(),
                tally,
                result,
            }
        })
    }
}

/// Handle to a sink's delivery engine.
///
/// At most `max_in_flight` batches are delivered at once; `submit` waits for
/// a free slot instead of dropping the batch.
pub struct SinkHandle {
    name: String,
    sink: Arc<dyn BatchSink>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    tasks: JoinSet<DeliveryReport>,
}

impl SinkHandle {
    /// Wrap an engine
    pub fn new<A: SinkAdapter>(engine: DeliveryEngine<A>, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            name: engine.name().to_string(),
            sink: Arc::new(engine),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            tasks: JoinSet::new(),
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        self.sink.metrics()
    }

    /// Batches currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    /// Start delivering a batch, waiting for a free slot first.
    ///
    /// Returns reports of deliveries that finished in the meantime.
    #[instrument(
        name = "sink_handle_submit",
        skip(self, batch),
        fields(sink = %self.name, events = batch.len())
    )]
    pub async fn submit(&mut self, batch: Batch) -> Vec<DeliveryReport> {
        let mut finished = self.reap();

        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // the semaphore is never closed while the handle lives
                error!(sink = %self.name, "Delivery slots closed, batch not submitted");
                return finished;
            }
        };
        observability::record_in_flight(&self.name, self.in_flight());

        let delivery = self.sink.deliver_boxed(batch);
        self.tasks.spawn(async move {
            let report = delivery.await;
            drop(permit);
            report
        });

        finished.extend(self.reap());
        finished
    }

    /// Wait for every outstanding delivery
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(mut self) -> Vec<DeliveryReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(sink = %self.name, error = ?e, "Delivery task panicked"),
            }
        }
        observability::record_in_flight(&self.name, 0);
        debug!(sink = %self.name, "SinkHandle shutdown complete");
        reports
    }

    fn reap(&mut self) -> Vec<DeliveryReport> {
        let mut reports = Vec::new();
        while let Some(joined) = self.tasks.try_join_next() {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(sink = %self.name, error = ?e, "Delivery task panicked"),
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RetryPolicy;
    use bytes::Bytes;
    use contracts::{DeliveryLedger, Event, EventId, HttpReply, ItemOutcome, ItemTally, SignableRequest};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts everything after a delay, tracking peak concurrency
    struct SlowAdapter {
        delay: Duration,
        fail: bool,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowAdapter {
        fn new(delay: Duration, fail: bool) -> Self {
            Self {
                delay,
                fail,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl SinkAdapter for SlowAdapter {
        type Output = usize;
        type Prepared = ();

        fn name(&self) -> &str {
            "slow"
        }

        fn prepare(&self, _batch: &Batch) -> Result<(), DeliveryError> {
            Ok(())
        }

        fn build(
            &self,
            _batch: &Batch,
            _prepared: &(),
            _ids: &[EventId],
        ) -> Result<SignableRequest, DeliveryError> {
            Ok(SignableRequest::post("http://slow", "/", Bytes::new()))
        }

        async fn dispatch(&self, _request: &mut SignableRequest) -> Result<HttpReply, DeliveryError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                return Err(DeliveryError::transport("slow", "connection reset"));
            }
            Ok(HttpReply::new(200, ""))
        }

        fn parse(
            &self,
            _request: &SignableRequest,
            ids: &[EventId],
            _reply: HttpReply,
        ) -> Result<Vec<ItemOutcome>, DeliveryError> {
            Ok(ids.iter().map(|_| ItemOutcome::success()).collect())
        }

        fn finish(&self, batch: &Batch, _ledger: &DeliveryLedger) -> usize {
            batch.len()
        }

        fn tally(&self, output: &usize) -> ItemTally {
            ItemTally::delivered(*output)
        }
    }

    fn batch(n: usize) -> Batch {
        (0..n)
            .map(|i| Event::from_json(json!({ "i": i })).unwrap())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_is_bounded() {
        let engine = DeliveryEngine::new(
            SlowAdapter::new(Duration::from_millis(100), false),
            RetryPolicy::default(),
        );
        let adapter_engine = engine.clone();
        let mut handle = SinkHandle::new(engine, 2);

        let mut reports = Vec::new();
        for _ in 0..6 {
            reports.extend(handle.submit(batch(3)).await);
            assert!(handle.in_flight() <= 2);
        }
        reports.extend(handle.shutdown().await);

        assert_eq!(reports.len(), 6);
        assert!(reports.iter().all(|r| r.result.is_ok() && r.events == 3));
        assert!(reports.iter().all(|r| r.tally == ItemTally::delivered(3)));
        assert_eq!(adapter_engine.adapter().peak.load(Ordering::SeqCst), 2);
        assert_eq!(adapter_engine.metrics().delivered_batches(), 6);
    }

    #[tokio::test]
    async fn test_failures_are_reported() {
        let engine = DeliveryEngine::new(
            SlowAdapter::new(Duration::from_millis(1), true),
            RetryPolicy::default(),
        );
        let mut handle = SinkHandle::new(engine, 4);

        let mut reports = handle.submit(batch(2)).await;
        reports.extend(handle.shutdown().await);

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].sink, "slow");
        assert_eq!(
            reports[0].result,
            Err(DeliveryError::transport("slow", "connection reset"))
        );
        assert_eq!(reports[0].tally, ItemTally::default());
    }

    #[tokio::test]
    async fn test_shutdown_without_batches() {
        let engine = DeliveryEngine::new(
            SlowAdapter::new(Duration::from_millis(1), false),
            RetryPolicy::default(),
        );
        let handle = SinkHandle::new(engine, 1);
        assert_eq!(handle.name(), "slow");
        assert!(handle.shutdown().await.is_empty());
    }
}
