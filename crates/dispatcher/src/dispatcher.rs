//! Dispatcher - main loop for fan-out to sinks

use std::sync::Arc;

use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{Batch, SinkConfig, SinkType};
use observability::{DeliveryMetricsAggregator, MetricsSummary};

use crate::engine::{DeliveryEngine, RetryPolicy};
use crate::error::DispatcherError;
use crate::handle::{DeliveryReport, SinkHandle};
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::signer::HeaderSigner;
use crate::sinks::{BulkIndexAdapter, BulkIndexSinkConfig, StreamAdapter, StreamSinkConfig};
use crate::transport::ReqwestTransport;

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink configurations
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<Batch>,
    client: Option<Client>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<Batch>) -> Self {
        Self {
            config,
            input_rx,
            client: None,
        }
    }

    /// Use an existing HTTP client instead of building one
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the dispatcher
    #[instrument(name = "dispatcher_builder_build", skip(self), fields(sink_count = self.config.sinks.len()))]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let client = match self.client {
            Some(client) => client,
            None => ReqwestTransport::shared_client()?,
        };

        let handles = self
            .config
            .sinks
            .iter()
            .map(|sink_config| create_sink_handle(sink_config, &client))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dispatcher::with_handles(handles, self.input_rx))
    }
}

/// Create a SinkHandle from configuration.
///
/// Every sink shares `client`'s connection pool.
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config, client),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub fn create_sink_handle(config: &SinkConfig, client: &Client) -> Result<SinkHandle, DispatcherError> {
    let policy = RetryPolicy::from(&config.retry);
    let signer = HeaderSigner::from_params(&config.params);

    match config.sink_type {
        SinkType::Stream => {
            let sink_config = StreamSinkConfig::from_params(&config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            let transport = ReqwestTransport::new(client.clone(), sink_config.timeout);
            let mut adapter = StreamAdapter::new(&config.name, sink_config, transport);
            if let Some(signer) = signer {
                adapter = adapter.with_signer(Arc::new(signer));
            }
            Ok(SinkHandle::new(DeliveryEngine::new(adapter, policy), config.max_in_flight))
        }
        SinkType::BulkIndex => {
            let sink_config = BulkIndexSinkConfig::from_params(&config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            let transport = ReqwestTransport::new(client.clone(), sink_config.timeout);
            let mut adapter = BulkIndexAdapter::new(&config.name, sink_config, transport);
            if let Some(signer) = signer {
                adapter = adapter.with_signer(Arc::new(signer));
            }
            Ok(SinkHandle::new(DeliveryEngine::new(adapter, policy), config.max_in_flight))
        }
    }
}

/// Totals reported when the dispatcher stops
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    /// Batches read from the input channel
    pub batches: u64,
    /// Per-sink counters
    pub sinks: Vec<(String, MetricsSnapshot)>,
    /// Per-sink delivery statistics
    pub metrics: MetricsSummary,
}

impl DispatchSummary {
    /// Whether any sink failed any batch
    pub fn has_failures(&self) -> bool {
        self.sinks.iter().any(|(_, s)| s.failed_batches > 0)
    }
}

/// The main Dispatcher that fans out batches to sinks
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<Batch>,
    aggregator: DeliveryMetricsAggregator,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<Batch>) -> Self {
        Self {
            handles,
            input_rx,
            aggregator: DeliveryMetricsAggregator::new(),
        }
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run the dispatcher main loop
    ///
    /// Submits every batch to every sink. Returns once the input channel is
    /// closed and all outstanding deliveries have finished.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> DispatchSummary {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut batch_count: u64 = 0;

        while let Some(batch) = self.input_rx.recv().await {
            batch_count += 1;
            self.dispatch_batch(batch).await;

            if batch_count.is_multiple_of(100) {
                debug!(batches = batch_count, "Dispatcher progress");
            }
        }

        info!(
            batches = batch_count,
            "Dispatcher input closed, waiting for outstanding deliveries"
        );

        let counters: Vec<(String, Arc<SinkMetrics>)> = self
            .handles
            .iter()
            .map(|h| (h.name().to_string(), Arc::clone(h.metrics())))
            .collect();
        for handle in std::mem::take(&mut self.handles) {
            let reports = handle.shutdown().await;
            self.record(reports);
        }

        info!("Dispatcher shutdown complete");

        DispatchSummary {
            batches: batch_count,
            sinks: counters
                .into_iter()
                .map(|(name, metrics)| (name, metrics.snapshot()))
                .collect(),
            metrics: self.aggregator.summary(),
        }
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<DispatchSummary> {
        tokio::spawn(self.run())
    }

    async fn dispatch_batch(&mut self, batch: Batch) {
        let mut reports = Vec::new();
        for handle in &mut self.handles {
            reports.extend(handle.submit(batch.clone()).await);
        }
        self.record(reports);
    }

    fn record(&mut self, reports: Vec<DeliveryReport>) {
        for report in reports {
            match &report.result {
                Ok(()) => self
                    .aggregator
                    .record_success(&report.sink, report.tally, report.elapsed),
                Err(e) => self.aggregator.record_failure(&report.sink, e, report.elapsed),
            }
        }
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<Batch>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build()
}
