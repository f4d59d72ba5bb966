//! Pipeline orchestrator - reads events, batches them and feeds the dispatcher.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::{Batch, Event, ShipperBlueprint};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Where NDJSON events come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

impl InputSource {
    /// `None` and `-` mean stdin
    pub fn from_arg(arg: Option<&Path>) -> Self {
        match arg {
            Some(path) if path != Path::new("-") => Self::File(path.to_path_buf()),
            _ => Self::Stdin,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The loaded shipper configuration
    pub blueprint: ShipperBlueprint,

    /// Event source
    pub input: InputSource,

    /// Events per batch
    pub batch_size: usize,

    /// Channel buffer size
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Counters from reading the input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub lines: u64,
    pub events: u64,
    pub invalid: u64,
    pub batches: u64,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline until the input is exhausted and every batch is settled
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let config = self.config;

        // Initialize Metrics (optional)
        if let Some(port) = config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let (batch_tx, batch_rx) = mpsc::channel(config.buffer_size.max(1));
        let dispatcher = dispatcher::create_dispatcher(config.blueprint.sinks.clone(), batch_rx)
            .context("Failed to create sinks")?;
        let dispatcher_task = dispatcher.spawn();

        info!(
            sinks = config.blueprint.sinks.len(),
            batch_size = config.batch_size,
            "Pipeline started"
        );

        let read_result = match &config.input {
            InputSource::Stdin => {
                read_events(BufReader::new(tokio::io::stdin()), config.batch_size, &batch_tx).await
            }
            InputSource::File(path) => match tokio::fs::File::open(path).await {
                Ok(file) => read_events(BufReader::new(file), config.batch_size, &batch_tx).await,
                Err(e) => Err(CliError::input(format!("{}: {e}", path.display()))),
            },
        };

        // closing the channel lets the dispatcher drain and stop
        drop(batch_tx);
        let summary = dispatcher_task
            .await
            .context("Dispatcher task panicked")?;
        let read = read_result?;

        info!(
            events = read.events,
            invalid = read.invalid,
            batches = read.batches,
            "Input exhausted"
        );

        Ok(PipelineStats {
            events_read: read.events,
            invalid_lines: read.invalid,
            batches: summary.batches,
            duration: start_time.elapsed(),
            sinks: summary.sinks,
            delivery: summary.metrics,
        })
    }
}

/// Read NDJSON events and send them downstream in batches of `batch_size`.
///
/// Lines are read as raw bytes. Blank lines are skipped; lines that are not
/// valid JSON objects, including invalid UTF-8, are counted and skipped.
pub async fn read_events<R>(
    reader: R,
    batch_size: usize,
    tx: &mpsc::Sender<Batch>,
) -> Result<ReadStats, CliError>
where
    R: AsyncBufRead + Unpin,
{
    let batch_size = batch_size.max(1);
    let mut reader = reader;
    let mut buf = Vec::new();
    let mut pending = Vec::with_capacity(batch_size);
    let mut stats = ReadStats::default();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        stats.lines += 1;
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }

        match Event::from_slice(line) {
            Ok(event) => {
                stats.events += 1;
                pending.push(event);
            }
            Err(e) => {
                stats.invalid += 1;
                warn!(line = stats.lines, error = %e, "Skipping invalid event");
                continue;
            }
        }

        if pending.len() >= batch_size {
            let events = std::mem::replace(&mut pending, Vec::with_capacity(batch_size));
            send_batch(tx, events).await?;
            stats.batches += 1;
        }
    }

    if !pending.is_empty() {
        send_batch(tx, pending).await?;
        stats.batches += 1;
    }

    Ok(stats)
}

async fn send_batch(tx: &mpsc::Sender<Batch>, events: Vec<Event>) -> Result<(), CliError> {
    debug!(events = events.len(), "Batch ready");
    tx.send(Batch::new(events))
        .await
        .map_err(|_| CliError::pipeline_execution("dispatcher stopped accepting batches"))
}
