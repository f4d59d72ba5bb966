//! `ship` command implementation.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::ShipArgs;
use crate::error::CliError;
use crate::pipeline::{InputSource, Pipeline, PipelineConfig};

/// Execute the `ship` command
pub async fn run_ship(args: &ShipArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    // Load and parse configuration
    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(batch_size) = args.batch_size {
        if batch_size == 0 {
            anyhow::bail!("--batch-size must be > 0");
        }
        info!(batch_size, "Overriding batch size from CLI");
        blueprint.batching.batch_size = batch_size;
    }

    info!(
        batch_size = blueprint.batching.batch_size,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if blueprint.sinks.is_empty() {
        warn!("No sinks configured - events will be read and discarded");
    }

    let pipeline_config = PipelineConfig {
        batch_size: blueprint.batching.batch_size,
        blueprint,
        input: InputSource::from_arg(args.input.as_deref()),
        buffer_size: args.buffer_size,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    let pipeline = Pipeline::new(pipeline_config);
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting pipeline...");

    tokio::select! {
        result = pipeline.run() => {
            let stats = result.context("Pipeline execution failed")?;
            info!(
                events = stats.events_read,
                batches = stats.batches,
                duration_secs = stats.duration.as_secs_f64(),
                events_per_sec = format!("{:.2}", stats.events_per_sec()),
                "Pipeline completed"
            );
            stats.print_summary();

            let failed = stats.failed_batches();
            if failed > 0 {
                anyhow::bail!("{failed} batch deliveries failed");
            }
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping pipeline...");
        }
    }

    info!("Shipper finished");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::ShipperBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Batch size: {}", blueprint.batching.batch_size);

    println!("\nSinks ({}):", blueprint.sinks.len());
    for sink in &blueprint.sinks {
        println!(
            "  - {} ({:?}) max_in_flight={} max_attempts={} retry_delay={}ms",
            sink.name,
            sink.sink_type,
            sink.max_in_flight,
            sink.retry.max_attempts,
            sink.retry.delay_ms
        );
    }

    println!();
}
