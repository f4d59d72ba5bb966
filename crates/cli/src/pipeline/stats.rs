//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::MetricsSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Events parsed from the input
    pub events_read: u64,

    /// Input lines skipped because they were not JSON objects
    pub invalid_lines: u64,

    /// Batches handed to the dispatcher
    pub batches: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Per-sink counters
    pub sinks: Vec<(String, MetricsSnapshot)>,

    /// Per-sink delivery statistics
    pub delivery: MetricsSummary,
}

impl PipelineStats {
    /// Events read per second
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_read as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Batches that failed on any sink
    pub fn failed_batches(&self) -> u64 {
        self.sinks.iter().map(|(_, s)| s.failed_batches).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Shipper Statistics ===\n");

        println!("Overview");
        println!("   Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   Events read: {}", self.events_read);
        println!("   Invalid lines: {}", self.invalid_lines);
        println!("   Batches: {}", self.batches);
        println!("   Events/s: {:.2}", self.events_per_sec());

        for (name, snapshot) in &self.sinks {
            println!("\nSink '{}'", name);
            println!("   Requests sent: {}", snapshot.dispatch_count);
            println!("   Items retried: {}", snapshot.retried_items);
            println!(
                "   Delivered: {} batches, {} events",
                snapshot.delivered_batches, snapshot.delivered_events
            );
            println!("   Failed batches: {}", snapshot.failed_batches);
        }

        if !self.delivery.sinks.is_empty() {
            println!("\n{}", self.delivery);
        }

        println!();
    }
}
