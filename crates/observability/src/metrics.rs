//! 投递指标收集模块
//!
//! 通过 `metrics` 门面记录投递引擎的运行指标，并提供内存聚合器用于输出摘要。

use contracts::{DeliveryError, ItemTally};
use metrics::{counter, gauge, histogram};
use std::collections::HashMap;
use std::time::Duration;

/// 记录一次请求发送
pub fn record_dispatch(sink_name: &str, items: usize, attempt: u32) {
    counter!(
        "shipper_dispatches_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);

    histogram!(
        "shipper_dispatch_items",
        "sink" => sink_name.to_string()
    )
    .record(items as f64);

    if attempt > 1 {
        counter!(
            "shipper_retry_dispatches_total",
            "sink" => sink_name.to_string()
        )
        .increment(1);
    }
}

/// 记录部分失败后重新提交的条目
pub fn record_retry(sink_name: &str, items: usize) {
    counter!(
        "shipper_items_retried_total",
        "sink" => sink_name.to_string()
    )
    .increment(items as u64);
}

/// 记录批次投递成功
pub fn record_batch_delivered(sink_name: &str, events: usize, attempts: u32, elapsed: Duration) {
    counter!(
        "shipper_batches_total",
        "sink" => sink_name.to_string(),
        "status" => "success"
    )
    .increment(1);

    counter!(
        "shipper_events_delivered_total",
        "sink" => sink_name.to_string()
    )
    .increment(events as u64);

    histogram!(
        "shipper_batch_attempts",
        "sink" => sink_name.to_string()
    )
    .record(attempts as f64);

    histogram!(
        "shipper_batch_latency_ms",
        "sink" => sink_name.to_string()
    )
    .record(elapsed.as_secs_f64() * 1000.0);
}

/// 记录批次投递失败
pub fn record_batch_failed(sink_name: &str, error: &DeliveryError) {
    counter!(
        "shipper_batches_total",
        "sink" => sink_name.to_string(),
        "status" => error.kind()
    )
    .increment(1);
}

/// 记录在途批次数
pub fn record_in_flight(sink_name: &str, in_flight: usize) {
    gauge!(
        "shipper_batches_in_flight",
        "sink" => sink_name.to_string()
    )
    .set(in_flight as f64);
}

/// 投递指标聚合器
///
/// 在内存中按 sink 聚合批次结果，便于运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryMetricsAggregator {
    sinks: HashMap<String, SinkAggregate>,
}

/// 单个 sink 的聚合数据
#[derive(Debug, Clone, Default)]
pub struct SinkAggregate {
    /// 成功批次数
    pub delivered_batches: u64,

    /// 成功投递的事件数
    pub delivered_events: u64,

    /// 结果中仍带错误的条目数
    pub item_errors: u64,

    /// 结果中的占位 (postponed) 条目数
    pub postponed_items: u64,

    /// 按错误类型统计的失败批次
    pub failures: HashMap<&'static str, u64>,

    /// 批次延迟统计 (毫秒)
    pub latency_ms: RunningStats,
}

impl DeliveryMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录成功批次
    pub fn record_success(&mut self, sink_name: &str, tally: ItemTally, elapsed: Duration) {
        let sink = self.sinks.entry(sink_name.to_string()).or_default();
        sink.delivered_batches += 1;
        sink.delivered_events += tally.items as u64;
        sink.item_errors += tally.errors as u64;
        sink.postponed_items += tally.postponed as u64;
        sink.latency_ms.push(elapsed.as_secs_f64() * 1000.0);
    }

    /// 记录失败批次
    pub fn record_failure(&mut self, sink_name: &str, error: &DeliveryError, elapsed: Duration) {
        let sink = self.sinks.entry(sink_name.to_string()).or_default();
        *sink.failures.entry(error.kind()).or_insert(0) += 1;
        sink.latency_ms.push(elapsed.as_secs_f64() * 1000.0);
    }

    /// 指定 sink 的聚合数据
    pub fn sink(&self, sink_name: &str) -> Option<&SinkAggregate> {
        self.sinks.get(sink_name)
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let mut sinks: Vec<SinkSummary> = self
            .sinks
            .iter()
            .map(|(name, agg)| SinkSummary {
                name: name.clone(),
                delivered_batches: agg.delivered_batches,
                delivered_events: agg.delivered_events,
                item_errors: agg.item_errors,
                postponed_items: agg.postponed_items,
                failed_batches: agg.failures.values().sum(),
                latency_ms: StatsSummary::from(&agg.latency_ms),
            })
            .collect();
        sinks.sort_by(|a, b| a.name.cmp(&b.name));
        MetricsSummary { sinks }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub sinks: Vec<SinkSummary>,
}

/// 单个 sink 的摘要
#[derive(Debug, Clone, Default)]
pub struct SinkSummary {
    pub name: String,
    pub delivered_batches: u64,
    pub delivered_events: u64,
    pub item_errors: u64,
    pub postponed_items: u64,
    pub failed_batches: u64,
    pub latency_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Metrics Summary ===")?;
        for sink in &self.sinks {
            writeln!(f, "Sink: {}", sink.name)?;
            writeln!(
                f,
                "  Delivered: {} batches, {} events",
                sink.delivered_batches, sink.delivered_events
            )?;
            if sink.item_errors > 0 || sink.postponed_items > 0 {
                writeln!(
                    f,
                    "  Items: {} with errors, {} postponed",
                    sink.item_errors, sink.postponed_items
                )?;
            }
            writeln!(f, "  Failed batches: {}", sink.failed_batches)?;
            writeln!(f, "  Latency (ms): {}", sink.latency_ms)?;
        }
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_records_per_sink() {
        let mut aggregator = DeliveryMetricsAggregator::new();
        aggregator.record_success("es", ItemTally::delivered(100), Duration::from_millis(40));
        aggregator.record_success(
            "es",
            ItemTally {
                items: 50,
                errors: 2,
                postponed: 3,
            },
            Duration::from_millis(60),
        );
        aggregator.record_failure(
            "es",
            &DeliveryError::transport("es", "timeout"),
            Duration::from_millis(5),
        );

        let es = aggregator.sink("es").unwrap();
        assert_eq!(es.delivered_batches, 2);
        assert_eq!(es.delivered_events, 150);
        assert_eq!(es.item_errors, 2);
        assert_eq!(es.postponed_items, 3);
        assert_eq!(es.failures.get("transport"), Some(&1));
        assert!(aggregator.sink("stream").is_none());
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = DeliveryMetricsAggregator::new();
        aggregator.record_success("stream", ItemTally::delivered(10), Duration::from_millis(20));
        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Sink: stream"));
        assert!(output.contains("1 batches, 10 events"));
        assert!(!output.contains("postponed"));

        aggregator.record_success(
            "search",
            ItemTally {
                items: 4,
                errors: 1,
                postponed: 2,
            },
            Duration::from_millis(20),
        );
        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Items: 1 with errors, 2 postponed"));
    }
}
