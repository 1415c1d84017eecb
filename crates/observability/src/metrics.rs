//! Forwarder 指标收集模块
//!
//! 批次提交、完成、调度失败与 drain 的 Prometheus 指标，以及供 CLI 输出摘要的
//! 内存聚合器。

use std::collections::BTreeMap;
use std::time::Duration;

use contracts::{Level, LogEvent};
use metrics::{counter, gauge, histogram};

/// 记录一个批次被提交
pub fn record_batch_submitted(events: usize) {
    counter!("log_forwarder_batches_submitted_total").increment(1);
    counter!("log_forwarder_events_submitted_total").increment(events as u64);
    histogram!("log_forwarder_batch_size").record(events as f64);
}

/// 记录一次调度失败（执行器拒绝）
pub fn record_scheduling_failure() {
    counter!("log_forwarder_scheduling_failures_total").increment(1);
}

/// 记录批次完成
///
/// `status` 为 `delivered` / `dropped` / `aborted`
pub fn record_batch_completed(status: &str, published: usize) {
    counter!(
        "log_forwarder_batches_completed_total",
        "status" => status.to_string()
    )
    .increment(1);
    if published > 0 {
        counter!("log_forwarder_events_published_total").increment(published as u64);
    }
}

/// 当前在途批次数
pub fn record_in_flight(in_flight: usize) {
    gauge!("log_forwarder_batches_in_flight").set(in_flight as f64);
}

/// 记录一次 drain 的耗时与结果
pub fn record_drain(elapsed: Duration, drained: bool) {
    let status = if drained { "drained" } else { "timeout" };
    counter!(
        "log_forwarder_drains_total",
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("log_forwarder_drain_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
}

/// 记录从输入端收到的事件
pub fn record_event_received(event: &LogEvent) {
    counter!(
        "log_forwarder_events_received_total",
        "level" => event.level.to_string()
    )
    .increment(1);
}

/// 记录无法解析的输入行
pub fn record_input_rejected() {
    counter!("log_forwarder_input_rejected_total").increment(1);
}

/// 输入侧聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ForwarderMetricsAggregator {
    /// 读取的事件总数
    pub total_events: u64,

    /// 无法解析的行数
    pub rejected_lines: u64,

    /// 组成的批次数
    pub total_batches: u64,

    /// 批次大小统计
    pub batch_stats: RunningStats,

    /// 各级别事件数
    pub level_counts: BTreeMap<Level, u64>,
}

impl ForwarderMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 统计一个事件
    pub fn record_event(&mut self, event: &LogEvent) {
        self.total_events += 1;
        *self.level_counts.entry(event.level).or_insert(0) += 1;
        record_event_received(event);
    }

    /// 统计一行无法解析的输入
    pub fn record_rejected(&mut self) {
        self.rejected_lines += 1;
        record_input_rejected();
    }

    /// 统计一个批次
    pub fn record_batch(&mut self, size: usize) {
        self.total_batches += 1;
        self.batch_stats.push(size as f64);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_events: self.total_events,
            rejected_lines: self.rejected_lines,
            total_batches: self.total_batches,
            batch_size: StatsSummary::from(&self.batch_stats),
            level_counts: self.level_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_events: u64,
    pub rejected_lines: u64,
    pub total_batches: u64,
    pub batch_size: StatsSummary,
    pub level_counts: BTreeMap<Level, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Input Summary ===")?;
        writeln!(f, "Events read: {}", self.total_events)?;
        writeln!(f, "Rejected lines: {}", self.rejected_lines)?;
        writeln!(f, "Batches: {}", self.total_batches)?;
        writeln!(f, "Batch size: {}", self.batch_size)?;

        if !self.level_counts.is_empty() {
            writeln!(f, "Events by level:")?;
            for (level, count) in &self.level_counts {
                writeln!(f, "  {}: {}", level, count)?;
            }
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

    pub fn count(&self) -> u64 {
        self.count
    }

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

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [512.0, 512.0, 100.0, 300.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 4);
        assert!((stats.mean() - 356.0).abs() < 1e-10);
        assert!((stats.min() - 100.0).abs() < 1e-10);
        assert!((stats.max() - 512.0).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_counts_levels() {
        let mut aggregator = ForwarderMetricsAggregator::new();
        aggregator.record_event(&LogEvent::new("A", Level::Info, "x"));
        aggregator.record_event(&LogEvent::new("A", Level::Error, "y"));
        aggregator.record_event(&LogEvent::new("B", Level::Info, "z"));
        aggregator.record_rejected();
        aggregator.record_batch(3);

        let summary = aggregator.summary();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.rejected_lines, 1);
        assert_eq!(summary.total_batches, 1);
        assert_eq!(summary.level_counts.get(&Level::Info), Some(&2));

        aggregator.reset();
        assert_eq!(aggregator.total_events, 0);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = ForwarderMetricsAggregator::new();
        aggregator.record_event(&LogEvent::new("A", Level::Warn, "x"));
        aggregator.record_batch(1);

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Events read: 1"));
        assert!(output.contains("WARN: 1"));
        assert!(output.contains("n=1"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_batch_submitted(3);
        record_scheduling_failure();
        record_batch_completed("delivered", 3);
        record_in_flight(0);
        record_drain(Duration::from_millis(5), true);
    }
}
