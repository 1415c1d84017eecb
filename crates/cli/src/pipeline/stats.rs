//! Forwarding run statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::MetricsSummary;

/// Statistics from one `run`
#[derive(Debug, Clone, Default)]
pub struct ForwardStats {
    /// Client id used for the broker connection
    pub client_id: String,

    /// Time from connect to close
    pub duration: Duration,

    /// Whether every batch finished before the drain timeout
    pub drained: bool,

    /// Batches still running when the connection was closed
    pub in_flight_at_close: usize,

    /// Input-side counters
    pub input: MetricsSummary,

    /// Dispatcher counters
    pub dispatch: MetricsSnapshot,
}

impl ForwardStats {
    /// Published events per second
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.dispatch.events_published as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                   Forwarding Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Client id: {}", self.client_id);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Events read: {}", self.input.total_events);
        println!("   ├─ Rejected lines: {}", self.input.rejected_lines);
        println!("   ├─ Batch size: {}", self.input.batch_size);
        println!("   └─ Throughput: {:.2} events/s", self.events_per_sec());

        let d = &self.dispatch;
        println!("\n📤 Dispatch");
        println!("   ├─ Batches submitted: {}", d.submitted);
        println!("   ├─ Batches completed: {}", d.completed);
        println!("   ├─ Scheduling failures: {}", d.scheduling_failures);
        println!("   ├─ Dropped (not connected): {}", d.dropped);
        println!("   ├─ Aborted by send failure: {}", d.failed);
        println!("   └─ Events published: {}", d.events_published);

        if !self.drained {
            println!(
                "\n⚠️  Drain timed out with {} batch(es) in flight",
                self.in_flight_at_close
            );
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_per_sec() {
        let mut stats = ForwardStats {
            duration: Duration::from_secs(2),
            ..Default::default()
        };
        stats.dispatch.events_published = 10;
        assert!((stats.events_per_sec() - 5.0).abs() < 1e-10);

        stats.duration = Duration::ZERO;
        assert_eq!(stats.events_per_sec(), 0.0);
    }
}
