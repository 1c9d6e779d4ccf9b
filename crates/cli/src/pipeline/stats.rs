//! Run statistics.

use std::time::Duration;

use dispatcher::StreamMetricsSnapshot;

/// Statistics from an engine run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Configured subscriptions that were established
    pub subscriptions_established: usize,

    /// Configured subscriptions rejected at establish time
    pub establish_failures: usize,

    /// Subscriptions still registered at shutdown
    pub active_subscriptions: usize,

    /// Subscription records in the store mirror at shutdown
    pub mirror_records: usize,

    /// Configured sinks attached
    pub sinks_attached: usize,

    /// Store mutations produced by the simulation
    pub simulated_changes: u64,

    /// Fan-out counters per stream at shutdown
    pub streams: Vec<(String, StreamMetricsSnapshot)>,

    /// Total duration of the run
    pub duration: Duration,
}

impl PipelineStats {
    /// Payloads handed to sinks across all streams
    pub fn total_writes(&self) -> u64 {
        self.streams.iter().map(|(_, s)| s.write_count).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Run Statistics                          ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!(
            "   ├─ Subscriptions: {} established, {} failed, {} active at exit",
            self.subscriptions_established, self.establish_failures, self.active_subscriptions
        );
        println!("   ├─ Mirror records: {}", self.mirror_records);
        println!("   ├─ Sinks attached: {}", self.sinks_attached);
        println!("   ├─ Simulated changes: {}", self.simulated_changes);
        println!("   └─ Sink writes: {}", self.total_writes());

        if !self.streams.is_empty() {
            println!("\n📤 Streams");
            for (i, (stream, snapshot)) in self.streams.iter().enumerate() {
                let prefix = if i == self.streams.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {} {}: {} sinks, {} delivered, {} writes, {} failed, {} pruned",
                    prefix,
                    stream,
                    snapshot.sink_count,
                    snapshot.deliveries,
                    snapshot.write_count,
                    snapshot.failure_count,
                    snapshot.pruned_count
                );
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_writes() {
        let stats = PipelineStats {
            streams: vec![
                (
                    "CONFIGURATION".into(),
                    StreamMetricsSnapshot {
                        write_count: 3,
                        ..Default::default()
                    },
                ),
                (
                    "OPERATIONAL".into(),
                    StreamMetricsSnapshot {
                        write_count: 4,
                        ..Default::default()
                    },
                ),
            ],
            ..Default::default()
        };
        assert_eq!(stats.total_writes(), 7);
    }
}
