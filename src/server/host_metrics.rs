use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};
use sysinfo::{DiskKind, Disks, Networks, System};
use tracing::debug;

use crate::alerting::models::MetricsSnapshot;
use crate::alerting::rules::Category;
use crate::alerting::sources::{MetricsSource, SourceError};

/// Snapshots of the local host: `cpu.usage`, `memory.usage` and `disk.usage`
/// as percentages, plus `network.rx_bytes_per_sec` / `network.tx_bytes_per_sec`.
pub struct HostMetricsSource {
    sys: System,
    disks: Disks,
    networks: Networks,
    last_collection: Option<Instant>,
}

impl HostMetricsSource {
    pub fn new() -> Self {
        let mut sys = System::new();
        // Baseline so the first snapshot has a CPU delta to work from.
        sys.refresh_cpu_usage();
        Self {
            sys,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            last_collection: None,
        }
    }

    fn collect(&mut self) -> MetricsSnapshot {
        let now = Instant::now();
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();
        self.disks.refresh(false);
        self.networks.refresh(false);

        let mut snapshot = MetricsSnapshot::new(Utc::now())
            .with(Category::Cpu, "usage", f64::from(self.sys.global_cpu_usage()))
            .with(
                Category::Memory,
                "usage",
                usage_percent(self.sys.used_memory(), self.sys.total_memory()),
            );

        let (total, available) = self
            .disks
            .list()
            .iter()
            .filter(|d| d.total_space() > 0 && matches!(d.kind(), DiskKind::HDD | DiskKind::SSD))
            .fold((0u64, 0u64), |(total, available), d| {
                (total + d.total_space(), available + d.available_space())
            });
        if total > 0 {
            snapshot.insert(
                Category::Disk,
                "usage",
                usage_percent(total.saturating_sub(available), total),
            );
        }

        // sysinfo reports per-interface deltas since the previous refresh.
        if let Some(previous) = self.last_collection {
            let elapsed = now.duration_since(previous);
            let (rx, tx) = self
                .networks
                .iter()
                .filter(|(name, _)| name.as_str() != "lo")
                .fold((0u64, 0u64), |(rx, tx), (_, data)| {
                    (rx + data.received(), tx + data.transmitted())
                });
            snapshot.insert(Category::Network, "rx_bytes_per_sec", rate_per_second(rx, elapsed));
            snapshot.insert(Category::Network, "tx_bytes_per_sec", rate_per_second(tx, elapsed));
        }
        self.last_collection = Some(now);

        debug!(values = ?snapshot.values, "Collected host metrics.");
        snapshot
    }
}

impl Default for HostMetricsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for HostMetricsSource {
    async fn snapshot(&mut self) -> Result<Option<MetricsSnapshot>, SourceError> {
        Ok(Some(self.collect()))
    }
}

fn usage_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64) * 100.0
    }
}

fn rate_per_second(delta: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        delta as f64 / secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_percent() {
        assert_eq!(usage_percent(50, 200), 25.0);
        assert_eq!(usage_percent(0, 0), 0.0);
    }

    #[test]
    fn test_rate_per_second() {
        assert_eq!(rate_per_second(1000, Duration::from_secs(2)), 500.0);
        assert_eq!(rate_per_second(1000, Duration::ZERO), 0.0);
    }

    #[tokio::test]
    async fn test_host_snapshot_has_core_metrics() {
        let mut source = HostMetricsSource::new();
        let snapshot = source.snapshot().await.unwrap().unwrap();
        let cpu = snapshot.get(Category::Cpu, "usage").unwrap();
        assert!((0.0..=100.0 * 1024.0).contains(&cpu));
        let memory = snapshot.get(Category::Memory, "usage").unwrap();
        assert!((0.0..=100.0).contains(&memory));
        // No network rates until there is a previous collection to diff against.
        assert!(snapshot.get(Category::Network, "rx_bytes_per_sec").is_none());

        let second = source.snapshot().await.unwrap().unwrap();
        assert!(second.get(Category::Network, "rx_bytes_per_sec").is_some());
    }
}
