//! Memory snapshot reader

use chrono::{DateTime, Utc};

use crate::integrations::system::HostProbe;

/// Byte breakdown of host memory at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySnapshot {
    pub total: u64,
    pub free: u64,
    pub active: u64,
    pub inactive: u64,
    pub wired: u64,
    pub compressed: u64,
    pub used: u64,
    pub used_percentage: f64,
    pub timestamp: DateTime<Utc>,
}

impl MemorySnapshot {
    /// A zero `used_percentage` only means "0% used" when the reading worked.
    pub fn is_known(&self) -> bool {
        self.total > 0 && self.used > 0
    }
}

/// Read one coherent snapshot.
///
/// `used` is active + wired + compressed. Inactive pages are deliberately left
/// out: they are reclaimable but not yet reclaimed, so `free + used` can be
/// less than `total`.
///
/// If the statistics call fails the page-derived fields are zero while
/// `total` still comes from its own source.
pub fn read_memory_snapshot(probe: &dyn HostProbe, now: DateTime<Utc>) -> MemorySnapshot {
    let total = probe.total_memory();

    let stats = match probe.vm_statistics() {
        Ok(stats) => stats,
        Err(e) => {
            tracing::debug!(error = %e, "memory statistics unavailable");
            return MemorySnapshot {
                total,
                free: 0,
                active: 0,
                inactive: 0,
                wired: 0,
                compressed: 0,
                used: 0,
                used_percentage: 0.0,
                timestamp: now,
            };
        }
    };

    let bytes = |pages: u64| pages.saturating_mul(stats.page_size);
    let active = bytes(stats.active_pages);
    let wired = bytes(stats.wired_pages);
    let compressed = bytes(stats.compressed_pages);
    let used = active.saturating_add(wired).saturating_add(compressed);

    let used_percentage = if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    MemorySnapshot {
        total,
        free: bytes(stats.free_pages),
        active,
        inactive: bytes(stats.inactive_pages),
        wired,
        compressed,
        used,
        used_percentage,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::FakeProbe;
    use crate::integrations::system::VmStatistics;

    fn synthetic() -> FakeProbe {
        FakeProbe {
            total_memory: 4096 * 390,
            vm: Some(VmStatistics {
                free_pages: 100,
                active_pages: 200,
                inactive_pages: 30,
                wired_pages: 50,
                compressed_pages: 10,
                page_size: 4096,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_accounts_used_memory_without_inactive() {
        let snapshot = read_memory_snapshot(&synthetic(), Utc::now());

        let used = (200 + 50 + 10) * 4096u64;
        assert_eq!(snapshot.used, used);
        assert_eq!(snapshot.free, 100 * 4096);
        assert_eq!(snapshot.inactive, 30 * 4096);
        assert!(snapshot.free + snapshot.used < snapshot.total);

        let expected = used as f64 / (4096.0 * 390.0) * 100.0;
        assert!((snapshot.used_percentage - expected).abs() < 1e-9);
        assert!(snapshot.is_known());
    }

    #[test]
    fn test_failed_statistics_keep_total() {
        let probe = FakeProbe {
            total_memory: 8 << 30,
            vm: None,
            ..Default::default()
        };
        let snapshot = read_memory_snapshot(&probe, Utc::now());

        assert_eq!(snapshot.total, 8 << 30);
        assert_eq!(snapshot.used, 0);
        assert_eq!(snapshot.used_percentage, 0.0);
        assert!(!snapshot.is_known());
    }

    #[test]
    fn test_unknown_total_yields_zero_percent() {
        let probe = FakeProbe {
            total_memory: 0,
            ..synthetic()
        };
        let snapshot = read_memory_snapshot(&probe, Utc::now());
        assert_eq!(snapshot.used_percentage, 0.0);
        assert!(!snapshot.is_known());
    }
}
