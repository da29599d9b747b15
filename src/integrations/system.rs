//! Host probe: the OS boundary for memory, network counters and volumes.

use parking_lot::Mutex;
use std::path::Path;
use sysinfo::{Disks, MemoryRefreshKind, Networks, RefreshKind, System};

use crate::error::ProbeError;
use crate::integrations::network::{self, NetworkInterface};

/// Selector summing every non-loopback interface.
pub const ALL_INTERFACES: &str = "all";

/// Raw virtual-memory page counts from a single statistics call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmStatistics {
    pub free_pages: u64,
    pub active_pages: u64,
    pub inactive_pages: u64,
    pub wired_pages: u64,
    pub compressed_pages: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeCapacity {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl VolumeCapacity {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    pub fn used_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.used_bytes() as f64 / self.total_bytes as f64 * 100.0
        }
    }
}

/// Cumulative byte counters since interface initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Everything the metrics subsystem asks of the operating system.
///
/// Implementations extract plain values and release OS handles before
/// returning; nothing here may block beyond a single syscall or small read.
pub trait HostProbe: Send + Sync {
    /// Physical memory size in bytes. Never fails; 0 means unknown.
    fn total_memory(&self) -> u64;

    fn vm_statistics(&self) -> Result<VmStatistics, ProbeError>;

    /// Non-loopback interfaces with their up/down state.
    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>, ProbeError>;

    /// Counters for one interface, or the sum over all non-loopback
    /// interfaces when `selector` is [`ALL_INTERFACES`].
    fn interface_byte_counters(&self, selector: &str) -> Result<ByteCounters, ProbeError>;

    fn volume_capacity(&self, path: &Path) -> Result<VolumeCapacity, ProbeError>;
}

/// Production probe. Keeps reusable `sysinfo` handles to avoid reallocation
/// on every tick; each is behind its own lock since refreshing needs `&mut`.
pub struct SystemMonitor {
    sys: Mutex<System>,
    networks: Mutex<Networks>,
    disks: Mutex<Disks>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );

        Self {
            sys: Mutex::new(sys),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SystemMonitor {
    fn total_memory(&self) -> u64 {
        let mut sys = self.sys.lock();
        sys.refresh_memory();
        sys.total_memory()
    }

    fn vm_statistics(&self) -> Result<VmStatistics, ProbeError> {
        #[cfg(target_os = "macos")]
        {
            mach_vm_statistics()
        }

        #[cfg(target_os = "linux")]
        {
            let content = std::fs::read_to_string("/proc/meminfo")?;
            parse_meminfo(&content)
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            let mut sys = self.sys.lock();
            sys.refresh_memory();
            Ok(VmStatistics {
                free_pages: sys.free_memory(),
                active_pages: sys.used_memory(),
                page_size: 1,
                ..Default::default()
            })
        }
    }

    fn network_interfaces(&self) -> Result<Vec<NetworkInterface>, ProbeError> {
        Ok(network::enumerate()?
            .into_iter()
            .filter(|iface| !iface.is_loopback)
            .collect())
    }

    fn interface_byte_counters(&self, selector: &str) -> Result<ByteCounters, ProbeError> {
        // Enumeration failing only costs us flag-based loopback detection.
        let interfaces = network::enumerate().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "interface enumeration failed, using name heuristics");
            Vec::new()
        });
        let is_loopback = |name: &str| network::is_loopback(name, &interfaces);

        let mut networks = self.networks.lock();
        networks.refresh_list();

        if selector == ALL_INTERFACES {
            return Ok(networks
                .list()
                .iter()
                .filter(|(name, _)| !is_loopback(name.as_str()))
                .fold(ByteCounters::default(), |acc, (_, data)| ByteCounters {
                    rx_bytes: acc.rx_bytes.saturating_add(data.total_received()),
                    tx_bytes: acc.tx_bytes.saturating_add(data.total_transmitted()),
                }));
        }

        if is_loopback(selector) {
            return Err(ProbeError::InterfaceNotFound(selector.to_string()));
        }

        networks
            .list()
            .get(selector)
            .map(|data| ByteCounters {
                rx_bytes: data.total_received(),
                tx_bytes: data.total_transmitted(),
            })
            .ok_or_else(|| ProbeError::InterfaceNotFound(selector.to_string()))
    }

    fn volume_capacity(&self, path: &Path) -> Result<VolumeCapacity, ProbeError> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let mut disks = self.disks.lock();
        disks.refresh();
        if disks.list().is_empty() {
            disks.refresh_list();
        }

        let index = mount_for(disks.list().iter().map(|d| d.mount_point()), &path)
            .ok_or_else(|| ProbeError::VolumeNotFound(path.display().to_string()))?;
        let disk = &disks.list()[index];

        Ok(VolumeCapacity {
            total_bytes: disk.total_space(),
            available_bytes: disk.available_space(),
        })
    }
}

/// Index of the deepest mount point containing `path`.
fn mount_for<'a>(mount_points: impl IntoIterator<Item = &'a Path>, path: &Path) -> Option<usize> {
    mount_points
        .into_iter()
        .enumerate()
        .filter(|(_, mount)| path.starts_with(mount))
        .max_by_key(|(_, mount)| mount.components().count())
        .map(|(index, _)| index)
}

#[cfg(target_os = "macos")]
#[allow(deprecated)]
fn mach_vm_statistics() -> Result<VmStatistics, ProbeError> {
    // SAFETY: vm_statistics64 is plain old data and host_statistics64 fills at
    // most `count` integers of it; sysconf(_SC_PAGESIZE) is always safe.
    let (code, stats, page_size) = unsafe {
        let mut stats: libc::vm_statistics64 = std::mem::zeroed();
        let mut count = libc::HOST_VM_INFO64_COUNT;
        let code = libc::host_statistics64(
            libc::mach_host_self(),
            libc::HOST_VM_INFO64,
            &mut stats as *mut libc::vm_statistics64 as libc::host_info64_t,
            &mut count,
        );
        (code, stats, libc::sysconf(libc::_SC_PAGESIZE))
    };

    if code != libc::KERN_SUCCESS {
        return Err(ProbeError::Kernel {
            call: "host_statistics64",
            code,
        });
    }

    Ok(VmStatistics {
        free_pages: u64::from(stats.free_count),
        active_pages: u64::from(stats.active_count),
        inactive_pages: u64::from(stats.inactive_count),
        wired_pages: u64::from(stats.wire_count),
        compressed_pages: u64::from(stats.compressor_page_count),
        page_size: u64::try_from(page_size).unwrap_or(4096),
    })
}

/// `/proc/meminfo` reports kB, so counts are expressed as 1 KiB pages.
/// `Unevictable` stands in for wired memory; Linux has no compressor count.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(content: &str) -> Result<VmStatistics, ProbeError> {
    let field = |name: &str| -> Option<u64> {
        content.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            rest.split_whitespace().next()?.parse().ok()
        })
    };
    let required = |name: &'static str| {
        field(name).ok_or_else(|| ProbeError::Parse {
            source_name: "/proc/meminfo",
            reason: format!("missing {}", name),
        })
    };

    Ok(VmStatistics {
        free_pages: required("MemFree")?,
        active_pages: required("Active")?,
        inactive_pages: required("Inactive")?,
        wired_pages: field("Unevictable").unwrap_or(0),
        compressed_pages: 0,
        page_size: 1024,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_parses_meminfo_fields() {
        let content = "\
MemTotal:       16318480 kB
MemFree:         1203388 kB
MemAvailable:    9876540 kB
Active:          5123456 kB
Inactive:        4321000 kB
Active(anon):    3000000 kB
Unevictable:       12345 kB
";
        let stats = parse_meminfo(content).unwrap();
        assert_eq!(
            stats,
            VmStatistics {
                free_pages: 1_203_388,
                active_pages: 5_123_456,
                inactive_pages: 4_321_000,
                wired_pages: 12_345,
                compressed_pages: 0,
                page_size: 1024,
            }
        );
    }

    #[test]
    fn test_meminfo_without_required_field_is_an_error() {
        assert!(parse_meminfo("MemTotal: 100 kB\n").is_err());
    }

    #[test]
    fn test_picks_deepest_mount_point() {
        let mounts = [
            PathBuf::from("/"),
            PathBuf::from("/System/Volumes/Data"),
            PathBuf::from("/Volumes/External"),
        ];
        let pick = |p: &str| mount_for(mounts.iter().map(|m| m.as_path()), Path::new(p));

        assert_eq!(pick("/System/Volumes/Data/Users/me"), Some(1));
        assert_eq!(pick("/Volumes/External"), Some(2));
        assert_eq!(pick("/usr/bin"), Some(0));
        assert_eq!(mount_for(std::iter::empty::<&Path>(), Path::new("/")), None);
    }

    #[test]
    fn test_volume_percentages() {
        let volume = VolumeCapacity {
            total_bytes: 1000,
            available_bytes: 250,
        };
        assert_eq!(volume.used_bytes(), 750);
        assert!((volume.used_percentage() - 75.0).abs() < 1e-9);
        assert_eq!(VolumeCapacity::default().used_percentage(), 0.0);
    }

    #[test]
    fn test_samples_host_without_panicking() {
        let monitor = SystemMonitor::new();

        if let Ok(stats) = monitor.vm_statistics() {
            assert!(stats.page_size > 0, "page size should be positive");
        }
        if let Ok(volume) = monitor.volume_capacity(Path::new("/")) {
            assert!(volume.available_bytes <= volume.total_bytes);
        }
        let _ = monitor.interface_byte_counters(ALL_INTERFACES);
        assert!(monitor.interface_byte_counters("lo").is_err());
    }
}
