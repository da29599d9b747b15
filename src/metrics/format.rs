//! Display strings for byte counts and throughput

use humansize::{format_size, WINDOWS};

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Binary-scaled size with short units, e.g. "512 MB".
pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, WINDOWS)
}

/// Throughput with one decimal below GB/s and two at or above it.
///
/// The unit is chosen after rounding, so a value just under a boundary reads
/// "1.0 MB/s" rather than "1024.0 KB/s".
pub fn format_bandwidth(bytes_per_sec: f64) -> String {
    let rate = if bytes_per_sec.is_finite() && bytes_per_sec > 0.0 {
        bytes_per_sec
    } else {
        0.0
    };

    for (unit, scale) in [("B/s", 1.0), ("KB/s", KIB), ("MB/s", MIB)] {
        let scaled = rate / scale;
        if (scaled * 10.0).round() / 10.0 < KIB {
            return format!("{:.1} {}", scaled, unit);
        }
    }
    format!("{:.2} GB/s", rate / GIB)
}

pub fn format_percent(value: f64) -> String {
    format!("{:.0}%", if value.is_finite() { value } else { 0.0 })
}
