//! Terminal output for snapshots and sparklines

use crate::history::Sample;
use crate::integrations::folder::DirectorySize;
use crate::integrations::network::NetworkInterface;
use crate::metrics::{format, MetricKind, MetricSnapshot};

const BAR_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Render the most recent `width` samples as block characters, scaled to the
/// largest value shown (or to 100 for percentages).
pub fn sparkline(history: &[Sample], width: usize, percent_scale: bool) -> String {
    let recent = &history[history.len().saturating_sub(width)..];
    let max = if percent_scale {
        100.0
    } else {
        recent.iter().map(|s| s.value).fold(0.0_f64, f64::max)
    };

    recent
        .iter()
        .map(|s| {
            if max <= 0.0 {
                return BAR_CHARS[0];
            }
            let idx = ((s.value / max) * 7.0).round().clamp(0.0, 7.0) as usize;
            BAR_CHARS[idx]
        })
        .collect()
}

/// One summary line, e.g. `MEM  67%  1.0 GB/1.5 GB ▂▃▅`.
pub fn summary_line(snapshot: &MetricSnapshot, sparkline_width: usize) -> String {
    let (label, detail, percent_scale) = match snapshot.kind {
        MetricKind::Disk => (
            "DSK",
            format!(
                "{:>4}  {}/{}",
                snapshot.formatted("percent"),
                snapshot.formatted("used"),
                snapshot.formatted("total")
            ),
            true,
        ),
        MetricKind::Memory => (
            "MEM",
            format!(
                "{:>4}  {}/{}",
                snapshot.formatted("percent"),
                snapshot.formatted("used"),
                snapshot.formatted("total")
            ),
            true,
        ),
        MetricKind::NetworkDownload => ("DL ", format!("{:>11}", snapshot.formatted("rate")), false),
        MetricKind::NetworkUpload => ("UL ", format!("{:>11}", snapshot.formatted("rate")), false),
    };

    let spark = sparkline(&snapshot.history, sparkline_width, percent_scale);
    if spark.is_empty() {
        format!("{} {}", label, detail)
    } else {
        format!("{} {} {}", label, detail, spark)
    }
}

pub fn print_snapshot(snapshot: &MetricSnapshot) {
    println!("{}", summary_line(snapshot, 30));
    for (label, value) in &snapshot.formatted {
        println!("  {:<10} {}", label, value);
    }
}

pub fn print_history(kind: MetricKind, history: &[Sample]) {
    if history.is_empty() {
        println!("No {} history recorded", kind);
        return;
    }

    let percent = matches!(kind, MetricKind::Memory | MetricKind::Disk);
    println!("{}", sparkline(history, history.len(), percent));
    for sample in history {
        let value = if percent {
            format::format_percent(sample.value)
        } else {
            format::format_bandwidth(sample.value)
        };
        println!(
            "  {}  {}",
            sample.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
            value
        );
    }
}

pub fn print_interfaces(interfaces: &[NetworkInterface]) {
    if interfaces.is_empty() {
        println!("No network interfaces found");
        return;
    }
    for iface in interfaces {
        let state = if iface.is_up { "up" } else { "down" };
        println!("  {:<12} {}", iface.name, state);
    }
}

pub fn print_folder_size(path: &std::path::Path, size: &DirectorySize) {
    println!("{}", path.display());
    println!("  size       {}", format::format_bytes(size.total_bytes));
    println!("  files      {}", size.file_count);
    println!("  folders    {}", size.folder_count);
}
