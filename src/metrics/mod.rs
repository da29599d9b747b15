//! Metrics facade: one call per widget refresh, always a renderable snapshot

pub mod format;
pub mod memory;
pub mod rate;

#[cfg(test)]
pub mod testing;

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::history::persist::BlobStore;
use crate::history::{HistorySettings, HistoryStore, Sample};
use crate::integrations::network::NetworkInterface;
use crate::integrations::system::HostProbe;

use self::rate::{ByteRateSampler, ByteRates};

pub const MEMORY_STREAM: &str = "memory";
const SELECTION_KEY: &str = "network.selection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MetricKind {
    Disk,
    Memory,
    NetworkDownload,
    NetworkUpload,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disk => write!(f, "disk"),
            Self::Memory => write!(f, "memory"),
            Self::NetworkDownload => write!(f, "network download"),
            Self::NetworkUpload => write!(f, "network upload"),
        }
    }
}

impl MetricKind {
    /// History stream for this kind, if it keeps one. Each network interface
    /// gets its own pair of streams.
    pub fn stream_id(self, stream_key: &str) -> Option<String> {
        match self {
            Self::Disk => None,
            Self::Memory => Some(MEMORY_STREAM.to_string()),
            Self::NetworkDownload => Some(format!("network.download.{}", stream_key)),
            Self::NetworkUpload => Some(format!("network.upload.{}", stream_key)),
        }
    }
}

/// Value handed to presentation. Built fresh per call, never mutated after.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub kind: MetricKind,
    pub stream_key: String,
    pub current: Sample,
    pub history: Vec<Sample>,
    pub formatted: BTreeMap<String, String>,
}

impl MetricSnapshot {
    fn new(kind: MetricKind, stream_key: &str, current: Sample) -> Self {
        Self {
            kind,
            stream_key: stream_key.to_string(),
            current,
            history: Vec::new(),
            formatted: BTreeMap::new(),
        }
    }

    fn with(mut self, label: &str, value: String) -> Self {
        self.formatted.insert(label.to_string(), value);
        self
    }

    pub fn formatted(&self, label: &str) -> &str {
        self.formatted.get(label).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct FacadeSettings {
    /// How far back `history` reaches in returned snapshots.
    pub window: Duration,
    /// Volume reported for [`MetricKind::Disk`].
    pub disk_path: PathBuf,
}

impl Default for FacadeSettings {
    fn default() -> Self {
        Self {
            window: Duration::minutes(15),
            disk_path: PathBuf::from("/"),
        }
    }
}

/// Context object owning the rate baselines and history buffers.
///
/// Construct once and share by `Arc`; every method takes `&self` and is safe
/// to call from any thread.
pub struct MetricsService {
    probe: Arc<dyn HostProbe>,
    blobs: Arc<dyn BlobStore>,
    history: HistoryStore,
    rates: ByteRateSampler,
    settings: FacadeSettings,
}

impl MetricsService {
    pub fn new(
        probe: Arc<dyn HostProbe>,
        blobs: Arc<dyn BlobStore>,
        history: HistorySettings,
        settings: FacadeSettings,
    ) -> Self {
        Self {
            probe,
            history: HistoryStore::new(Arc::clone(&blobs), history),
            blobs,
            rates: ByteRateSampler::new(),
            settings,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Load the memory stream and both streams of `stream_key` up front.
    pub fn preload(&self, stream_key: &str, now: DateTime<Utc>) {
        let ids: Vec<String> = [
            MetricKind::Memory,
            MetricKind::NetworkDownload,
            MetricKind::NetworkUpload,
        ]
        .into_iter()
        .filter_map(|kind| kind.stream_id(stream_key))
        .collect();
        self.history.preload(ids.iter().map(String::as_str), now);
    }

    /// Sample one metric. `stream_key` selects the network interface and is
    /// ignored for disk and memory. Never fails: OS errors yield zeros.
    pub fn get_metric(&self, kind: MetricKind, stream_key: &str, now: DateTime<Utc>) -> MetricSnapshot {
        match kind {
            MetricKind::Disk => self.disk_snapshot(now),
            MetricKind::Memory => self.memory_snapshot(now),
            MetricKind::NetworkDownload => self.network_snapshots(stream_key, now).0,
            MetricKind::NetworkUpload => self.network_snapshots(stream_key, now).1,
        }
    }

    /// Both network directions from a single counter read.
    pub fn network_snapshots(&self, stream_key: &str, now: DateTime<Utc>) -> (MetricSnapshot, MetricSnapshot) {
        let rates = match self.probe.interface_byte_counters(stream_key) {
            Ok(counters) => match self
                .rates
                .sample_rate(stream_key, counters.rx_bytes, counters.tx_bytes, now)
            {
                Some(rates) => {
                    self.record(MetricKind::NetworkDownload, stream_key, rates.download, now);
                    self.record(MetricKind::NetworkUpload, stream_key, rates.upload, now);
                    rates
                }
                // Baseline only: shown as zero, never graphed.
                None => ByteRates::default(),
            },
            Err(e) => {
                tracing::debug!(interface = stream_key, error = %e, "network counters unavailable");
                ByteRates::default()
            }
        };

        (
            self.network_snapshot(MetricKind::NetworkDownload, stream_key, rates.download, now),
            self.network_snapshot(MetricKind::NetworkUpload, stream_key, rates.upload, now),
        )
    }

    /// Establish a rate baseline without recording history, so a one-shot
    /// caller can read a real rate on its next call.
    pub fn prime_network(&self, stream_key: &str, now: DateTime<Utc>) {
        if let Ok(counters) = self.probe.interface_byte_counters(stream_key) {
            let _ = self
                .rates
                .sample_rate(stream_key, counters.rx_bytes, counters.tx_bytes, now);
        }
    }

    /// Remember the selected interface. When it differs from the previous
    /// selection, the new interface's baseline and history start over so
    /// unrelated data is never graphed as continuous. Returns whether it changed.
    pub fn select_interface(&self, stream_key: &str) -> bool {
        let previous = match self.blobs.load(SELECTION_KEY) {
            Ok(bytes) => bytes.and_then(|b| String::from_utf8(b).ok()),
            Err(e) => {
                tracing::warn!(error = %e, "could not read interface selection");
                None
            }
        };

        if previous.as_deref() == Some(stream_key) {
            return false;
        }

        if let Some(previous) = &previous {
            tracing::info!(from = %previous, to = stream_key, "network interface changed");
            self.reset_network(stream_key);
        }
        if let Err(e) = self.blobs.save(SELECTION_KEY, stream_key.as_bytes()) {
            tracing::warn!(error = %e, "could not save interface selection");
        }
        previous.is_some()
    }

    /// Forget an interface's baseline and clear both of its history streams.
    pub fn reset_network(&self, stream_key: &str) {
        self.rates.forget(stream_key);
        for kind in [MetricKind::NetworkDownload, MetricKind::NetworkUpload] {
            if let Some(id) = kind.stream_id(stream_key) {
                self.history.clear_stream(&id);
            }
        }
    }

    /// Clear the history behind `kind`. Disk keeps no history.
    pub fn clear(&self, kind: MetricKind, stream_key: &str) {
        match kind {
            MetricKind::Disk => {}
            MetricKind::Memory => self.history.clear_stream(MEMORY_STREAM),
            MetricKind::NetworkDownload | MetricKind::NetworkUpload => self.reset_network(stream_key),
        }
    }

    pub fn interfaces(&self) -> Vec<NetworkInterface> {
        self.probe.network_interfaces().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "interface enumeration failed");
            Vec::new()
        })
    }

    fn record(&self, kind: MetricKind, stream_key: &str, value: f64, now: DateTime<Utc>) {
        if let Some(id) = kind.stream_id(stream_key) {
            self.history.record_sample(&id, value, now);
        }
    }

    fn window_of(&self, kind: MetricKind, stream_key: &str, now: DateTime<Utc>) -> Vec<Sample> {
        kind.stream_id(stream_key)
            .map(|id| self.history.get_history(&id, self.settings.window, now))
            .unwrap_or_default()
    }

    fn memory_snapshot(&self, now: DateTime<Utc>) -> MetricSnapshot {
        let memory = memory::read_memory_snapshot(self.probe.as_ref(), now);
        if memory.is_known() {
            self.record(MetricKind::Memory, MEMORY_STREAM, memory.used_percentage, now);
        }

        let mut snapshot = MetricSnapshot::new(
            MetricKind::Memory,
            MEMORY_STREAM,
            Sample::new(now, memory.used_percentage),
        )
        .with("total", format::format_bytes(memory.total))
        .with("used", format::format_bytes(memory.used))
        .with("free", format::format_bytes(memory.free))
        .with("percent", format::format_percent(memory.used_percentage));
        snapshot.history = self.window_of(MetricKind::Memory, MEMORY_STREAM, now);
        snapshot
    }

    fn network_snapshot(&self, kind: MetricKind, stream_key: &str, rate: f64, now: DateTime<Utc>) -> MetricSnapshot {
        let mut snapshot = MetricSnapshot::new(kind, stream_key, Sample::new(now, rate))
            .with("rate", format::format_bandwidth(rate));
        snapshot.history = self.window_of(kind, stream_key, now);
        snapshot
    }

    fn disk_snapshot(&self, now: DateTime<Utc>) -> MetricSnapshot {
        let path = &self.settings.disk_path;
        let volume = self.probe.volume_capacity(path).unwrap_or_else(|e| {
            tracing::debug!(path = %path.display(), error = %e, "volume capacity unavailable");
            Default::default()
        });

        MetricSnapshot::new(
            MetricKind::Disk,
            &path.display().to_string(),
            Sample::new(now, volume.used_percentage()),
        )
        .with("total", format::format_bytes(volume.total_bytes))
        .with("used", format::format_bytes(volume.used_bytes()))
        .with("available", format::format_bytes(volume.available_bytes))
        .with("percent", format::format_percent(volume.used_percentage()))
    }
}
