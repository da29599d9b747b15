//! Bounded rolling history per metric stream, persisted write-through

pub mod persist;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use self::persist::BlobStore;

/// A single timestamped reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Seconds since the Unix epoch with microsecond resolution.
    pub fn epoch_seconds(&self) -> f64 {
        self.timestamp.timestamp_micros() as f64 / 1_000_000.0
    }

    pub fn from_epoch_seconds(secs: f64, value: f64) -> Option<Self> {
        if !secs.is_finite() {
            return None;
        }
        let micros = (secs * 1_000_000.0).round();
        if micros.abs() >= i64::MAX as f64 {
            return None;
        }
        DateTime::from_timestamp_micros(micros as i64).map(|ts| Self::new(ts, value))
    }
}

/// Sizing and spacing rules shared by every stream.
#[derive(Debug, Clone, Copy)]
pub struct HistorySettings {
    pub capacity: usize,
    pub min_interval: Duration,
    /// Persisted samples older than this are dropped when a stream is loaded.
    pub retention: Duration,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: 90,
            min_interval: Duration::seconds(10),
            retention: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Default)]
struct StreamState {
    loaded: bool,
    buffer: VecDeque<Sample>,
}

/// Process-wide owner of every stream's history buffer.
///
/// The outer map lock is only held to find or create a stream; all
/// read-modify-write of a buffer (persisting included) happens under that
/// stream's own mutex, so unrelated streams never wait on each other.
pub struct HistoryStore {
    blobs: Arc<dyn BlobStore>,
    settings: HistorySettings,
    streams: RwLock<HashMap<String, Arc<Mutex<StreamState>>>>,
}

impl HistoryStore {
    pub fn new(blobs: Arc<dyn BlobStore>, settings: HistorySettings) -> Self {
        Self {
            blobs,
            settings: HistorySettings {
                capacity: settings.capacity.max(1),
                ..settings
            },
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Load the given streams now instead of on first use.
    pub fn preload<'a>(&self, stream_ids: impl IntoIterator<Item = &'a str>, now: DateTime<Utc>) {
        for id in stream_ids {
            let stream = self.stream(id);
            let mut state = stream.lock();
            self.ensure_loaded(id, &mut state, now);
        }
    }

    /// Append a sample unless it lands within `min_interval` of the last
    /// accepted one. Returns whether the sample was kept.
    pub fn record_sample(&self, stream_id: &str, value: f64, now: DateTime<Utc>) -> bool {
        if !value.is_finite() {
            tracing::debug!(stream = stream_id, value, "ignoring non-finite sample");
            return false;
        }

        let stream = self.stream(stream_id);
        let mut state = stream.lock();
        self.ensure_loaded(stream_id, &mut state, now);

        if let Some(last) = state.buffer.back() {
            if now.signed_duration_since(last.timestamp) < self.settings.min_interval {
                tracing::trace!(stream = stream_id, "sample within minimum interval, skipped");
                return false;
            }
        }

        state.buffer.push_back(Sample::new(now, value));
        while state.buffer.len() > self.settings.capacity {
            state.buffer.pop_front();
        }

        self.persist(stream_id, &state.buffer);
        true
    }

    /// Samples newer than `now - window`, oldest first.
    pub fn get_history(&self, stream_id: &str, window: Duration, now: DateTime<Utc>) -> Vec<Sample> {
        let stream = self.stream(stream_id);
        let mut state = stream.lock();
        self.ensure_loaded(stream_id, &mut state, now);

        let cutoff = now - window;
        state
            .buffer
            .iter()
            .filter(|s| s.timestamp > cutoff)
            .copied()
            .collect()
    }

    /// Drop everything recorded for a stream and persist the empty buffer.
    pub fn clear_stream(&self, stream_id: &str) {
        let stream = self.stream(stream_id);
        let mut state = stream.lock();
        state.buffer.clear();
        state.loaded = true;
        self.persist(stream_id, &state.buffer);
        tracing::info!(stream = stream_id, "history cleared");
    }

    fn stream(&self, stream_id: &str) -> Arc<Mutex<StreamState>> {
        if let Some(stream) = self.streams.read().get(stream_id) {
            return Arc::clone(stream);
        }
        let mut streams = self.streams.write();
        Arc::clone(streams.entry(stream_id.to_string()).or_default())
    }

    fn ensure_loaded(&self, stream_id: &str, state: &mut StreamState, now: DateTime<Utc>) {
        if state.loaded {
            return;
        }
        state.loaded = true;

        let samples = match self.blobs.load(stream_id) {
            Ok(Some(bytes)) => match persist::decode(&bytes) {
                Ok(samples) => samples,
                Err(e) => {
                    tracing::warn!(stream = stream_id, error = %e, "discarding unreadable history");
                    return;
                }
            },
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(stream = stream_id, error = %e, "history load failed");
                return;
            }
        };

        let loaded = samples.len();
        state.buffer = self.restore(samples, now);
        tracing::debug!(
            stream = stream_id,
            loaded,
            kept = state.buffer.len(),
            "history restored"
        );
    }

    /// Re-establish the buffer invariants over persisted data: chronological,
    /// finite, fresh, spaced and bounded.
    fn restore(&self, mut samples: Vec<Sample>, now: DateTime<Utc>) -> VecDeque<Sample> {
        let oldest = now - self.settings.retention;
        samples.retain(|s| s.value.is_finite() && s.timestamp > oldest && s.timestamp <= now);
        samples.sort_by_key(|s| s.timestamp);

        let mut buffer: VecDeque<Sample> = VecDeque::with_capacity(samples.len());
        for sample in samples {
            if let Some(last) = buffer.back() {
                if sample.timestamp.signed_duration_since(last.timestamp) < self.settings.min_interval {
                    continue;
                }
            }
            buffer.push_back(sample);
        }

        while buffer.len() > self.settings.capacity {
            buffer.pop_front();
        }
        buffer
    }

    fn persist(&self, stream_id: &str, buffer: &VecDeque<Sample>) {
        let result = persist::encode(buffer).and_then(|bytes| self.blobs.save(stream_id, &bytes));
        if let Err(e) = result {
            tracing::warn!(stream = stream_id, error = %e, "failed to persist history");
        }
    }
}
