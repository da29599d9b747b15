//! Byte-rate sampler: cumulative counters to bytes per second

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Download/upload throughput in bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ByteRates {
    pub download: f64,
    pub upload: f64,
}

#[derive(Debug, Clone, Copy)]
struct RateState {
    last_download: u64,
    last_upload: u64,
    last_sample: DateTime<Utc>,
}

/// Per-key rate baselines. Each key has its own lock, so sampling one
/// interface never waits on another.
#[derive(Default)]
pub struct ByteRateSampler {
    states: RwLock<HashMap<String, Arc<Mutex<Option<RateState>>>>>,
}

impl ByteRateSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Difference the counters against the key's previous call.
    ///
    /// Returns `None` when no rate could be measured: the first call for a key
    /// only records a baseline, and a call at or before the previous timestamp
    /// leaves the baseline alone. A counter that went backwards (wrap or
    /// interface reset) reports zero for that direction, and the baseline
    /// moves to the new values regardless.
    pub fn sample_rate(
        &self,
        key: &str,
        download_bytes: u64,
        upload_bytes: u64,
        now: DateTime<Utc>,
    ) -> Option<ByteRates> {
        let slot = self.slot(key);
        let mut state = slot.lock();

        let Some(prev) = *state else {
            *state = Some(RateState {
                last_download: download_bytes,
                last_upload: upload_bytes,
                last_sample: now,
            });
            return None;
        };

        let dt = match now.signed_duration_since(prev.last_sample).num_microseconds() {
            Some(micros) if micros > 0 => micros as f64 / 1_000_000.0,
            _ => {
                tracing::trace!(key, "non-advancing sample time, no rate measured");
                return None;
            }
        };

        let rates = ByteRates {
            download: per_second(prev.last_download, download_bytes, dt),
            upload: per_second(prev.last_upload, upload_bytes, dt),
        };

        *state = Some(RateState {
            last_download: download_bytes,
            last_upload: upload_bytes,
            last_sample: now,
        });
        Some(rates)
    }

    /// Drop a key's baseline so its next sample starts fresh.
    pub fn forget(&self, key: &str) {
        if let Some(slot) = self.states.read().get(key) {
            *slot.lock() = None;
        }
    }

    fn slot(&self, key: &str) -> Arc<Mutex<Option<RateState>>> {
        if let Some(slot) = self.states.read().get(key) {
            return Arc::clone(slot);
        }
        let mut states = self.states.write();
        Arc::clone(states.entry(key.to_string()).or_default())
    }
}

fn per_second(previous: u64, current: u64, seconds: f64) -> f64 {
    if current >= previous {
        (current - previous) as f64 / seconds
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::thread;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
    }

    fn measured(rates: Option<ByteRates>) -> ByteRates {
        rates.expect("rate should have been measured")
    }

    #[test]
    fn test_first_call_is_baseline() {
        let sampler = ByteRateSampler::new();
        assert_eq!(sampler.sample_rate("en0", u64::MAX, 12345, t(0)), None);
    }

    #[test]
    fn test_rate_from_real_counters() {
        let sampler = ByteRateSampler::new();
        sampler.sample_rate("en0", 1_000_000, 0, t(0));
        let rates = measured(sampler.sample_rate("en0", 2_048_000, 0, t(10)));

        assert!((rates.download - 104_800.0).abs() < 1e-9);
        assert_eq!(rates.upload, 0.0);
    }

    #[test]
    fn test_wraparound_resets_baseline() {
        let sampler = ByteRateSampler::new();
        sampler.sample_rate("en0", 1000, 500, t(0));

        let wrapped = sampler.sample_rate("en0", 200, 100, t(1));
        assert_eq!(wrapped, Some(ByteRates::default()));

        let after = measured(sampler.sample_rate("en0", 400, 300, t(3)));
        assert!((after.download - 100.0).abs() < 1e-9);
        assert!((after.upload - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_directions_wrap_independently() {
        let sampler = ByteRateSampler::new();
        sampler.sample_rate("en0", 1000, 1000, t(0));
        let rates = measured(sampler.sample_rate("en0", 500, 3000, t(2)));
        assert_eq!(rates.download, 0.0);
        assert!((rates.upload - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_advancing_clock_keeps_baseline() {
        let sampler = ByteRateSampler::new();
        sampler.sample_rate("en0", 1000, 1000, t(10));

        assert_eq!(sampler.sample_rate("en0", 5000, 5000, t(10)), None);
        assert_eq!(sampler.sample_rate("en0", 9000, 9000, t(5)), None);

        let rates = measured(sampler.sample_rate("en0", 3000, 2000, t(20)));
        assert!((rates.download - 200.0).abs() < 1e-9);
        assert!((rates.upload - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_keys_do_not_share_state() {
        let sampler = ByteRateSampler::new();
        sampler.sample_rate("en0", 1000, 1000, t(0));
        assert_eq!(sampler.sample_rate("en1", 5000, 5000, t(1)), None);

        let en0 = measured(sampler.sample_rate("en0", 2000, 1000, t(10)));
        assert!((en0.download - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_forget_starts_a_new_baseline() {
        let sampler = ByteRateSampler::new();
        sampler.sample_rate("en0", 1000, 1000, t(0));
        sampler.forget("en0");
        assert_eq!(sampler.sample_rate("en0", 9000, 9000, t(10)), None);
        sampler.forget("never-seen");
    }

    #[test]
    fn test_rates_are_never_negative() {
        let sampler = ByteRateSampler::new();
        let counters = [5u64, 10, 3, 3, 1_000, 0, u64::MAX, 7, 7, 8];
        for (i, &c) in counters.iter().enumerate() {
            if let Some(rates) = sampler.sample_rate("all", c, c / 2, t(i as i64 * 3)) {
                assert!(rates.download >= 0.0 && rates.upload >= 0.0);
            }
        }
    }

    #[test]
    fn test_concurrent_samples_on_one_key_are_serialized() {
        let sampler = Arc::new(ByteRateSampler::new());
        let threads = 8_i64;
        let per_thread = 50_i64;

        // Counters grow with time, so the newest baseline also holds the
        // largest counters.
        let handles: Vec<_> = (0..threads)
            .map(|worker| {
                let sampler = Arc::clone(&sampler);
                thread::spawn(move || {
                    let mut rates = Vec::new();
                    for step in 0..per_thread {
                        let secs = step * threads + worker + 1;
                        let bytes = secs as u64 * 1000;
                        rates.extend(sampler.sample_rate("k", bytes, bytes / 2, t(secs)));
                    }
                    rates
                })
            })
            .collect();

        for handle in handles {
            for rates in handle.join().unwrap() {
                assert!(rates.download >= 0.0, "negative download {rates:?}");
                assert!(rates.upload >= 0.0, "negative upload {rates:?}");
            }
        }

        let last = threads * per_thread;
        let next = measured(sampler.sample_rate(
            "k",
            (last + 10) as u64 * 1000,
            (last + 10) as u64 * 500,
            t(last + 10),
        ));
        assert!((next.download - 1000.0).abs() < 1e-9, "baseline was {next:?}");
        assert!((next.upload - 500.0).abs() < 1e-9);
    }
}
