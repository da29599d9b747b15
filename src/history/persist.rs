//! Durable encoding of history buffers and the blob stores that hold them

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Sample;
use crate::error::StoreError;

/// Version written by [`encode`]. Bare arrays without a version are read as 0.
pub const FORMAT_VERSION: u32 = 1;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generic durable key/value blob store shared with other processes.
///
/// `save` replaces the whole value for a key; readers must never observe a
/// partially written value.
pub trait BlobStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Point {
    t: f64,
    v: f64,
}

#[derive(Debug, Serialize)]
struct Encoded<'a> {
    version: u32,
    samples: &'a [Point],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Decoded {
    Versioned { version: u32, samples: Vec<Point> },
    Legacy(Vec<LegacyPoint>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LegacyPoint {
    Pair(f64, f64),
    Object {
        #[serde(rename = "epochSeconds", alias = "timestamp")]
        epoch_seconds: f64,
        value: f64,
    },
}

/// Encode samples in chronological order as the current versioned form.
pub fn encode<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Result<Vec<u8>, StoreError> {
    let points: Vec<Point> = samples
        .into_iter()
        .map(|s| Point {
            t: s.epoch_seconds(),
            v: s.value,
        })
        .collect();

    let bytes = serde_json::to_vec(&Encoded {
        version: FORMAT_VERSION,
        samples: &points,
    })?;
    Ok(bytes)
}

/// Decode either the versioned form or the legacy bare array.
///
/// Points whose timestamp cannot be represented are skipped; ordering and
/// spacing are left to the caller.
pub fn decode(bytes: &[u8]) -> Result<Vec<Sample>, StoreError> {
    let raw: Vec<(f64, f64)> = match serde_json::from_slice::<Decoded>(bytes)? {
        Decoded::Versioned { version, samples } => {
            if version > FORMAT_VERSION {
                return Err(StoreError::UnsupportedVersion(version));
            }
            samples.into_iter().map(|p| (p.t, p.v)).collect()
        }
        Decoded::Legacy(points) => points
            .into_iter()
            .map(|p| match p {
                LegacyPoint::Pair(t, v) => (t, v),
                LegacyPoint::Object {
                    epoch_seconds,
                    value,
                } => (epoch_seconds, value),
            })
            .collect(),
    };

    Ok(raw
        .into_iter()
        .filter_map(|(t, v)| Sample::from_epoch_seconds(t, v))
        .collect())
}

/// One JSON file per key inside a directory.
///
/// Writes go to a temp file unique to the call that is renamed over the
/// target, so a concurrent reader sees the old or the new buffer whole.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|p| p.join("sysgauge").join("history"))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Reversible file name for a key: bytes outside `[A-Za-z0-9._-]` become
/// `%XX`, so distinct keys never share a file.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(key);
        let tmp_path = self
            .dir
            .join(format!(
                ".{}.{}.{}.tmp",
                file_stem(key),
                std::process::id(),
                TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
            ));

        fs::write(&tmp_path, bytes)?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

/// In-process store used to stand in for the shared file store in tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: parking_lot::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

#[cfg(test)]
impl MemoryBlobStore {
    pub fn insert(&self, key: &str, bytes: &[u8]) {
        self.blobs.lock().insert(key.to_string(), bytes.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(key).cloned()
    }
}

#[cfg(test)]
impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.insert(key, bytes);
        Ok(())
    }
}
