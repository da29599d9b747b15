//! Error types shared by the probe and persistence seams

use thiserror::Error;

/// Failure talking to the operating system.
///
/// Callers inside the metrics subsystem never surface these; they substitute
/// zeroed readings and log at debug level.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0} is not available on this platform")]
    #[cfg_attr(not(test), allow(dead_code))]
    Unsupported(&'static str),

    #[error("kernel call {call} failed with code {code}")]
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    Kernel { call: &'static str, code: i32 },

    #[error("network interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("no volume mounted for {0}")]
    VolumeNotFound(String),

    #[error("malformed {source_name}: {reason}")]
    Parse {
        source_name: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Errno(#[from] nix::errno::Errno),
}

/// Failure loading or saving persisted history.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("history encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("unsupported history format version {0}")]
    UnsupportedVersion(u32),
}
