//! Error types for the tracker and its configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`InputStateTracker`](crate::InputStateTracker) and the
/// event-source backends.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The event source could not be created for the requested seat.
    ///
    /// Usually a permissions problem: the user must be in the `input` group
    /// (`sudo usermod -aG input $USER`, then log out and back in).
    #[error("failed to initialize input source for seat {seat:?}: {reason}")]
    InitializationFailed { seat: String, reason: String },

    /// A key query used a code outside `0..=254`.
    #[error("key code {0} is outside the tracked range 0..=254")]
    KeyCodeOutOfRange(u32),

    /// The tracker was used after [`shutdown`](crate::InputStateTracker::shutdown).
    #[error("input tracker has already been shut down")]
    UseAfterShutdown,

    /// The backend failed to refresh its event queue.
    #[error("failed to dispatch input events: {0}")]
    Dispatch(#[from] std::io::Error),
}

/// Errors produced while loading a [`TrackerConfig`](crate::TrackerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}
