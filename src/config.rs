//! Tracker configuration.
//!
//! Settings come from an optional JSON file, then from `COLANDER_*`
//! environment variables, which win. Every field has a default, so an empty
//! file (or none at all) gives the stock tracker on `seat0`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_SEAT: &str = "COLANDER_SEAT";
pub const ENV_TRACK_POINTER: &str = "COLANDER_TRACK_POINTER";
pub const ENV_MOTION_POLICY: &str = "COLANDER_MOTION_POLICY";

/// What happens to the pointer delta on a frame without motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionPolicy {
    /// Zero the delta at the start of every frame.
    #[default]
    ResetEachFrame,
    /// Keep reporting the last motion until new motion arrives.
    KeepLast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seat the source binds to.
    pub seat: String,

    /// Follow pointer motion and buttons. When off, pointer events are
    /// consumed but never change state.
    pub track_pointer: bool,

    pub motion_policy: MotionPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            seat: "seat0".to_string(),
            track_pointer: true,
            motion_policy: MotionPolicy::default(),
        }
    }
}

impl TrackerConfig {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config =
                    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?;
                log::debug!("Config: loaded {:?}", path);
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Config: {:?} not found, using defaults", path);
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Apply `COLANDER_SEAT`, `COLANDER_TRACK_POINTER` and
    /// `COLANDER_MOTION_POLICY` from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable lookup.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(seat) = lookup(ENV_SEAT) {
            self.seat = seat;
        }

        if let Some(value) = lookup(ENV_TRACK_POINTER) {
            self.track_pointer = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: ENV_TRACK_POINTER,
                        value,
                    })
                }
            };
        }

        if let Some(value) = lookup(ENV_MOTION_POLICY) {
            self.motion_policy = match value.trim().to_ascii_lowercase().as_str() {
                "reset" | "reset_each_frame" => MotionPolicy::ResetEachFrame,
                "keep" | "keep_last" => MotionPolicy::KeepLast,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: ENV_MOTION_POLICY,
                        value,
                    })
                }
            };
        }

        Ok(self)
    }
}
