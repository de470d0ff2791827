//! Polling input-state tracker for Linux.
//!
//! [`InputStateTracker`] pulls one event per frame from an [`EventSource`]
//! and keeps the state of every key (codes `0..=254`) and of the left,
//! middle and right mouse buttons. Levels ("is it down?") come from the
//! current frame; edges ("did it just go down?") come from comparing the
//! current frame with the previous one.
//!
//! ```no_run
//! use colander::{InputStateTracker, TrackerConfig};
//!
//! # fn main() -> Result<(), colander::TrackerError> {
//! let mut tracker = InputStateTracker::open_default(TrackerConfig::default())?;
//! loop {
//!     tracker.advance_frame()?;
//!     if tracker.was_pressed(1)? {
//!         break; // KEY_ESC
//!     }
//! }
//! tracker.shutdown()
//! # }
//! ```
//!
//! # Requirements
//! - User must be in the `input` group: `sudo usermod -aG input $USER`
//! - Log out and back in after adding to group

pub mod config;
pub mod error;
pub mod event;
pub mod source;
pub mod tracker;

pub use config::{MotionPolicy, TrackerConfig};
pub use error::{ConfigError, TrackerError};
pub use event::{InputEvent, KeyState, MouseButton, KEY_SLOTS};
pub use source::{DefaultSource, EvdevSource, EventSource, ScriptedSource};
#[cfg(feature = "libinput")]
pub use source::{LibinputSource, RestrictedOpener};
pub use tracker::{InputSnapshot, InputStateTracker, Transition};
