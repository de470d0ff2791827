//! Event sources: where the tracker pulls its events from.
//!
//! A source owns the OS side of input handling (device handles, seat
//! assignment, kernel event decoding). The tracker only ever asks it for one
//! event at a time and tells it when to refresh its queue.
//!
//! Backends:
//! - [`EvdevSource`]: reads `/dev/input/event*` directly through `evdev`
//! - [`LibinputSource`]: libinput on a udev seat (feature `libinput`)
//! - [`ScriptedSource`]: an in-memory queue for tests and replays

use std::os::fd::BorrowedFd;

use crate::error::TrackerError;
use crate::event::InputEvent;

mod evdev;
#[cfg(feature = "libinput")]
mod libinput;
mod scripted;

pub use self::evdev::EvdevSource;
#[cfg(feature = "libinput")]
pub use self::libinput::{LibinputSource, RestrictedOpener};
pub use self::scripted::ScriptedSource;

/// Backend used by [`InputStateTracker::open_default`](crate::InputStateTracker::open_default).
#[cfg(feature = "libinput")]
pub type DefaultSource = LibinputSource;

/// Backend used by [`InputStateTracker::open_default`](crate::InputStateTracker::open_default).
#[cfg(not(feature = "libinput"))]
pub type DefaultSource = EvdevSource;

/// An external producer of input events.
///
/// Creating a source is each backend's own constructor and releasing it is
/// `Drop`, so a source that exists is always usable.
pub trait EventSource {
    /// Pull at most one pending event without blocking.
    ///
    /// The backend's native event object is released before this returns.
    fn poll_event(&mut self) -> Option<InputEvent>;

    /// Refresh the internal queue so the next [`poll_event`](Self::poll_event)
    /// can see newly arrived events.
    fn dispatch(&mut self) -> Result<(), TrackerError>;

    /// Descriptors that become readable when new input arrives. Host loops
    /// can sleep on these in `poll(2)` between frames.
    fn readiness_fds(&self) -> Vec<BorrowedFd<'_>> {
        Vec::new()
    }

    /// Short backend name, used in logs.
    fn name(&self) -> &'static str;
}

/// Reject seat identifiers no backend can bind to.
pub(crate) fn validate_seat(seat: &str) -> Result<(), TrackerError> {
    if seat.trim().is_empty() {
        return Err(TrackerError::InitializationFailed {
            seat: seat.to_string(),
            reason: "seat identifier is empty".to_string(),
        });
    }
    Ok(())
}
