use std::collections::VecDeque;

use super::{validate_seat, EventSource};
use crate::error::TrackerError;
use crate::event::{InputEvent, KeyState};

/// In-memory event source.
///
/// Events are returned in the order they were pushed, one per poll. Used by
/// the test suite and by applications that want to replay recorded input
/// through the same tracker they use live.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    queue: VecDeque<InputEvent>,
    dispatches: usize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source bound to `seat`, failing the same way a real backend
    /// does when the seat identifier is unusable.
    pub fn for_seat(seat: &str) -> Result<Self, TrackerError> {
        validate_seat(seat)?;
        Ok(Self::new())
    }

    pub fn with_events(events: impl IntoIterator<Item = InputEvent>) -> Self {
        Self {
            queue: events.into_iter().collect(),
            dispatches: 0,
        }
    }

    pub fn push(&mut self, event: InputEvent) {
        self.queue.push_back(event);
    }

    pub fn push_key(&mut self, code: u32, pressed: bool) {
        self.push(InputEvent::Key {
            code,
            state: KeyState::from(pressed),
        });
    }

    pub fn push_button(&mut self, button: u32, pressed: bool) {
        self.push(InputEvent::PointerButton {
            button,
            state: KeyState::from(pressed),
        });
    }

    pub fn push_motion(&mut self, dx: f64, dy: f64) {
        self.push(InputEvent::PointerMotion { dx, dy });
    }

    /// Events still waiting to be polled.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// How many times the tracker asked this source to refresh.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches
    }
}

impl EventSource for ScriptedSource {
    fn poll_event(&mut self) -> Option<InputEvent> {
        self.queue.pop_front()
    }

    fn dispatch(&mut self) -> Result<(), TrackerError> {
        self.dispatches += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
