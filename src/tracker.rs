//! Double-buffered input state.
//!
//! The tracker keeps two snapshots of every key and button: the state now,
//! and the state one [`advance_frame`](InputStateTracker::advance_frame) ago.
//! Levels are read from the current snapshot; edges are the slots where the
//! two snapshots differ.

use crate::config::{MotionPolicy, TrackerConfig};
use crate::error::TrackerError;
use crate::event::{InputEvent, MouseButton, KEY_SLOTS};
use crate::source::{DefaultSource, EventSource};

/// Levels of every tracked key and button at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSnapshot {
    keys: [bool; KEY_SLOTS],
    buttons: [bool; 3],
}

impl Default for InputSnapshot {
    fn default() -> Self {
        Self {
            keys: [false; KEY_SLOTS],
            buttons: [false; 3],
        }
    }
}

impl InputSnapshot {
    pub fn key(&self, code: u32) -> Result<bool, TrackerError> {
        Ok(self.keys[key_slot(code)?])
    }

    pub fn button(&self, button: MouseButton) -> bool {
        self.buttons[button.index()]
    }
}

fn key_slot(code: u32) -> Result<usize, TrackerError> {
    usize::try_from(code)
        .ok()
        .filter(|&slot| slot < KEY_SLOTS)
        .ok_or(TrackerError::KeyCodeOutOfRange(code))
}

/// A level change observed in the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    KeyPressed(u32),
    KeyReleased(u32),
    ButtonPressed(MouseButton),
    ButtonReleased(MouseButton),
}

/// Polling keyboard/mouse state tracker.
///
/// Call [`advance_frame`](Self::advance_frame) once per loop iteration (or
/// repeatedly to drain a burst), then query levels and edges. Not meant to
/// be shared between threads.
pub struct InputStateTracker<S: EventSource> {
    current: InputSnapshot,
    previous: InputSnapshot,
    pointer_dx: i32,
    pointer_dy: i32,
    config: TrackerConfig,
    /// `None` once the tracker has been shut down.
    source: Option<S>,
}

impl InputStateTracker<DefaultSource> {
    /// Open the default backend on the configured seat.
    pub fn open_default(config: TrackerConfig) -> Result<Self, TrackerError> {
        #[cfg(feature = "libinput")]
        let source = DefaultSource::open(&config.seat, crate::source::RestrictedOpener)?;
        #[cfg(not(feature = "libinput"))]
        let source = DefaultSource::open(&config.seat)?;

        Ok(Self::new(source, config))
    }
}

impl<S: EventSource> InputStateTracker<S> {
    /// Start tracking with all keys and buttons up and no motion.
    pub fn new(source: S, config: TrackerConfig) -> Self {
        log::info!(
            "Tracker: {} source on {} (pointer: {}, motion: {:?})",
            source.name(),
            config.seat,
            config.track_pointer,
            config.motion_policy
        );

        Self {
            current: InputSnapshot::default(),
            previous: InputSnapshot::default(),
            pointer_dx: 0,
            pointer_dy: 0,
            config,
            source: Some(source),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> Option<&mut S> {
        self.source.as_mut()
    }

    pub fn is_shut_down(&self) -> bool {
        self.source.is_none()
    }

    /// Move to the next frame, consuming at most one event.
    ///
    /// The previous snapshot is refreshed even when nothing is pending, so
    /// edges last exactly one frame. Returns whether an event was consumed;
    /// `Ok(false)` means the source had nothing queued.
    ///
    /// The source is refreshed last. If that fails the error is returned,
    /// but the frame has already advanced and any consumed event is applied,
    /// so its edges can still be queried.
    pub fn advance_frame(&mut self) -> Result<bool, TrackerError> {
        if self.source.is_none() {
            return Err(TrackerError::UseAfterShutdown);
        }

        self.previous = self.current;
        if self.config.motion_policy == MotionPolicy::ResetEachFrame {
            self.pointer_dx = 0;
            self.pointer_dy = 0;
        }

        let event = self.source.as_mut().and_then(|source| source.poll_event());
        let consumed = event.is_some();
        if let Some(event) = event {
            self.apply(event);
        }

        if let Some(source) = self.source.as_mut() {
            source.dispatch()?;
        }
        Ok(consumed)
    }

    fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::Key { code, state } => match key_slot(code) {
                Ok(slot) => self.current.keys[slot] = state.is_pressed(),
                Err(_) => log::debug!("Tracker: ignoring key {} outside tracked range", code),
            },
            InputEvent::PointerMotion { dx, dy } if self.config.track_pointer => {
                // Truncated toward zero; sub-unit motion reads as no motion.
                self.pointer_dx = dx as i32;
                self.pointer_dy = dy as i32;
            }
            InputEvent::PointerButton { button, state } if self.config.track_pointer => {
                if let Some(button) = MouseButton::from_code(button) {
                    self.current.buttons[button.index()] = state.is_pressed();
                }
            }
            _ => {}
        }
    }

    fn ensure_live(&self) -> Result<(), TrackerError> {
        if self.source.is_none() {
            return Err(TrackerError::UseAfterShutdown);
        }
        Ok(())
    }

    /// Whether key `code` is currently held.
    pub fn is_down(&self, code: u32) -> Result<bool, TrackerError> {
        self.ensure_live()?;
        self.current.key(code)
    }

    /// Whether key `code` went down during the last frame.
    pub fn was_pressed(&self, code: u32) -> Result<bool, TrackerError> {
        self.ensure_live()?;
        let now = self.current.key(code)?;
        Ok(now != self.previous.key(code)? && now)
    }

    /// Whether key `code` went up during the last frame.
    pub fn was_released(&self, code: u32) -> Result<bool, TrackerError> {
        self.ensure_live()?;
        let now = self.current.key(code)?;
        Ok(now != self.previous.key(code)? && !now)
    }

    pub fn pointer_delta_x(&self) -> Result<i32, TrackerError> {
        self.ensure_live()?;
        Ok(self.pointer_dx)
    }

    pub fn pointer_delta_y(&self) -> Result<i32, TrackerError> {
        self.ensure_live()?;
        Ok(self.pointer_dy)
    }

    pub fn pointer_delta(&self) -> Result<(i32, i32), TrackerError> {
        self.ensure_live()?;
        Ok((self.pointer_dx, self.pointer_dy))
    }

    pub fn button_down(&self, button: MouseButton) -> Result<bool, TrackerError> {
        self.ensure_live()?;
        Ok(self.current.button(button))
    }

    pub fn button_pressed(&self, button: MouseButton) -> Result<bool, TrackerError> {
        self.ensure_live()?;
        let now = self.current.button(button);
        Ok(now != self.previous.button(button) && now)
    }

    pub fn button_released(&self, button: MouseButton) -> Result<bool, TrackerError> {
        self.ensure_live()?;
        let now = self.current.button(button);
        Ok(now != self.previous.button(button) && !now)
    }

    /// Every edge of the last frame: keys in ascending code order, then
    /// buttons (left, middle, right).
    pub fn transitions(&self) -> Result<Vec<Transition>, TrackerError> {
        self.ensure_live()?;

        let keys = self
            .current
            .keys
            .iter()
            .zip(self.previous.keys.iter())
            .enumerate()
            .filter(|(_, (now, before))| now != before)
            .map(|(code, (&now, _))| {
                // code < KEY_SLOTS, so it always fits.
                let code = code as u32;
                if now {
                    Transition::KeyPressed(code)
                } else {
                    Transition::KeyReleased(code)
                }
            });

        let buttons = MouseButton::ALL.into_iter().filter_map(|button| {
            let now = self.current.button(button);
            if now == self.previous.button(button) {
                None
            } else if now {
                Some(Transition::ButtonPressed(button))
            } else {
                Some(Transition::ButtonReleased(button))
            }
        });

        Ok(keys.chain(buttons).collect())
    }

    /// Release the event source. Every later call fails with
    /// [`TrackerError::UseAfterShutdown`].
    pub fn shutdown(&mut self) -> Result<(), TrackerError> {
        let source = self.source.take().ok_or(TrackerError::UseAfterShutdown)?;
        log::info!("Tracker: releasing {} source", source.name());
        drop(source);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyState;
    use crate::source::ScriptedSource;

    const KEY_A: u32 = 30;

    fn tracker() -> InputStateTracker<ScriptedSource> {
        InputStateTracker::new(ScriptedSource::new(), TrackerConfig::default())
    }

    #[test]
    fn test_new_tracker_is_all_up() {
        let t = tracker();
        for code in 0..KEY_SLOTS as u32 {
            assert!(!t.is_down(code).unwrap());
            assert!(!t.was_pressed(code).unwrap());
            assert!(!t.was_released(code).unwrap());
        }
        for button in MouseButton::ALL {
            assert!(!t.button_down(button).unwrap());
        }
        assert_eq!(t.pointer_delta().unwrap(), (0, 0));
    }

    #[test]
    fn test_key_slot_bounds() {
        assert_eq!(key_slot(0).unwrap(), 0);
        assert_eq!(key_slot(254).unwrap(), 254);
        assert!(matches!(
            key_slot(255),
            Err(TrackerError::KeyCodeOutOfRange(255))
        ));
        assert!(matches!(
            key_slot(u32::MAX),
            Err(TrackerError::KeyCodeOutOfRange(u32::MAX))
        ));
    }

    #[test]
    fn test_out_of_range_key_event_is_dropped() {
        let mut t = tracker();
        let before = t.current;
        t.source_mut().unwrap().push(InputEvent::Key {
            code: 300,
            state: KeyState::Pressed,
        });

        assert!(t.advance_frame().unwrap());
        assert_eq!(t.current, before);
    }

    #[test]
    fn test_advance_dispatches_every_frame() {
        let mut t = tracker();
        t.advance_frame().unwrap();
        t.source_mut().unwrap().push_key(KEY_A, true);
        t.advance_frame().unwrap();
        assert_eq!(t.source().unwrap().dispatch_count(), 2);
    }

    #[test]
    fn test_other_events_count_as_consumed() {
        let mut t = tracker();
        t.source_mut().unwrap().push(InputEvent::Other);
        assert!(t.advance_frame().unwrap());
        assert!(t.transitions().unwrap().is_empty());
        assert!(!t.advance_frame().unwrap());
    }

    #[test]
    fn test_motion_truncates_toward_zero() {
        let mut t = tracker();
        t.source_mut().unwrap().push_motion(2.9, -3.7);
        t.advance_frame().unwrap();
        assert_eq!(t.pointer_delta().unwrap(), (2, -3));
    }

    #[test]
    fn test_motion_overwrites_instead_of_accumulating() {
        let config = TrackerConfig {
            motion_policy: MotionPolicy::KeepLast,
            ..TrackerConfig::default()
        };
        let mut t = InputStateTracker::new(ScriptedSource::new(), config);
        t.source_mut().unwrap().push_motion(5.0, 5.0);
        t.source_mut().unwrap().push_motion(1.0, -2.0);
        t.advance_frame().unwrap();
        t.advance_frame().unwrap();
        assert_eq!(t.pointer_delta().unwrap(), (1, -2));
    }

    #[test]
    fn test_transitions_lists_keys_then_buttons() {
        let mut t = tracker();
        t.source_mut().unwrap().push_key(KEY_A, true);
        t.advance_frame().unwrap();
        assert_eq!(
            t.transitions().unwrap(),
            vec![Transition::KeyPressed(KEY_A)]
        );

        t.source_mut()
            .unwrap()
            .push_button(MouseButton::Left.code(), true);
        t.advance_frame().unwrap();
        assert_eq!(
            t.transitions().unwrap(),
            vec![Transition::ButtonPressed(MouseButton::Left)]
        );

        t.source_mut().unwrap().push_key(KEY_A, false);
        t.advance_frame().unwrap();
        assert_eq!(
            t.transitions().unwrap(),
            vec![Transition::KeyReleased(KEY_A)]
        );
    }

    /// Hands out its events, then fails every refresh.
    struct BrokenSource(ScriptedSource);

    impl EventSource for BrokenSource {
        fn poll_event(&mut self) -> Option<InputEvent> {
            self.0.poll_event()
        }

        fn dispatch(&mut self) -> Result<(), TrackerError> {
            Err(TrackerError::Dispatch(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "device unplugged",
            )))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn test_failed_dispatch_still_applies_the_event() {
        let mut source = ScriptedSource::new();
        source.push_key(KEY_A, true);
        let mut t = InputStateTracker::new(BrokenSource(source), TrackerConfig::default());

        assert!(matches!(t.advance_frame(), Err(TrackerError::Dispatch(_))));
        assert!(t.is_down(KEY_A).unwrap());
        assert!(t.was_pressed(KEY_A).unwrap());
        assert_eq!(t.transitions().unwrap(), vec![Transition::KeyPressed(KEY_A)]);
    }

    #[test]
    fn test_shutdown_twice_fails() {
        let mut t = tracker();
        t.shutdown().unwrap();
        assert!(t.is_shut_down());
        assert!(t.source().is_none());
        assert!(matches!(t.shutdown(), Err(TrackerError::UseAfterShutdown)));
    }
}
