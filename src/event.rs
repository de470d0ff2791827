//! Normalized input events, as handed to the tracker by an
//! [`EventSource`](crate::EventSource).

use evdev::Key;

/// Number of tracked key slots. Valid key codes are `0..=254`.
pub const KEY_SLOTS: usize = 0xff;

/// Level of a key or button as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Released,
    Pressed,
}

impl KeyState {
    pub fn is_pressed(self) -> bool {
        self == KeyState::Pressed
    }

    /// Convert a raw kernel key value.
    ///
    /// `0` = released, `1` = pressed, `2` = autorepeat. Autorepeat returns
    /// `None` because it never changes the level of a key.
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyState::Released),
            1 => Some(KeyState::Pressed),
            _ => None,
        }
    }
}

impl From<bool> for KeyState {
    fn from(pressed: bool) -> Self {
        if pressed {
            KeyState::Pressed
        } else {
            KeyState::Released
        }
    }
}

/// One event pulled from the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// A keyboard key changed level. `code` is the kernel `KEY_*` code.
    Key { code: u32, state: KeyState },

    /// Relative pointer motion, in device units.
    PointerMotion { dx: f64, dy: f64 },

    /// A pointer button changed level. `button` is the kernel `BTN_*` code.
    PointerButton { button: u32, state: KeyState },

    /// Anything the tracker does not follow (hotplug, touch, scroll...).
    /// Consuming it still counts as consuming an event.
    Other,
}

/// The three pointer buttons the tracker keeps a slot for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub const ALL: [MouseButton; 3] = [MouseButton::Left, MouseButton::Middle, MouseButton::Right];

    /// Map a kernel button code to a tracked button. Any other button
    /// (side, extra, stylus...) maps to `None` and is ignored.
    pub fn from_code(code: u32) -> Option<Self> {
        let key = Key::new(u16::try_from(code).ok()?);
        match key {
            Key::BTN_LEFT => Some(MouseButton::Left),
            Key::BTN_MIDDLE => Some(MouseButton::Middle),
            Key::BTN_RIGHT => Some(MouseButton::Right),
            _ => None,
        }
    }

    /// Kernel `BTN_*` code for this button.
    pub fn code(self) -> u32 {
        let key = match self {
            MouseButton::Left => Key::BTN_LEFT,
            MouseButton::Middle => Key::BTN_MIDDLE,
            MouseButton::Right => Key::BTN_RIGHT,
        };
        u32::from(key.code())
    }

    /// Slot index in the button snapshot.
    pub fn index(self) -> usize {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Middle => "middle",
            MouseButton::Right => "right",
        }
    }
}
