// =============================================================================
// evdev Backend
// =============================================================================
//
// Reads keyboards and mice straight from the kernel's event devices
// (/dev/input/event*). This works on any compositor, or none at all, as long
// as the user is in the 'input' group:
//   sudo usermod -a -G input $USER
//   (then log out and back in)
//
// The kernel reports one property per event and groups them with SYN_REPORT.
// Motion is therefore split into REL_X and REL_Y events; we add them up until
// the report ends and hand the tracker a single PointerMotion.
//
// =============================================================================

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};

use ::evdev::{Device, InputEventKind, Key, RelativeAxisType, Synchronization};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;

use super::{validate_seat, EventSource};
use crate::error::TrackerError;
use crate::event::{InputEvent, KeyState};

/// Where the kernel exposes event devices.
const INPUT_DIR: &str = "/dev/input";

#[derive(Debug, Clone, Copy, PartialEq)]
enum DeviceType {
    Mouse,
    Keyboard,
}

/// An opened input device along with its type.
struct OpenDevice {
    device: Device,
    device_type: DeviceType,
    path: PathBuf,
}

/// Event source backed by raw evdev devices.
///
/// evdev has no notion of seats, so every readable keyboard and mouse is
/// treated as part of the requested seat.
pub struct EvdevSource {
    devices: Vec<OpenDevice>,
    queue: VecDeque<InputEvent>,
    // Motion accumulated since the last SYN_REPORT.
    pending_dx: i32,
    pending_dy: i32,
}

impl EvdevSource {
    /// Open every keyboard and mouse under `/dev/input`.
    pub fn open(seat: &str) -> Result<Self, TrackerError> {
        Self::open_dir(seat, Path::new(INPUT_DIR))
    }

    /// Open every keyboard and mouse under `dir`.
    pub fn open_dir(seat: &str, dir: &Path) -> Result<Self, TrackerError> {
        validate_seat(seat)?;

        let devices = discover_devices(dir).map_err(|reason| TrackerError::InitializationFailed {
            seat: seat.to_string(),
            reason,
        })?;

        if devices.is_empty() {
            return Err(TrackerError::InitializationFailed {
                seat: seat.to_string(),
                reason: format!(
                    "no readable keyboard or mouse under {:?} (is the user in the 'input' group?)",
                    dir
                ),
            });
        }

        let mice = devices
            .iter()
            .filter(|d| d.device_type == DeviceType::Mouse)
            .count();
        log::info!(
            "evdev: opened {} keyboard(s) and {} mouse/mice for {}",
            devices.len() - mice,
            mice,
            seat
        );

        Ok(Self {
            devices,
            queue: VecDeque::new(),
            pending_dx: 0,
            pending_dy: 0,
        })
    }

    /// Number of devices currently being read.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn push_key(&mut self, key: Key, value: i32) {
        // Repeats (value 2) never change a level.
        let Some(state) = KeyState::from_raw(value) else {
            return;
        };

        if is_mouse_button(key) {
            self.queue.push_back(InputEvent::PointerButton {
                button: u32::from(key.code()),
                state,
            });
        } else {
            self.queue.push_back(InputEvent::Key {
                code: u32::from(key.code()),
                state,
            });
        }
    }

    /// Events already read from the kernel but not yet polled.
    fn has_backlog(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Turn one batch of kernel events into tracker events.
    fn translate<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = ::evdev::InputEvent>,
    {
        for event in events {
            match event.kind() {
                InputEventKind::Key(key) => self.push_key(key, event.value()),
                InputEventKind::RelAxis(RelativeAxisType::REL_X) => {
                    self.pending_dx += event.value()
                }
                InputEventKind::RelAxis(RelativeAxisType::REL_Y) => {
                    self.pending_dy += event.value()
                }
                InputEventKind::Synchronization(Synchronization::SYN_REPORT) => {
                    self.flush_motion()
                }
                _ => {}
            }
        }
        // A batch can end mid-report.
        self.flush_motion();
    }

    fn flush_motion(&mut self) {
        if self.pending_dx != 0 || self.pending_dy != 0 {
            self.queue.push_back(InputEvent::PointerMotion {
                dx: f64::from(self.pending_dx),
                dy: f64::from(self.pending_dy),
            });
            self.pending_dx = 0;
            self.pending_dy = 0;
        }
    }
}

impl EventSource for EvdevSource {
    fn poll_event(&mut self) -> Option<InputEvent> {
        self.queue.pop_front()
    }

    fn dispatch(&mut self) -> Result<(), TrackerError> {
        // Leave events in the kernel until the tracker has caught up. The
        // kernel buffer is bounded and resyncs on overflow; ours is not.
        if self.has_backlog() {
            return Ok(());
        }

        let mut index = 0;
        while index < self.devices.len() {
            // fetch_events() borrows the device, so collect before translating.
            let fetched: Result<Vec<_>, _> = self.devices[index]
                .device
                .fetch_events()
                .map(|events| events.collect());

            match fetched {
                Ok(events) => {
                    self.translate(events);
                    index += 1;
                }
                // EAGAIN means "no events available" - this is normal
                Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => index += 1,
                Err(e) => {
                    // ENODEV after an unplug; anything else is just as final
                    // for this handle.
                    let gone = self.devices.remove(index);
                    log::warn!("evdev: dropping {:?}: {}", gone.path, e);
                }
            }
        }

        if self.devices.is_empty() && !self.has_backlog() {
            log::warn!("evdev: no input devices left");
            return Err(TrackerError::Dispatch(io::Error::new(
                io::ErrorKind::NotFound,
                "every input device has been removed",
            )));
        }
        Ok(())
    }

    fn readiness_fds(&self) -> Vec<BorrowedFd<'_>> {
        self.devices
            .iter()
            // SAFETY: the devices are owned by self, so the fds outlive the borrow.
            .map(|d| unsafe { BorrowedFd::borrow_raw(d.device.as_raw_fd()) })
            .collect()
    }

    fn name(&self) -> &'static str {
        "evdev"
    }
}

// =============================================================================
// Device Discovery
// =============================================================================

/// Scan `dir` and open every mouse and keyboard we are allowed to read.
///
/// Only an unreadable directory is an error; devices we can't open are
/// skipped, since most systems have a few that need root.
fn discover_devices(dir: &Path) -> Result<Vec<OpenDevice>, String> {
    let entries = fs::read_dir(dir).map_err(|e| format!("cannot read {:?}: {}", dir, e))?;

    let mut devices = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();

        // Only "event" devices; "mouse" and "js" nodes use other protocols.
        let is_event_node = path
            .file_name()
            .map_or(false, |name| name.to_string_lossy().starts_with("event"));
        if !is_event_node {
            continue;
        }

        let device = match Device::open(&path) {
            Ok(d) => d,
            Err(e) => {
                log::debug!("evdev: could not open {:?}: {}", path, e);
                continue;
            }
        };

        let name = device.name().unwrap_or("Unknown").to_string();
        let Some(device_type) = classify_device(&device) else {
            log::debug!("evdev: skipped {} ({:?})", name, path);
            continue;
        };

        // A frame must never block on a device read.
        if let Err(e) = set_nonblocking(&device) {
            log::warn!("evdev: cannot make {:?} non-blocking: {}", path, e);
            continue;
        }

        log::debug!("evdev: accepted {:?}: {} ({:?})", device_type, name, path);
        devices.push(OpenDevice {
            device,
            device_type,
            path,
        });
    }

    Ok(devices)
}

/// Classify a device as Mouse, Keyboard, or None (if we don't care about it).
fn classify_device(device: &Device) -> Option<DeviceType> {
    // Mice report movement on the relative X and Y axes
    if let Some(axes) = device.supported_relative_axes() {
        if axes.contains(RelativeAxisType::REL_X) && axes.contains(RelativeAxisType::REL_Y) {
            return Some(DeviceType::Mouse);
        }
    }

    // Keyboards: check the home row to skip power buttons and lid switches
    if let Some(keys) = device.supported_keys() {
        let has_keyboard_keys = keys.contains(Key::KEY_A)
            && keys.contains(Key::KEY_S)
            && keys.contains(Key::KEY_D)
            && keys.contains(Key::KEY_F);

        if has_keyboard_keys {
            return Some(DeviceType::Keyboard);
        }
    }

    None
}

/// Mice report their buttons as BTN_MOUSE (== BTN_LEFT) through BTN_TASK.
fn is_mouse_button(key: Key) -> bool {
    (Key::BTN_LEFT.code()..=Key::BTN_TASK.code()).contains(&key.code())
}

fn set_nonblocking(device: &Device) -> nix::Result<()> {
    let fd = device.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::evdev::EventType;

    #[test]
    fn test_missing_input_dir_fails_to_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir");

        let err = EvdevSource::open_dir("seat0", &missing).err().unwrap();
        assert!(matches!(err, TrackerError::InitializationFailed { .. }));
    }

    #[test]
    fn test_dir_without_devices_fails_to_initialize() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("event0"), b"not a device").unwrap();
        std::fs::write(dir.path().join("mouse0"), b"").unwrap();

        let err = EvdevSource::open_dir("seat0", dir.path()).err().unwrap();
        match err {
            TrackerError::InitializationFailed { seat, reason } => {
                assert_eq!(seat, "seat0");
                assert!(reason.contains("input"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    fn source() -> EvdevSource {
        EvdevSource {
            devices: Vec::new(),
            queue: VecDeque::new(),
            pending_dx: 0,
            pending_dy: 0,
        }
    }

    fn key(key: Key, value: i32) -> ::evdev::InputEvent {
        ::evdev::InputEvent::new(EventType::KEY, key.code(), value)
    }

    fn rel(axis: RelativeAxisType, value: i32) -> ::evdev::InputEvent {
        ::evdev::InputEvent::new(EventType::RELATIVE, axis.0, value)
    }

    fn syn() -> ::evdev::InputEvent {
        ::evdev::InputEvent::new(EventType::SYNCHRONIZATION, Synchronization::SYN_REPORT.0, 0)
    }

    fn drain(source: &mut EvdevSource) -> Vec<InputEvent> {
        std::iter::from_fn(|| source.poll_event()).collect()
    }

    #[test]
    fn test_mixed_report_translation() {
        let mut source = source();
        source.translate([
            rel(RelativeAxisType::REL_X, 3),
            rel(RelativeAxisType::REL_Y, -1),
            rel(RelativeAxisType::REL_X, 2),
            syn(),
            key(Key::BTN_LEFT, 1),
            key(Key::KEY_A, 1),
            key(Key::KEY_A, 2),
            syn(),
            key(Key::BTN_SIDE, 0),
            key(Key::KEY_A, 0),
            rel(RelativeAxisType::REL_Y, 4),
        ]);

        assert_eq!(
            drain(&mut source),
            vec![
                InputEvent::PointerMotion { dx: 5.0, dy: -1.0 },
                InputEvent::PointerButton {
                    button: u32::from(Key::BTN_LEFT.code()),
                    state: KeyState::Pressed,
                },
                InputEvent::Key {
                    code: u32::from(Key::KEY_A.code()),
                    state: KeyState::Pressed,
                },
                InputEvent::PointerButton {
                    button: u32::from(Key::BTN_SIDE.code()),
                    state: KeyState::Released,
                },
                InputEvent::Key {
                    code: u32::from(Key::KEY_A.code()),
                    state: KeyState::Released,
                },
                // flushed at the end of the batch, no SYN_REPORT needed
                InputEvent::PointerMotion { dx: 0.0, dy: 4.0 },
            ]
        );
    }

    #[test]
    fn test_autorepeat_is_dropped() {
        let mut source = source();
        source.translate([key(Key::KEY_A, 2), key(Key::BTN_RIGHT, 2), syn()]);
        assert!(drain(&mut source).is_empty());
    }

    #[test]
    fn test_motion_that_cancels_out_is_not_queued() {
        let mut source = source();
        source.translate([
            rel(RelativeAxisType::REL_X, 4),
            rel(RelativeAxisType::REL_X, -4),
            syn(),
        ]);
        assert!(drain(&mut source).is_empty());
    }

    #[test]
    fn test_backlog_stays_bounded_at_one_event_per_frame() {
        let mut source = source();
        let mut batch = Vec::new();
        for _ in 0..17 {
            batch.push(rel(RelativeAxisType::REL_X, 1));
            batch.push(syn());
        }
        batch.push(key(Key::BTN_LEFT, 1));
        batch.push(syn());

        // 1000 Hz mouse against a 60 fps loop: a full batch is waiting every
        // frame, but it is only read when the previous one has been drained.
        let mut longest = 0;
        for _ in 0..100 {
            source.poll_event();
            if !source.has_backlog() {
                source.translate(batch.clone());
            }
            longest = longest.max(source.queue.len());
        }
        assert!(longest <= 18, "backlog grew to {longest}");
    }

    #[test]
    fn test_dispatch_waits_for_backlog_to_drain() {
        let mut source = source();
        source.translate([key(Key::KEY_A, 1), key(Key::KEY_A, 0)]);

        assert!(source.dispatch().is_ok());
        assert_eq!(source.queue.len(), 2);
    }

    #[test]
    fn test_dispatch_fails_once_every_device_is_gone() {
        let mut source = source();
        source.translate([key(Key::KEY_A, 1)]);

        // Queued events are still handed out first.
        assert!(source.dispatch().is_ok());
        assert!(source.poll_event().is_some());

        assert!(matches!(
            source.dispatch(),
            Err(TrackerError::Dispatch(e)) if e.kind() == io::ErrorKind::NotFound
        ));
    }

    #[test]
    fn test_mouse_button_range() {
        assert!(is_mouse_button(Key::BTN_LEFT));
        assert!(is_mouse_button(Key::BTN_MIDDLE));
        assert!(is_mouse_button(Key::BTN_SIDE));
        assert!(!is_mouse_button(Key::KEY_A));
        assert!(!is_mouse_button(Key::BTN_TOUCH));
    }
}
