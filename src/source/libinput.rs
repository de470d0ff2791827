//! libinput backend.
//!
//! libinput does device discovery, hotplug and seat handling on its own; we
//! assign it a udev seat and translate the three event kinds the tracker
//! follows. Everything else comes out as [`InputEvent::Other`].

use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use input::event::keyboard::{KeyState as LibinputKeyState, KeyboardEvent, KeyboardEventTrait};
use input::event::pointer::{ButtonState, PointerEvent};
use input::{Event, Libinput, LibinputInterface};
use nix::libc::{O_RDONLY, O_RDWR, O_WRONLY};

use super::{validate_seat, EventSource};
use crate::error::TrackerError;
use crate::event::{InputEvent, KeyState};

/// Opens and closes device nodes on behalf of libinput.
///
/// Passed by value to [`LibinputSource::open`], so every source carries its
/// own callbacks instead of sharing a process-wide table.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestrictedOpener;

impl LibinputInterface for RestrictedOpener {
    fn open_restricted(&mut self, path: &Path, flags: i32) -> Result<OwnedFd, i32> {
        OpenOptions::new()
            .custom_flags(flags)
            .read((flags & O_RDONLY != 0) | (flags & O_RDWR != 0))
            .write((flags & O_WRONLY != 0) | (flags & O_RDWR != 0))
            .open(path)
            .map(OwnedFd::from)
            .map_err(|err| {
                log::debug!("libinput: open {:?} failed: {}", path, err);
                err.raw_os_error().unwrap_or(nix::libc::EIO)
            })
    }

    fn close_restricted(&mut self, fd: OwnedFd) {
        drop(File::from(fd));
    }
}

/// Event source backed by a libinput udev context.
pub struct LibinputSource {
    context: Libinput,
}

impl LibinputSource {
    /// Create a udev context with `interface` and assign it to `seat`.
    pub fn open<I>(seat: &str, interface: I) -> Result<Self, TrackerError>
    where
        I: LibinputInterface + 'static,
    {
        validate_seat(seat)?;

        let mut context = Libinput::new_with_udev(interface);
        context
            .udev_assign_seat(seat)
            .map_err(|()| TrackerError::InitializationFailed {
                seat: seat.to_string(),
                reason: "libinput could not assign the udev seat".to_string(),
            })?;

        // Queue the initial device-added events.
        context.dispatch().map_err(|e| TrackerError::InitializationFailed {
            seat: seat.to_string(),
            reason: format!("initial dispatch failed: {}", e),
        })?;

        log::info!("libinput: assigned to {}", seat);
        Ok(Self { context })
    }
}

impl EventSource for LibinputSource {
    fn poll_event(&mut self) -> Option<InputEvent> {
        // The libinput event is destroyed when `event` goes out of scope.
        let event = self.context.next()?;
        Some(translate(&event))
    }

    fn dispatch(&mut self) -> Result<(), TrackerError> {
        self.context.dispatch()?;
        Ok(())
    }

    fn readiness_fds(&self) -> Vec<BorrowedFd<'_>> {
        // SAFETY: the context owns the epoll fd for as long as self lives.
        vec![unsafe { BorrowedFd::borrow_raw(self.context.as_raw_fd()) }]
    }

    fn name(&self) -> &'static str {
        "libinput"
    }
}

fn translate(event: &Event) -> InputEvent {
    match event {
        Event::Keyboard(KeyboardEvent::Key(key)) => InputEvent::Key {
            code: key.key(),
            state: KeyState::from(key.key_state() == LibinputKeyState::Pressed),
        },
        Event::Pointer(PointerEvent::Motion(motion)) => InputEvent::PointerMotion {
            dx: motion.dx(),
            dy: motion.dy(),
        },
        Event::Pointer(PointerEvent::Button(button)) => InputEvent::PointerButton {
            button: button.button(),
            state: KeyState::from(button.button_state() == ButtonState::Pressed),
        },
        _ => InputEvent::Other,
    }
}
