// =============================================================================
// Colander Probe - Main Entry Point
// =============================================================================
//
// Opens the default input source, runs the tracker frame by frame, and prints
// every key/button transition and every pointer motion as a JSON line on
// stdout. Logs go to stderr (RUST_LOG=debug for device discovery details).
//
// USAGE
// -----
//   colander [config.json]
//
// The config file is optional; COLANDER_SEAT, COLANDER_TRACK_POINTER and
// COLANDER_MOTION_POLICY override whatever it says.
//
// PERMISSIONS REQUIRED
// --------------------
// The user must be in the 'input' group to read from /dev/input/:
//   sudo usermod -a -G input $USER
//   (then log out and back in)
//
// =============================================================================

use std::io::{self, Write};
use std::os::fd::BorrowedFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use serde::Serialize;
use signal_hook::consts::signal::*;
use signal_hook::flag as signal_flag;

use colander::{
    DefaultSource, EventSource, InputStateTracker, TrackerConfig, TrackerError, Transition,
};

/// How long to sleep in poll() before sending a heartbeat.
const POLL_TIMEOUT_MS: u16 = 1000;

/// Frame interval for sources that have nothing to poll on.
const IDLE_FRAME: Duration = Duration::from_millis(16);

// =============================================================================
// Output
// =============================================================================

/// One line of probe output.
#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputEvent {
    /// Sent once the source is open
    Ready {
        seat: String,
        backend: &'static str,
        track_pointer: bool,
    },

    KeyPressed { code: u32 },
    KeyReleased { code: u32 },
    ButtonPressed { button: &'static str },
    ButtonReleased { button: &'static str },

    /// Pointer motion seen in one frame
    Motion { dx: i32, dy: i32 },

    /// Nothing happened for POLL_TIMEOUT_MS
    Heartbeat,

    Error { message: String },
}

impl From<Transition> for OutputEvent {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::KeyPressed(code) => OutputEvent::KeyPressed { code },
            Transition::KeyReleased(code) => OutputEvent::KeyReleased { code },
            Transition::ButtonPressed(b) => OutputEvent::ButtonPressed { button: b.name() },
            Transition::ButtonReleased(b) => OutputEvent::ButtonReleased { button: b.name() },
        }
    }
}

/// Send an event to stdout as a JSON line.
fn send_event(stdout: &mut io::StdoutLock, event: &OutputEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        let _ = writeln!(stdout, "{}", json);
        let _ = stdout.flush();
    }
}

// =============================================================================
// Frame Loop
// =============================================================================

/// Block until one of the source's descriptors is readable.
/// Returns the number of ready descriptors (0 on timeout).
fn wait_for_input(fds: &[BorrowedFd<'_>]) -> nix::Result<i32> {
    if fds.is_empty() {
        std::thread::sleep(IDLE_FRAME);
        return Ok(1);
    }

    let mut poll_fds: Vec<_> = fds
        .iter()
        .map(|fd| PollFd::new(*fd, PollFlags::POLLIN))
        .collect();
    poll(&mut poll_fds, PollTimeout::from(POLL_TIMEOUT_MS))
}

/// Run frames until the source has nothing left, reporting each one.
///
/// A source only sees new data after a dispatch, and every frame dispatches
/// at its end, so the first empty frame after waking is expected. Two empty
/// frames in a row mean the queue is drained.
fn drain_frames(
    tracker: &mut InputStateTracker<DefaultSource>,
    stdout: &mut io::StdoutLock,
    running: &AtomicBool,
) -> Result<(), TrackerError> {
    let mut idle_frames = 0;
    while idle_frames < 2 && running.load(Ordering::Relaxed) {
        let consumed = match tracker.advance_frame() {
            Ok(consumed) => consumed,
            Err(e) => {
                // The frame advanced before the refresh failed.
                report_frame(tracker, stdout)?;
                return Err(e);
            }
        };
        if !consumed {
            idle_frames += 1;
            continue;
        }
        idle_frames = 0;
        report_frame(tracker, stdout)?;
    }
    Ok(())
}

/// Print the edges and motion of the current frame.
fn report_frame(
    tracker: &InputStateTracker<DefaultSource>,
    stdout: &mut io::StdoutLock,
) -> Result<(), TrackerError> {
    for transition in tracker.transitions()? {
        send_event(stdout, &OutputEvent::from(transition));
    }

    let (dx, dy) = tracker.pointer_delta()?;
    if dx != 0 || dy != 0 {
        send_event(stdout, &OutputEvent::Motion { dx, dy });
    }
    Ok(())
}

fn load_config() -> Result<TrackerConfig, colander::ConfigError> {
    let config = match std::env::args_os().nth(1) {
        Some(path) => TrackerConfig::load(Path::new(&path))?,
        None => TrackerConfig::default(),
    };
    config.apply_env()
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // -------------------------------------------------------------------------
    // Set up signal handling for graceful shutdown
    // -------------------------------------------------------------------------
    // 'running' flips to false on SIGINT/SIGTERM so the source is released
    // through shutdown() instead of the process just dying.
    let running = Arc::new(AtomicBool::new(true));
    signal_flag::register(SIGINT, Arc::clone(&running)).ok();
    signal_flag::register(SIGTERM, Arc::clone(&running)).ok();

    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            send_event(&mut stdout_lock, &OutputEvent::Error { message: e.to_string() });
            std::process::exit(2);
        }
    };

    // -------------------------------------------------------------------------
    // Open the input source
    // -------------------------------------------------------------------------
    let mut tracker = match InputStateTracker::open_default(config) {
        Ok(tracker) => tracker,
        Err(e) => {
            log::error!("{}", e);
            send_event(&mut stdout_lock, &OutputEvent::Error { message: e.to_string() });
            std::process::exit(1);
        }
    };

    let backend = tracker.source().map_or("none", |source| source.name());
    send_event(
        &mut stdout_lock,
        &OutputEvent::Ready {
            seat: tracker.config().seat.clone(),
            backend,
            track_pointer: tracker.config().track_pointer,
        },
    );

    log::info!("Starting frame loop...");

    while running.load(Ordering::Relaxed) {
        let ready = match tracker.source() {
            Some(source) => wait_for_input(&source.readiness_fds()),
            None => break,
        };

        match ready {
            Ok(0) => send_event(&mut stdout_lock, &OutputEvent::Heartbeat),
            Ok(_) => {
                if let Err(e) = drain_frames(&mut tracker, &mut stdout_lock, &running) {
                    // Dispatch errors mean the source is gone (all devices unplugged).
                    log::error!("Frame failed: {}", e);
                    send_event(&mut stdout_lock, &OutputEvent::Error { message: e.to_string() });
                    break;
                }
            }
            Err(nix::errno::Errno::EINTR) => {}
            Err(e) => log::error!("Poll error: {}", e),
        }
    }

    log::info!("Shutting down gracefully...");
    if let Err(e) = tracker.shutdown() {
        log::warn!("{}", e);
    }
}
