//! evdev-based input source
//!
//! Reads pointer buttons, pointer motion and a handful of keys straight from
//! /dev/input/event* devices. The kernel only reports relative motion for
//! mice, so the pointer position here is a virtual one built by summing
//! deltas. Distances between down and up are exact; absolute screen
//! coordinates come from the compositor (see `probe::desktop`).
//!
//! The user must be in the 'input' group to access /dev/input/* devices.

use super::{ClickTracker, EventSource, InputEvent, Key, Modifier, Modifiers, Point};
use crate::error::InputError;
use evdev::{AbsoluteAxisType, Device, InputEventKind, Key as EvKey, RelativeAxisType};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// evdev-based pointer/keyboard source
pub struct EvdevSource {
    /// Paths to keyboard and pointer devices
    device_paths: Vec<PathBuf>,
    /// Multi-click interval
    double_click: Duration,
    /// Signal to stop the listener task
    stop_signal: Option<oneshot::Sender<()>>,
}

impl EvdevSource {
    pub fn new(double_click_ms: u64) -> Result<Self, InputError> {
        let device_paths = find_input_devices()?;

        if device_paths.is_empty() {
            return Err(InputError::NoDevices);
        }

        tracing::debug!(
            "Found {} input device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        Ok(Self {
            device_paths,
            double_click: Duration::from_millis(double_click_ms),
            stop_signal: None,
        })
    }
}

#[async_trait::async_trait]
impl EventSource for EvdevSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<InputEvent>, InputError> {
        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);

        let device_paths = self.device_paths.clone();
        let double_click = self.double_click;

        tokio::task::spawn_blocking(move || {
            evdev_source_loop(device_paths, double_click, tx, stop_rx);
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), InputError> {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        Ok(())
    }
}

/// Per-device state for touchpads reporting absolute positions
#[derive(Default)]
struct AbsTrack {
    x: Option<i32>,
    y: Option<i32>,
}

/// Pointer, modifier and click state shared by all devices
struct Tracker {
    position: Point,
    modifiers: Modifiers,
    clicks: ClickTracker,
}

impl Tracker {
    fn new(double_click: Duration) -> Self {
        Self {
            position: Point::default(),
            modifiers: Modifiers::default(),
            clicks: ClickTracker::new(double_click),
        }
    }

    /// Fold one key/button event into the state, returning an event to emit
    fn key(&mut self, key: EvKey, value: i32, at: Instant) -> Option<InputEvent> {
        if let Some(modifier) = modifier_for(key) {
            match value {
                1 => self.modifiers.set(modifier, true),
                0 => self.modifiers.set(modifier, false),
                _ => {}
            }
            return None;
        }

        match (key, value) {
            (EvKey::BTN_LEFT, 1) => {
                let click_count = self.clicks.press(self.position, at);
                Some(InputEvent::PointerDown {
                    location: self.position,
                    click_count,
                    modifiers: self.modifiers,
                    at,
                })
            }
            (EvKey::BTN_LEFT, 0) => Some(InputEvent::PointerUp {
                location: self.position,
                click_count: self.clicks.current(),
                modifiers: self.modifiers,
                at,
            }),
            (EvKey::KEY_A, 1) => Some(self.key_down(Key::A, at)),
            (EvKey::KEY_ESC, 1) => Some(self.key_down(Key::Escape, at)),
            _ => None,
        }
    }

    fn key_down(&self, key: Key, at: Instant) -> InputEvent {
        InputEvent::KeyDown {
            key,
            modifiers: self.modifiers,
            pointer: self.position,
            at,
        }
    }

    fn relative(&mut self, axis: RelativeAxisType, value: i32) {
        match axis {
            RelativeAxisType::REL_X => self.position.x += f64::from(value),
            RelativeAxisType::REL_Y => self.position.y += f64::from(value),
            _ => {}
        }
    }

    fn absolute(&mut self, track: &mut AbsTrack, axis: AbsoluteAxisType, value: i32) {
        let (last, coord) = match axis {
            AbsoluteAxisType::ABS_X => (&mut track.x, &mut self.position.x),
            AbsoluteAxisType::ABS_Y => (&mut track.y, &mut self.position.y),
            _ => return,
        };
        if let Some(prev) = *last {
            *coord += f64::from(value - prev);
        }
        *last = Some(value);
    }
}

fn modifier_for(key: EvKey) -> Option<Modifier> {
    match key {
        EvKey::KEY_LEFTSHIFT | EvKey::KEY_RIGHTSHIFT => Some(Modifier::Shift),
        EvKey::KEY_LEFTCTRL | EvKey::KEY_RIGHTCTRL => Some(Modifier::Ctrl),
        EvKey::KEY_LEFTALT | EvKey::KEY_RIGHTALT => Some(Modifier::Alt),
        EvKey::KEY_LEFTMETA | EvKey::KEY_RIGHTMETA => Some(Modifier::Meta),
        _ => None,
    }
}

/// Main listener loop running in a blocking task
fn evdev_source_loop(
    device_paths: Vec<PathBuf>,
    double_click: Duration,
    tx: mpsc::Sender<InputEvent>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    // Open all devices in non-blocking mode
    let mut devices: Vec<(Device, AbsTrack)> = device_paths
        .iter()
        .filter_map(|path| match Device::open(path) {
            Ok(device) => {
                let fd = device.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    if flags != -1 {
                        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                    }
                }
                tracing::debug!("Opened device (non-blocking): {:?}", path);
                Some((device, AbsTrack::default()))
            }
            Err(e) => {
                tracing::warn!("Failed to open {:?}: {}", path, e);
                None
            }
        })
        .collect();

    if devices.is_empty() {
        tracing::error!("No input devices could be opened");
        return;
    }

    let mut tracker = Tracker::new(double_click);
    tracing::info!("Listening for selection gestures on {} device(s)", devices.len());

    loop {
        match stop_rx.try_recv() {
            Ok(_) | Err(oneshot::error::TryRecvError::Closed) => {
                tracing::debug!("Input source stopping");
                return;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
        }

        for (device, abs) in &mut devices {
            let Ok(events) = device.fetch_events() else {
                continue;
            };
            let now = Instant::now();
            for event in events {
                let emitted = match event.kind() {
                    InputEventKind::Key(EvKey::BTN_TOUCH) if event.value() == 0 => {
                        // Finger lifted: the next touch must not jump the pointer
                        *abs = AbsTrack::default();
                        None
                    }
                    InputEventKind::Key(key) => tracker.key(key, event.value(), now),
                    InputEventKind::RelAxis(axis) => {
                        tracker.relative(axis, event.value());
                        None
                    }
                    InputEventKind::AbsAxis(axis) => {
                        tracker.absolute(abs, axis, event.value());
                        None
                    }
                    _ => None,
                };

                if let Some(input) = emitted {
                    tracing::trace!("Input event: {:?}", input);
                    if tx.blocking_send(input).is_err() {
                        return; // Channel closed
                    }
                }
            }
        }

        // Small sleep to avoid busy-waiting
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Find all keyboard and pointer input devices
fn find_input_devices() -> Result<Vec<PathBuf>, InputError> {
    let mut found = Vec::new();

    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| InputError::DeviceAccess(format!("/dev/input: {}", e)))?;

    for entry in input_dir {
        let entry = entry.map_err(|e| InputError::DeviceAccess(e.to_string()))?;
        let path = entry.path();

        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);

        if !is_event_device {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                if is_keyboard(&device) || is_pointer(&device) {
                    tracing::debug!(
                        "Found input device: {:?} ({:?})",
                        path,
                        device.name().unwrap_or("unknown")
                    );
                    found.push(path);
                }
            }
            Err(e) => {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(InputError::DeviceAccess(path.display().to_string()));
                }
                tracing::trace!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(found)
}

fn is_keyboard(device: &Device) -> bool {
    device
        .supported_keys()
        .map(|keys| {
            keys.contains(EvKey::KEY_A)
                && keys.contains(EvKey::KEY_Z)
                && keys.contains(EvKey::KEY_ENTER)
        })
        .unwrap_or(false)
}

fn is_pointer(device: &Device) -> bool {
    let has_button = device
        .supported_keys()
        .map(|keys| keys.contains(EvKey::BTN_LEFT))
        .unwrap_or(false);
    let has_motion = device
        .supported_relative_axes()
        .map(|axes| axes.contains(RelativeAxisType::REL_X))
        .unwrap_or(false)
        || device
            .supported_absolute_axes()
            .map(|axes| axes.contains(AbsoluteAxisType::ABS_X))
            .unwrap_or(false);
    has_button && has_motion
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_tracking() {
        let mut tracker = Tracker::new(Duration::from_millis(500));
        let now = Instant::now();

        assert!(tracker.key(EvKey::KEY_LEFTCTRL, 1, now).is_none());
        match tracker.key(EvKey::KEY_A, 1, now) {
            Some(InputEvent::KeyDown { key, modifiers, .. }) => {
                assert_eq!(key, Key::A);
                assert!(modifiers.is_exactly(Modifier::Ctrl));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        tracker.key(EvKey::KEY_LEFTCTRL, 0, now);
        assert!(!tracker.modifiers.ctrl);
    }

    #[test]
    fn test_relative_motion_between_down_and_up() {
        let mut tracker = Tracker::new(Duration::from_millis(500));
        let now = Instant::now();

        let down = tracker.key(EvKey::BTN_LEFT, 1, now);
        tracker.relative(RelativeAxisType::REL_X, 30);
        tracker.relative(RelativeAxisType::REL_Y, -40);
        let up = tracker.key(EvKey::BTN_LEFT, 0, now);

        let (Some(InputEvent::PointerDown { location: a, .. }), Some(InputEvent::PointerUp { location: b, .. })) =
            (down, up)
        else {
            panic!("expected down/up pair");
        };
        assert_eq!(a.distance(&b), 50.0);
    }

    #[test]
    fn test_double_click_count_carried_to_release() {
        let mut tracker = Tracker::new(Duration::from_millis(500));
        let t0 = Instant::now();

        tracker.key(EvKey::BTN_LEFT, 1, t0);
        tracker.key(EvKey::BTN_LEFT, 0, t0);
        tracker.key(EvKey::BTN_LEFT, 1, t0 + Duration::from_millis(150));
        match tracker.key(EvKey::BTN_LEFT, 0, t0 + Duration::from_millis(200)) {
            Some(InputEvent::PointerUp { click_count, .. }) => assert_eq!(click_count, 2),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_absolute_motion_uses_deltas() {
        let mut tracker = Tracker::new(Duration::from_millis(500));
        let mut abs = AbsTrack::default();

        tracker.absolute(&mut abs, AbsoluteAxisType::ABS_X, 1000);
        assert_eq!(tracker.position.x, 0.0);
        tracker.absolute(&mut abs, AbsoluteAxisType::ABS_X, 1012);
        assert_eq!(tracker.position.x, 12.0);
    }

    #[test]
    fn test_key_repeat_ignored() {
        let mut tracker = Tracker::new(Duration::from_millis(500));
        assert!(tracker.key(EvKey::KEY_A, 2, Instant::now()).is_none());
    }
}
