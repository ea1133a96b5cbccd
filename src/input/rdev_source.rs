//! rdev-based input source for macOS and Windows
//!
//! rdev reports the pointer position only on motion events and never reports
//! click counts, so the last known position is carried into button events
//! and clicks are counted with a [`ClickTracker`].
//!
//! On macOS this requires Accessibility / Input Monitoring permission.

use super::{ClickTracker, EventSource, InputEvent, Key, Modifier, Modifiers, Point};
use crate::error::InputError;
use rdev::{listen, Button, Event, EventType, Key as RdevKey};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// rdev-based pointer/keyboard source
pub struct RdevSource {
    double_click: Duration,
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl RdevSource {
    pub fn new(double_click_ms: u64) -> Self {
        Self {
            double_click: Duration::from_millis(double_click_ms),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }
}

#[async_trait::async_trait]
impl EventSource for RdevSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<InputEvent>, InputError> {
        let (tx, rx) = mpsc::channel(64);
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let mut state = ListenState::new(self.double_click);

        let thread_handle = std::thread::spawn(move || {
            let callback = move |event: Event| {
                if !running.load(Ordering::SeqCst) {
                    return;
                }
                if let Some(input) = state.handle(&event.event_type, Instant::now()) {
                    let _ = tx.blocking_send(input);
                }
            };

            // This blocks until an error occurs or the process is terminated
            if let Err(e) = listen(callback) {
                tracing::error!("rdev listen error: {:?}", e);
                tracing::warn!(
                    "Global input capture failed. Grant Accessibility and Input Monitoring \
                     permission in System Settings > Privacy & Security."
                );
            }
        });

        self.thread_handle = Some(thread_handle);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), InputError> {
        // rdev's listen() cannot be interrupted; the callback goes quiet instead
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct ListenState {
    position: Point,
    modifiers: Modifiers,
    clicks: ClickTracker,
}

impl ListenState {
    fn new(double_click: Duration) -> Self {
        Self {
            position: Point::default(),
            modifiers: Modifiers::default(),
            clicks: ClickTracker::new(double_click),
        }
    }

    fn handle(&mut self, event: &EventType, at: Instant) -> Option<InputEvent> {
        match *event {
            EventType::MouseMove { x, y } => {
                self.position = Point::new(x, y);
                None
            }
            EventType::ButtonPress(Button::Left) => {
                let click_count = self.clicks.press(self.position, at);
                Some(InputEvent::PointerDown {
                    location: self.position,
                    click_count,
                    modifiers: self.modifiers,
                    at,
                })
            }
            EventType::ButtonRelease(Button::Left) => Some(InputEvent::PointerUp {
                location: self.position,
                click_count: self.clicks.current(),
                modifiers: self.modifiers,
                at,
            }),
            EventType::KeyPress(key) => {
                if let Some(modifier) = modifier_for(key) {
                    self.modifiers.set(modifier, true);
                    return None;
                }
                let key = match key {
                    RdevKey::KeyA => Key::A,
                    RdevKey::Escape => Key::Escape,
                    _ => return None,
                };
                Some(InputEvent::KeyDown {
                    key,
                    modifiers: self.modifiers,
                    pointer: self.position,
                    at,
                })
            }
            EventType::KeyRelease(key) => {
                if let Some(modifier) = modifier_for(key) {
                    self.modifiers.set(modifier, false);
                }
                None
            }
            _ => None,
        }
    }
}

fn modifier_for(key: RdevKey) -> Option<Modifier> {
    match key {
        RdevKey::ShiftLeft | RdevKey::ShiftRight => Some(Modifier::Shift),
        RdevKey::ControlLeft | RdevKey::ControlRight => Some(Modifier::Ctrl),
        RdevKey::Alt | RdevKey::AltGr => Some(Modifier::Alt),
        RdevKey::MetaLeft | RdevKey::MetaRight => Some(Modifier::Meta),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_events_carry_last_position() {
        let mut state = ListenState::new(Duration::from_millis(500));
        let now = Instant::now();

        state.handle(&EventType::MouseMove { x: 10.0, y: 20.0 }, now);
        match state.handle(&EventType::ButtonPress(Button::Left), now) {
            Some(InputEvent::PointerDown {
                location,
                click_count,
                ..
            }) => {
                assert_eq!(location, Point::new(10.0, 20.0));
                assert_eq!(click_count, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_select_all_modifiers() {
        let mut state = ListenState::new(Duration::from_millis(500));
        let now = Instant::now();

        state.handle(&EventType::KeyPress(RdevKey::MetaLeft), now);
        match state.handle(&EventType::KeyPress(RdevKey::KeyA), now) {
            Some(InputEvent::KeyDown { key, modifiers, .. }) => {
                assert_eq!(key, Key::A);
                assert!(modifiers.is_exactly(Modifier::Meta));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        state.handle(&EventType::KeyRelease(RdevKey::MetaLeft), now);
        assert_eq!(state.modifiers, Modifiers::default());
    }

    #[test]
    fn test_right_button_ignored() {
        let mut state = ListenState::new(Duration::from_millis(500));
        assert!(state
            .handle(&EventType::ButtonPress(Button::Right), Instant::now())
            .is_none());
    }
}
