//! Global pointer and keyboard input
//!
//! On Linux, events are read from the kernel input subsystem using evdev.
//! This works on all Wayland compositors because it bypasses the display
//! server. Requires the user to be in the 'input' group.
//!
//! Elsewhere, rdev's global listener is used (needs Accessibility /
//! Input Monitoring permission on macOS).
//!
//! Neither backend reports click counts, so both feed button presses
//! through a [`ClickTracker`].

#[cfg(target_os = "linux")]
pub mod evdev_source;
#[cfg(not(target_os = "linux"))]
pub mod rdev_source;

use crate::error::InputError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// A position in screen coordinates (pixels)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A single modifier key class (left and right variants are folded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Shift,
    Ctrl,
    Alt,
    Meta,
}

impl Modifier {
    /// Modifier used by the platform's select-all shortcut
    pub fn select_all() -> Self {
        if cfg!(target_os = "macos") {
            Modifier::Meta
        } else {
            Modifier::Ctrl
        }
    }
}

impl FromStr for Modifier {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shift" => Ok(Modifier::Shift),
            "ctrl" | "control" => Ok(Modifier::Ctrl),
            "alt" | "option" | "opt" => Ok(Modifier::Alt),
            "meta" | "super" | "cmd" | "command" | "win" => Ok(Modifier::Meta),
            _ => Err(InputError::UnknownModifier(s.to_string())),
        }
    }
}

/// Modifier flags held at the time of an event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn contains(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Shift => self.shift,
            Modifier::Ctrl => self.ctrl,
            Modifier::Alt => self.alt,
            Modifier::Meta => self.meta,
        }
    }

    pub fn set(&mut self, modifier: Modifier, held: bool) {
        match modifier {
            Modifier::Shift => self.shift = held,
            Modifier::Ctrl => self.ctrl = held,
            Modifier::Alt => self.alt = held,
            Modifier::Meta => self.meta = held,
        }
    }

    /// True when `modifier` is held and nothing else is
    pub fn is_exactly(&self, modifier: Modifier) -> bool {
        let mut only = Modifiers::default();
        only.set(modifier, true);
        *self == only
    }
}

/// Keys the gesture layer cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    A,
    Escape,
}

/// Raw events emitted by an [`EventSource`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Primary button pressed
    PointerDown {
        location: Point,
        click_count: u32,
        modifiers: Modifiers,
        at: Instant,
    },
    /// Primary button released; `click_count` matches the press
    PointerUp {
        location: Point,
        click_count: u32,
        modifiers: Modifiers,
        at: Instant,
    },
    /// A key of interest was pressed
    KeyDown {
        key: Key,
        modifiers: Modifiers,
        pointer: Point,
        at: Instant,
    },
}

/// Trait for global input implementations
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Start listening for input events
    /// Returns a channel receiver for events
    async fn start(&mut self) -> Result<mpsc::Receiver<InputEvent>, InputError>;

    /// Stop listening and clean up
    async fn stop(&mut self) -> Result<(), InputError>;
}

/// Factory function to create the platform input source
#[cfg(target_os = "linux")]
pub fn create_source(double_click_ms: u64) -> Result<Box<dyn EventSource>, InputError> {
    Ok(Box::new(evdev_source::EvdevSource::new(double_click_ms)?))
}

/// Factory function to create the platform input source
#[cfg(not(target_os = "linux"))]
pub fn create_source(double_click_ms: u64) -> Result<Box<dyn EventSource>, InputError> {
    Ok(Box::new(rdev_source::RdevSource::new(double_click_ms)))
}

/// Max distance between presses that still count as one multi-click
const CLICK_SLOP_PX: f64 = 4.0;

/// Synthesizes click counts from successive primary-button presses
#[derive(Debug)]
pub struct ClickTracker {
    interval: Duration,
    last: Option<(Point, Instant)>,
    count: u32,
}

impl ClickTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            count: 0,
        }
    }

    /// Register a press and return its click count (1 = single click)
    pub fn press(&mut self, location: Point, at: Instant) -> u32 {
        let continues = match self.last {
            Some((prev, prev_at)) => {
                at.saturating_duration_since(prev_at) <= self.interval
                    && prev.distance(&location) <= CLICK_SLOP_PX
            }
            None => false,
        };

        self.count = if continues { self.count + 1 } else { 1 };
        self.last = Some((location, at));
        self.count
    }

    /// Click count of the most recent press
    pub fn current(&self) -> u32 {
        self.count.max(1)
    }
}
