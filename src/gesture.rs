//! Gesture classification
//!
//! Turns raw pointer/keyboard events into selection gestures:
//!
//! - `drag`: press and release at least `drag_threshold_px` apart
//! - `multi_click`: click count >= 2, whatever the distance
//! - `select_all`: Ctrl+A (Cmd+A on macOS) with no other modifier
//! - `manual`: injected by `hoverbar trigger`, never classified
//!
//! Plain single clicks never count, so refocusing a window cannot re-trigger a
//! stale selection. Accepted gestures go through a [`Debouncer`] so the
//! target app's selection can settle before it is read.

use crate::config::GestureConfig;
use crate::error::InputError;
use crate::input::{Key, Modifier, Modifiers, Point};
use crate::probe::AppInfo;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Kind of an accepted selection gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Drag,
    MultiClick,
    SelectAll,
    Manual,
}

impl GestureKind {
    /// Gestures whose only purpose is selecting text
    pub fn is_explicit(&self) -> bool {
        !matches!(self, GestureKind::Drag)
    }
}

/// An accepted gesture, ready for resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gesture {
    pub kind: GestureKind,
    pub location: Point,
    /// The focused window moved between press and release
    pub window_moved: bool,
    /// Selection fingerprint at the press; a probe result still carrying it
    /// predates the gesture
    pub selection_stamp: Option<u64>,
}

impl Gesture {
    pub fn manual(location: Point) -> Self {
        Self {
            kind: GestureKind::Manual,
            location,
            window_moved: false,
            selection_stamp: None,
        }
    }
}

/// Desktop state at the time of an event, as seen by the probe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvSnapshot {
    pub frontmost: Option<AppInfo>,
    pub own_pid: u32,
    /// Element under the pointer belongs to this process
    pub pointer_over_own_ui: bool,
    pub focused_editable: bool,
    pub focused_window_origin: Option<Point>,
    /// Element under the pointer is text owned by another process
    pub text_context_owned_by_other: bool,
    /// Fingerprint of the global selection buffer, taken at press time only
    pub selection_stamp: Option<u64>,
}

/// Bookkeeping for one press, dropped at release
#[derive(Debug, Clone, Copy)]
pub struct GestureSample {
    pub down_location: Point,
    pub click_count: u32,
    pub down_at: Instant,
    pub window_origin: Option<Point>,
    pub selection_stamp: Option<u64>,
}

/// Classification rules, resolved from [`GestureConfig`]
#[derive(Debug, Clone)]
pub struct GesturePolicy {
    pub drag_threshold: f64,
    pub activation_modifier: Option<Modifier>,
    pub ignored_apps: Vec<String>,
    pub file_browser_apps: Vec<String>,
    pub suppress_window_drags: bool,
    pub mouse_debounce: Duration,
    pub select_all_debounce: Duration,
}

impl GesturePolicy {
    pub fn from_config(config: &GestureConfig) -> Result<Self, InputError> {
        let activation_modifier = config
            .activation_modifier
            .as_deref()
            .map(str::parse)
            .transpose()?;

        Ok(Self {
            drag_threshold: config.drag_threshold_px,
            activation_modifier,
            ignored_apps: lowercase(&config.ignored_apps),
            file_browser_apps: lowercase(&config.file_browser_apps),
            suppress_window_drags: config.suppress_window_drags,
            mouse_debounce: Duration::from_millis(config.mouse_debounce_ms),
            select_all_debounce: Duration::from_millis(config.select_all_debounce_ms),
        })
    }

    /// Settle delay before resolving a gesture of `kind`
    pub fn debounce_for(&self, kind: GestureKind) -> Duration {
        match kind {
            GestureKind::SelectAll => self.select_all_debounce,
            GestureKind::Manual => Duration::ZERO,
            GestureKind::Drag | GestureKind::MultiClick => self.mouse_debounce,
        }
    }
}

impl Default for GesturePolicy {
    fn default() -> Self {
        Self {
            drag_threshold: 5.0,
            activation_modifier: None,
            ignored_apps: Vec::new(),
            file_browser_apps: Vec::new(),
            suppress_window_drags: true,
            mouse_debounce: Duration::from_millis(200),
            select_all_debounce: Duration::from_millis(120),
        }
    }
}

fn lowercase(apps: &[String]) -> Vec<String> {
    apps.iter().map(|a| a.to_lowercase()).collect()
}

/// Stateful classifier fed by the daemon's input loop
pub struct GestureClassifier {
    policy: GesturePolicy,
    sample: Option<GestureSample>,
    /// Stamp from the first press of the current click sequence
    sequence_stamp: Option<u64>,
}

impl GestureClassifier {
    pub fn new(policy: GesturePolicy) -> Self {
        Self {
            policy,
            sample: None,
            sequence_stamp: None,
        }
    }

    pub fn policy(&self) -> &GesturePolicy {
        &self.policy
    }

    /// Record a press. `env` only needs the window origin and selection
    /// stamp (see `AccessibilityTextProbe::press_snapshot`).
    pub fn pointer_down(
        &mut self,
        location: Point,
        click_count: u32,
        at: Instant,
        env: &EnvSnapshot,
    ) {
        // By the second press of a double-click the app has already selected
        // the word, so the first press holds the meaningful stamp
        if click_count <= 1 {
            self.sequence_stamp = env.selection_stamp;
        }

        self.sample = Some(GestureSample {
            down_location: location,
            click_count,
            down_at: at,
            window_origin: env.focused_window_origin,
            selection_stamp: self.sequence_stamp,
        });
    }

    /// Classify a release; `Some` means resolution should be scheduled
    pub fn pointer_up(
        &mut self,
        location: Point,
        click_count: u32,
        modifiers: Modifiers,
        env: &EnvSnapshot,
    ) -> Option<Gesture> {
        let sample = self.sample.take()?;

        if self.is_ignored(env) || !self.modifier_satisfied(modifiers) {
            return None;
        }

        let distance = sample.down_location.distance(&location);
        let click_count = click_count.max(sample.click_count);
        let is_drag = distance >= self.policy.drag_threshold;
        let mut is_multi = click_count >= 2;

        if is_multi && self.is_file_browser(env) && !env.focused_editable {
            tracing::debug!("Multi-click in file browser on non-editable element, ignoring");
            is_multi = false;
        }

        let window_moved = match (sample.window_origin, env.focused_window_origin) {
            (Some(before), Some(after)) => before.distance(&after) >= 1.0,
            _ => false,
        };

        let kind = if is_multi {
            GestureKind::MultiClick
        } else if is_drag {
            if window_moved && self.policy.suppress_window_drags {
                tracing::debug!("Focused window moved during drag, treating as window drag");
                return None;
            }
            GestureKind::Drag
        } else {
            return None;
        };

        tracing::debug!(
            "Gesture {:?} (distance {:.1}px, clicks {}, held {:?})",
            kind,
            distance,
            click_count,
            sample.down_at.elapsed()
        );

        Some(Gesture {
            kind,
            location,
            window_moved,
            selection_stamp: sample.selection_stamp,
        })
    }

    /// Classify a key press; only the select-all shortcut is a gesture
    pub fn key_down(
        &mut self,
        key: Key,
        modifiers: Modifiers,
        pointer: Point,
        env: &EnvSnapshot,
    ) -> Option<Gesture> {
        if key != Key::A || !modifiers.is_exactly(Modifier::select_all()) {
            return None;
        }
        if self.is_ignored(env) || !env.text_context_owned_by_other {
            return None;
        }

        tracing::debug!("Gesture SelectAll");
        Some(Gesture {
            kind: GestureKind::SelectAll,
            location: pointer,
            window_moved: false,
            selection_stamp: None,
        })
    }

    fn is_ignored(&self, env: &EnvSnapshot) -> bool {
        if env.pointer_over_own_ui {
            return true;
        }
        match &env.frontmost {
            Some(app) => {
                app.pid == env.own_pid
                    || self.policy.ignored_apps.contains(&app.app_id.to_lowercase())
            }
            None => false,
        }
    }

    fn is_file_browser(&self, env: &EnvSnapshot) -> bool {
        env.frontmost
            .as_ref()
            .is_some_and(|app| self.policy.file_browser_apps.contains(&app.app_id.to_lowercase()))
    }

    fn modifier_satisfied(&self, modifiers: Modifiers) -> bool {
        self.policy
            .activation_modifier
            .map_or(true, |m| modifiers.contains(m))
    }
}

/// Holds at most one pending delayed job; scheduling replaces it
#[derive(Default)]
pub struct Debouncer {
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` after `delay`, cancelling whatever was pending
    pub fn schedule<F>(&mut self, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        }));
    }

    /// Cancel the pending job; returns whether one was still running
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const OWN_PID: u32 = 1000;

    fn env_for(app_id: &str) -> EnvSnapshot {
        EnvSnapshot {
            frontmost: Some(AppInfo {
                app_id: app_id.to_string(),
                pid: 2000,
            }),
            own_pid: OWN_PID,
            focused_window_origin: Some(Point::new(100.0, 100.0)),
            ..Default::default()
        }
    }

    fn classify(
        classifier: &mut GestureClassifier,
        from: Point,
        to: Point,
        clicks: u32,
        env: &EnvSnapshot,
    ) -> Option<Gesture> {
        classifier.pointer_down(from, clicks, Instant::now(), env);
        classifier.pointer_up(to, clicks, Modifiers::default(), env)
    }

    fn ctrl() -> Modifiers {
        let mut mods = Modifiers::default();
        mods.set(Modifier::select_all(), true);
        mods
    }

    #[test]
    fn test_single_click_below_threshold_never_triggers() {
        let mut classifier = GestureClassifier::new(GesturePolicy::default());
        let env = env_for("gedit");
        let origin = Point::new(500.0, 500.0);

        for step in 0..50 {
            let d = step as f64 * 0.099;
            for (dx, dy) in [(d, 0.0), (0.0, d), (d * 0.6, d * 0.8), (-d, 0.0)] {
                let up = Point::new(origin.x + dx, origin.y + dy);
                assert_eq!(classify(&mut classifier, origin, up, 1, &env), None);
            }
        }
    }

    #[test]
    fn test_drag_and_multi_click() {
        let mut classifier = GestureClassifier::new(GesturePolicy::default());
        let env = env_for("gedit");
        let p = Point::new(10.0, 10.0);

        let drag = classify(&mut classifier, p, Point::new(13.0, 14.0), 1, &env).unwrap();
        assert_eq!(drag.kind, GestureKind::Drag);

        let double = classify(&mut classifier, p, p, 2, &env).unwrap();
        assert_eq!(double.kind, GestureKind::MultiClick);

        // Multi-click wins even with travel
        let triple = classify(&mut classifier, p, Point::new(40.0, 10.0), 3, &env).unwrap();
        assert_eq!(triple.kind, GestureKind::MultiClick);
    }

    #[test]
    fn test_release_without_press_ignored() {
        let mut classifier = GestureClassifier::new(GesturePolicy::default());
        let env = env_for("gedit");
        assert!(classifier
            .pointer_up(Point::new(50.0, 0.0), 1, Modifiers::default(), &env)
            .is_none());
    }

    #[test]
    fn test_ignore_rules() {
        let policy = GesturePolicy {
            ignored_apps: vec!["org.keepassxc.keepassxc".to_string()],
            ..Default::default()
        };
        let mut classifier = GestureClassifier::new(policy);
        let (a, b) = (Point::new(0.0, 0.0), Point::new(50.0, 0.0));

        let ignored = env_for("org.keepassxc.KeePassXC");
        assert!(classify(&mut classifier, a, b, 1, &ignored).is_none());

        let mut own = env_for("hoverbar");
        own.frontmost.as_mut().unwrap().pid = OWN_PID;
        assert!(classify(&mut classifier, a, b, 1, &own).is_none());

        let mut over_bar = env_for("gedit");
        over_bar.pointer_over_own_ui = true;
        assert!(classify(&mut classifier, a, b, 1, &over_bar).is_none());
    }

    #[test]
    fn test_activation_modifier_required() {
        let policy = GesturePolicy {
            activation_modifier: Some(Modifier::Alt),
            ..Default::default()
        };
        let mut classifier = GestureClassifier::new(policy);
        let env = env_for("gedit");
        let (a, b) = (Point::new(0.0, 0.0), Point::new(50.0, 0.0));

        assert!(classify(&mut classifier, a, b, 1, &env).is_none());

        let mut alt = Modifiers::default();
        alt.set(Modifier::Alt, true);
        classifier.pointer_down(a, 1, Instant::now(), &env);
        assert!(classifier.pointer_up(b, 1, alt, &env).is_some());
    }

    #[test]
    fn test_file_browser_multi_click_needs_editable_focus() {
        let policy = GesturePolicy {
            file_browser_apps: vec!["org.gnome.nautilus".to_string()],
            ..Default::default()
        };
        let mut classifier = GestureClassifier::new(policy);
        let p = Point::new(10.0, 10.0);

        let mut env = env_for("org.gnome.Nautilus");
        assert!(classify(&mut classifier, p, p, 2, &env).is_none());

        env.focused_editable = true;
        let renamed = classify(&mut classifier, p, p, 2, &env).unwrap();
        assert_eq!(renamed.kind, GestureKind::MultiClick);
    }

    #[test]
    fn test_window_drag_suppressed_unless_multi_click() {
        let mut classifier = GestureClassifier::new(GesturePolicy::default());
        let before = env_for("gedit");
        let mut after = before.clone();
        after.focused_window_origin = Some(Point::new(140.0, 100.0));
        let (a, b) = (Point::new(110.0, 105.0), Point::new(150.0, 105.0));

        classifier.pointer_down(a, 1, Instant::now(), &before);
        assert!(classifier
            .pointer_up(b, 1, Modifiers::default(), &after)
            .is_none());

        classifier.pointer_down(a, 2, Instant::now(), &before);
        let multi = classifier
            .pointer_up(b, 2, Modifiers::default(), &after)
            .unwrap();
        assert_eq!(multi.kind, GestureKind::MultiClick);
        assert!(multi.window_moved);
    }

    #[test]
    fn test_window_drag_kept_when_not_suppressed() {
        let policy = GesturePolicy {
            suppress_window_drags: false,
            ..Default::default()
        };
        let mut classifier = GestureClassifier::new(policy);
        let before = env_for("gedit");
        let mut after = before.clone();
        after.focused_window_origin = Some(Point::new(100.0, 101.0));

        classifier.pointer_down(Point::new(0.0, 0.0), 1, Instant::now(), &before);
        let drag = classifier
            .pointer_up(Point::new(30.0, 0.0), 1, Modifiers::default(), &after)
            .unwrap();
        assert_eq!(drag.kind, GestureKind::Drag);
        assert!(drag.window_moved);
    }

    #[test]
    fn test_selection_stamp_from_first_press() {
        let mut classifier = GestureClassifier::new(GesturePolicy::default());
        let p = Point::new(10.0, 10.0);
        let mut env = env_for("foot");

        env.selection_stamp = Some(1);
        classifier.pointer_down(p, 1, Instant::now(), &env);
        classifier.pointer_up(p, 1, Modifiers::default(), &env);

        // The app selected the word before the second press was seen
        env.selection_stamp = Some(2);
        classifier.pointer_down(p, 2, Instant::now(), &env);
        let double = classifier
            .pointer_up(p, 2, Modifiers::default(), &env)
            .unwrap();
        assert_eq!(double.selection_stamp, Some(1));

        // A fresh single press starts a new sequence
        env.selection_stamp = Some(3);
        let drag = classify(&mut classifier, p, Point::new(60.0, 10.0), 1, &env).unwrap();
        assert_eq!(drag.selection_stamp, Some(3));
    }

    #[test]
    fn test_select_all_shortcut() {
        let mut classifier = GestureClassifier::new(GesturePolicy::default());
        let mut env = env_for("gedit");
        let p = Point::new(1.0, 2.0);

        // Not a text context
        assert!(classifier.key_down(Key::A, ctrl(), p, &env).is_none());

        env.text_context_owned_by_other = true;
        let gesture = classifier.key_down(Key::A, ctrl(), p, &env).unwrap();
        assert_eq!(gesture.kind, GestureKind::SelectAll);

        let mut extra = ctrl();
        extra.set(Modifier::Shift, true);
        assert!(classifier.key_down(Key::A, extra, p, &env).is_none());
        assert!(classifier
            .key_down(Key::A, Modifiers::default(), p, &env)
            .is_none());
        assert!(classifier.key_down(Key::Escape, ctrl(), p, &env).is_none());
    }

    #[test]
    fn test_debounce_durations() {
        let policy = GesturePolicy::default();
        assert_eq!(policy.debounce_for(GestureKind::Drag), Duration::from_millis(200));
        assert_eq!(
            policy.debounce_for(GestureKind::SelectAll),
            Duration::from_millis(120)
        );
        assert_eq!(policy.debounce_for(GestureKind::Manual), Duration::ZERO);
    }

    #[test]
    fn test_policy_from_config() {
        let config = GestureConfig {
            activation_modifier: Some("ctrl".to_string()),
            ignored_apps: vec!["Foo.Bar".to_string()],
            ..Default::default()
        };
        let policy = GesturePolicy::from_config(&config).unwrap();
        assert_eq!(policy.activation_modifier, Some(Modifier::Ctrl));
        assert_eq!(policy.ignored_apps, vec!["foo.bar".to_string()]);

        let bad = GestureConfig {
            activation_modifier: Some("hyper".to_string()),
            ..Default::default()
        };
        assert!(GesturePolicy::from_config(&bad).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_runs_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new();

        let counter = fired.clone();
        debouncer.schedule(Duration::from_millis(200), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_gesture_cancels_pending_debounce() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new();

        let first = fired.clone();
        debouncer.schedule(Duration::from_millis(200), async move {
            first.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = fired.clone();
        debouncer.schedule(Duration::from_millis(200), async move {
            second.fetch_add(10, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 10);
    }
}
