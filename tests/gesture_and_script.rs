//! Classifier thresholds and script runner limits through the public API

use hoverbar::config::GestureConfig;
use hoverbar::error::ScriptError;
use hoverbar::gesture::{EnvSnapshot, GestureClassifier, GestureKind, GesturePolicy};
use hoverbar::input::{Modifiers, Point};
use hoverbar::script::ScriptRunner;
use std::time::{Duration, Instant};

fn classifier() -> GestureClassifier {
    GestureClassifier::new(GesturePolicy::from_config(&GestureConfig::default()).unwrap())
}

fn release_after_move(classifier: &mut GestureClassifier, dx: f64, dy: f64, clicks: u32) -> Option<GestureKind> {
    let env = EnvSnapshot::default();
    let down = Point::new(500.0, 500.0);
    classifier.pointer_down(down, clicks, Instant::now(), &env);
    classifier
        .pointer_up(
            Point::new(down.x + dx, down.y + dy),
            clicks,
            Modifiers::default(),
            &env,
        )
        .map(|g| g.kind)
}

#[test]
fn single_clicks_below_threshold_never_fire() {
    let mut c = classifier();
    for step in 0..50 {
        let distance = step as f64 * 0.099;
        for (dx, dy) in [(distance, 0.0), (0.0, -distance), (distance * 0.6, distance * 0.8)] {
            assert_eq!(release_after_move(&mut c, dx, dy, 1), None, "moved ({}, {})", dx, dy);
        }
    }
}

#[test]
fn drags_at_or_past_threshold_fire() {
    let mut c = classifier();
    assert_eq!(release_after_move(&mut c, 5.0, 0.0, 1), Some(GestureKind::Drag));
    assert_eq!(release_after_move(&mut c, 3.0, 4.0, 1), Some(GestureKind::Drag));
    assert_eq!(release_after_move(&mut c, -120.0, 30.0, 1), Some(GestureKind::Drag));
}

#[test]
fn multi_click_fires_without_movement() {
    let mut c = classifier();
    assert_eq!(release_after_move(&mut c, 0.0, 0.0, 2), Some(GestureKind::MultiClick));
    assert_eq!(release_after_move(&mut c, 1.0, 1.0, 3), Some(GestureKind::MultiClick));
}

#[test]
fn release_without_press_is_ignored() {
    let mut c = classifier();
    let gesture = c.pointer_up(
        Point::new(10.0, 10.0),
        1,
        Modifiers::default(),
        &EnvSnapshot::default(),
    );
    assert!(gesture.is_none());
}

#[tokio::test]
async fn runaway_script_times_out_promptly() {
    let runner = ScriptRunner::new(Duration::from_millis(150), 500_000_000);
    let started = Instant::now();

    let result = runner
        .run("function transform(t) { while (true) {} }", "x", runner.timeout())
        .await;

    assert_eq!(result, Err(ScriptError::Timeout));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn script_error_taxonomy() {
    let runner = ScriptRunner::default();

    assert_eq!(
        runner.run_default("", "x").await,
        Err(ScriptError::MissingScript)
    );
    assert_eq!(
        runner.run_default("let x = 1;", "x").await,
        Err(ScriptError::MissingTransform)
    );
    assert_eq!(
        runner.run_default("function transform(t) { return 42; }", "x").await,
        Err(ScriptError::InvalidReturnType)
    );
    assert!(matches!(
        runner.run_default("function transform(t) {", "x").await,
        Err(ScriptError::SyntaxError(_))
    ));
    assert!(matches!(
        runner
            .run_default("function transform(t) { throw new Error('nope'); }", "x")
            .await,
        Err(ScriptError::RuntimeError(_))
    ));
    assert_eq!(
        runner
            .run_default("const transform = (t) => t.toUpperCase();", "quiet")
            .await,
        Ok("QUIET".to_string())
    );
}
