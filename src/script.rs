//! Sandboxed script transforms
//!
//! A custom script action is JavaScript that defines `transform(text)`.
//! Each run gets a fresh boa `Context` (no filesystem, network or host
//! bindings) on its own OS thread, and the result is raced against a timer.
//! Whichever finishes first wins; a losing evaluation keeps running on its
//! thread until the loop-iteration limit stops it, and its result is dropped.

use crate::config::ScriptConfig;
use crate::error::ScriptError;
use boa_engine::{js_string, Context, JsString, JsValue, Script, Source};
use std::time::Duration;
use tokio::sync::oneshot;

/// Default hard limit for one transform
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(800);

/// Runs user scripts with a timeout and a fixed error taxonomy
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    timeout: Duration,
    loop_iteration_limit: u64,
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            loop_iteration_limit: 50_000_000,
        }
    }
}

impl ScriptRunner {
    pub fn new(timeout: Duration, loop_iteration_limit: u64) -> Self {
        Self {
            timeout,
            loop_iteration_limit,
        }
    }

    pub fn from_config(config: &ScriptConfig) -> Self {
        Self::new(
            Duration::from_millis(config.timeout_ms),
            config.loop_iteration_limit,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run with the configured timeout
    pub async fn run_default(&self, script: &str, input: &str) -> Result<String, ScriptError> {
        self.run(script, input, self.timeout).await
    }

    /// Evaluate `script` and return `transform(input)`.
    ///
    /// Never blocks the caller for longer than `timeout`.
    pub async fn run(
        &self,
        script: &str,
        input: &str,
        timeout: Duration,
    ) -> Result<String, ScriptError> {
        if script.trim().is_empty() {
            return Err(ScriptError::MissingScript);
        }

        let (tx, rx) = oneshot::channel();
        let source = script.to_string();
        let input = input.to_string();
        let limit = self.loop_iteration_limit;

        std::thread::Builder::new()
            .name("hoverbar-script".to_string())
            .spawn(move || {
                // Receiver is gone when the timer already won
                let _ = tx.send(evaluate(&source, &input, limit));
            })
            .map_err(|e| ScriptError::RuntimeError(format!("failed to start script: {}", e)))?;

        tokio::select! {
            result = rx => result.unwrap_or_else(|_| {
                Err(ScriptError::RuntimeError("script worker exited".to_string()))
            }),
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!("Script exceeded {:?}, abandoning it", timeout);
                Err(ScriptError::Timeout)
            }
        }
    }
}

fn runtime(e: impl std::fmt::Display) -> ScriptError {
    ScriptError::RuntimeError(e.to_string())
}

/// Synchronous evaluation in a fresh context
fn evaluate(source: &str, input: &str, loop_limit: u64) -> Result<String, ScriptError> {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(loop_limit);

    let script = Script::parse(Source::from_bytes(source), None, &mut context)
        .map_err(|e| ScriptError::SyntaxError(e.to_string()))?;
    script.evaluate(&mut context).map_err(runtime)?;

    // Covers `function transform`, `var`, and top-level `let`/`const` bindings
    let transform = context
        .eval(Source::from_bytes(
            "typeof transform === 'undefined' ? undefined : transform",
        ))
        .map_err(runtime)?;

    let Some(function) = transform.as_callable() else {
        return Err(ScriptError::MissingTransform);
    };

    let arity = function
        .get(js_string!("length"), &mut context)
        .map_err(runtime)?
        .as_number()
        .unwrap_or(0.0);
    if arity != 1.0 {
        return Err(ScriptError::MissingTransform);
    }

    let result = function
        .call(
            &JsValue::undefined(),
            &[JsValue::from(JsString::from(input))],
            &mut context,
        )
        .map_err(runtime)?;

    match result.as_string() {
        Some(text) => Ok(text.to_std_string_escaped()),
        None => Err(ScriptError::InvalidReturnType),
    }
}
