//! External providers: LLM, translation, speech, playback, settings
//!
//! The orchestrator only sees these traits. Implementations:
//! - `openai`: any OpenAI-compatible HTTP endpoint (chat completions for LLM
//!   actions and translation, `/audio/speech` for speech)
//! - `playback`: rodio output on a dedicated thread

pub mod openai;
pub mod playback;

use crate::config::{ActionConfig, Config, FeatureConfig};
use crate::error::ProviderError;
use std::time::Duration;

/// Completes a prompt with an LLM
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Translates text into a target language
#[async_trait::async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError>;
}

/// Turns text into encoded audio
#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Plays encoded audio
#[async_trait::async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Resolves when playback finishes or is stopped
    async fn play(&self, audio: Vec<u8>) -> Result<(), ProviderError>;

    /// Stop whatever is playing
    fn stop(&self);
}

/// Which provider a button depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Llm,
    Translation,
    Speech,
}

/// Read-only view of user settings. Never exposes secret material.
pub trait SettingsProvider: Send + Sync {
    fn features(&self) -> FeatureConfig;

    fn custom_actions(&self) -> Vec<ActionConfig>;

    fn translate_target(&self) -> String;

    /// Whether the provider behind `kind` has what it needs (key or local endpoint)
    fn has_credentials(&self, kind: ProviderKind) -> bool;

    fn auto_dismiss(&self) -> Duration;

    fn error_flash(&self) -> Duration;
}

/// [`SettingsProvider`] over a loaded [`Config`]
pub struct ConfigSettings {
    config: Config,
    has_key: bool,
}

impl ConfigSettings {
    pub fn new(config: Config) -> Self {
        let has_key = config.provider.api_key().is_some() || config.provider.is_local();
        if !has_key {
            tracing::warn!(
                "No API key in ${} and endpoint is not local; LLM, translate and speak are disabled",
                config.provider.api_key_env
            );
        }
        Self { config, has_key }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl SettingsProvider for ConfigSettings {
    fn features(&self) -> FeatureConfig {
        self.config.bar.features.clone()
    }

    fn custom_actions(&self) -> Vec<ActionConfig> {
        self.config.actions.clone()
    }

    fn translate_target(&self) -> String {
        self.config.provider.translate_target.clone()
    }

    fn has_credentials(&self, _kind: ProviderKind) -> bool {
        self.has_key
    }

    fn auto_dismiss(&self) -> Duration {
        Duration::from_secs(self.config.bar.auto_dismiss_secs)
    }

    fn error_flash(&self) -> Duration {
        Duration::from_millis(self.config.bar.error_flash_ms)
    }
}

/// Fill a prompt template; without a `{text}` placeholder the text is appended
pub fn render_prompt(template: &str, text: &str) -> String {
    if template.contains("{text}") {
        template.replace("{text}", text)
    } else {
        format!("{}\n\n{}", template.trim_end(), text)
    }
}
