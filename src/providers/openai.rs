//! OpenAI-compatible HTTP provider
//!
//! One client covers all three network collaborators:
//! - LLM actions: `POST {endpoint}/chat/completions`
//! - translation: the same chat endpoint with a translation system prompt
//! - speech: `POST {endpoint}/audio/speech`, returning encoded audio bytes
//!
//! ureq is blocking, so every request runs on `spawn_blocking`. Works with
//! OpenAI, Ollama (`http://localhost:11434/v1`), llama.cpp server and similar.

use super::{LlmClient, SpeechSynthesizer, Translator};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::time::Duration;

/// Speech responses larger than this are refused
const MAX_AUDIO_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    /// Base URL, e.g. "https://api.openai.com/v1"
    endpoint: String,
    model: String,
    tts_model: String,
    tts_voice: String,
    api_key: Option<String>,
    /// Env var name, for error messages only
    api_key_env: String,
    local: bool,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

impl OpenAiCompatible {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();

        if endpoint.starts_with("http://") && !config.is_local() {
            tracing::warn!(
                "Provider endpoint uses HTTP without TLS. Selected text will be transmitted unencrypted!"
            );
        }

        Self {
            endpoint,
            model: config.model.clone(),
            tts_model: config.tts_model.clone(),
            tts_voice: config.tts_voice.clone(),
            api_key: config.api_key(),
            api_key_env: config.api_key_env.clone(),
            local: config.is_local(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn check_credentials(&self) -> Result<(), ProviderError> {
        if self.api_key.is_none() && !self.local {
            return Err(ProviderError::Unavailable(format!(
                "no API key (set ${})",
                self.api_key_env
            )));
        }
        Ok(())
    }

    fn request(&self, url: &str) -> ureq::Request {
        let mut request = ureq::post(url)
            .timeout(self.timeout)
            .set("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }
        request
    }

    /// Blocking chat completion
    fn chat_blocking(&self, system: Option<&str>, user: &str) -> Result<String, ProviderError> {
        self.check_credentials()?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: 0.2,
        };

        let url = self.url("/chat/completions");
        tracing::debug!("POST {} (model {})", url, self.model);

        let response = self
            .request(&url)
            .send_json(&body)
            .map_err(map_ureq_error)?;
        let parsed: ChatResponse = response
            .into_json()
            .map_err(|e| ProviderError::Transport(format!("Failed to parse response: {}", e)))?;

        extract_chat_text(parsed)
    }

    fn speech_blocking(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
        self.check_credentials()?;

        let body = SpeechRequest {
            model: &self.tts_model,
            voice: &self.tts_voice,
            input: text,
            response_format: "mp3",
        };

        let url = self.url("/audio/speech");
        tracing::debug!("POST {} (voice {})", url, self.tts_voice);

        let response = self
            .request(&url)
            .send_json(&body)
            .map_err(map_ureq_error)?;

        let mut audio = Vec::new();
        response
            .into_reader()
            .take(MAX_AUDIO_BYTES)
            .read_to_end(&mut audio)
            .map_err(|e| ProviderError::Transport(format!("Failed to read audio: {}", e)))?;

        if audio.is_empty() {
            return Err(ProviderError::EmptyResult);
        }
        Ok(audio)
    }

    async fn chat(&self, system: Option<String>, user: String) -> Result<String, ProviderError> {
        let client = self.clone();
        tokio::task::spawn_blocking(move || client.chat_blocking(system.as_deref(), &user))
            .await
            .map_err(|e| ProviderError::Transport(format!("Request task failed: {}", e)))?
    }
}

fn translation_prompt(target_lang: &str) -> String {
    format!(
        "Translate the user's text into {}. Reply with the translation only, \
         keeping formatting and line breaks. If it is already in {}, return it unchanged.",
        target_lang, target_lang
    )
}

fn extract_chat_text(response: ChatResponse) -> Result<String, ProviderError> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    if text.is_empty() {
        Err(ProviderError::EmptyResult)
    } else {
        Ok(text)
    }
}

fn map_ureq_error(e: ureq::Error) -> ProviderError {
    match e {
        ureq::Error::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            tracing::warn!("Provider returned {}", status);
            ProviderError::Http { status, body }
        }
        ureq::Error::Transport(t) => ProviderError::Transport(format!("Request failed: {}", t)),
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiCompatible {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.chat(None, prompt.to_string()).await
    }
}

#[async_trait::async_trait]
impl Translator for OpenAiCompatible {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError> {
        self.chat(Some(translation_prompt(target_lang)), text.to_string())
            .await
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for OpenAiCompatible {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
        let client = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || client.speech_blocking(&text))
            .await
            .map_err(|e| ProviderError::Transport(format!("Request task failed: {}", e)))?
    }
}
