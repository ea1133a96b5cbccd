//! Configuration loading and types for hoverbar
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/hoverbar/config.toml)
//! 3. Environment variables (HOVERBAR_*)
//! 4. CLI arguments (highest priority)

use crate::error::HoverbarError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Hoverbar Configuration
#
# Location: ~/.config/hoverbar/config.toml
# All settings can be overridden via CLI flags

# State file for external integrations (Waybar, overlay scripts, etc.)
# Use "auto" for default location ($XDG_RUNTIME_DIR/hoverbar/state),
# a custom path, or "disabled" to turn off. The daemon writes the current
# bar state as JSON whenever it changes.
state_file = "auto"

[gesture]
# Minimum pointer travel (in pixels) for a press/release to count as a drag
drag_threshold_px = 5.0

# Optional modifier that must be held for a gesture to count
# One of: "shift", "ctrl", "alt", "meta"
# activation_modifier = "alt"

# Apps (window class / bundle id, case-insensitive) that never trigger the bar
ignored_apps = ["org.keepassxc.KeePassXC", "1password"]

# File browsers: double-click there opens files, so it only counts when
# the focused element is an editable field (e.g. renaming a file)
file_browser_apps = ["org.gnome.Nautilus", "dolphin", "nemo", "thunar", "com.apple.finder"]

# Settle delay before resolving the selection
mouse_debounce_ms = 200
select_all_debounce_ms = 120

# A drag during which the focused window moved is a window drag, not a
# text selection. Set to false to still probe those (without the
# clipboard fallback).
suppress_window_drags = true

[selection]
# Minimum selected characters for drag gestures
# (double-click / select-all need 2, CJK text needs 1)
min_length = 3

# Fall back to a synthesized copy when the accessibility probe finds nothing
clipboard_fallback = true

# Terminal emulators: Ctrl+C interrupts the running program there, so the
# fallback copies with Ctrl+Shift+C instead
terminal_apps = ["foot", "kitty", "Alacritty", "org.wezfurlong.wezterm", "com.mitchellh.ghostty", "org.gnome.Terminal", "gnome-terminal-server", "org.gnome.Ptyxis", "org.kde.konsole", "konsole", "com.gexperts.Tilix"]

# Clipboard change polling after the synthesized copy
poll_attempts = 5
poll_interval_ms = 100

[bar]
# Hide the bar when nothing happens for this long
auto_dismiss_secs = 10

# How long a failed action flashes its error state
error_flash_ms = 2000

[bar.features]
copy = true
cut = true
search = true
lookup = true
translate = true
speak = true
open_url = true
search_url = "https://duckduckgo.com/?q={query}"

[script]
# Hard limit for user script transforms
timeout_ms = 800

[provider]
# Any OpenAI-compatible endpoint (OpenAI, Ollama, llama.cpp server, ...)
endpoint = "https://api.openai.com/v1"
model = "gpt-4o-mini"
# Environment variable holding the API key
api_key_env = "OPENAI_API_KEY"
translate_target = "English"
tts_model = "tts-1"
tts_voice = "alloy"

[service]
# Local HTTP bridge used by the bar overlay window
enabled = true
host = "127.0.0.1"
port = 7519

# Custom actions
#
# [[actions]]
# id = "fix-grammar"
# label = "Fix grammar"
# kind = "llm"
# prompt = "Fix the grammar of the following text. Reply with the text only:\n\n{text}"
#
# [[actions]]
# id = "upper"
# label = "UPPERCASE"
# kind = "script"
# script = "function transform(text) { return text.toUpperCase(); }"
# output = "in_place"
"#;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Optional path to state file for external integrations
    /// "auto" resolves to $XDG_RUNTIME_DIR/hoverbar/state
    #[serde(default)]
    pub state_file: Option<String>,

    #[serde(default)]
    pub gesture: GestureConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub bar: BarConfig,

    #[serde(default)]
    pub script: ScriptConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    /// User-defined actions shown after the built-in ones
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

/// Gesture classification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GestureConfig {
    /// Enable built-in global input monitoring (default: true)
    /// When disabled, only `hoverbar trigger` opens the bar
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_drag_threshold")]
    pub drag_threshold_px: f64,

    /// Modifier that must be held: "shift", "ctrl", "alt" or "meta"
    #[serde(default)]
    pub activation_modifier: Option<String>,

    /// Also treated as secure input (no synthesized copy or paste)
    #[serde(default = "default_ignored_apps")]
    pub ignored_apps: Vec<String>,

    #[serde(default = "default_file_browsers")]
    pub file_browser_apps: Vec<String>,

    #[serde(default = "default_mouse_debounce")]
    pub mouse_debounce_ms: u64,

    #[serde(default = "default_select_all_debounce")]
    pub select_all_debounce_ms: u64,

    /// Max interval between presses that still counts as a multi-click
    #[serde(default = "default_double_click")]
    pub double_click_ms: u64,

    /// Drop drags during which the focused window moved (window drags).
    /// When false they are kept but resolved through the probe only.
    #[serde(default = "default_true")]
    pub suppress_window_drags: bool,
}

/// Selection resolution configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionConfig {
    /// Minimum length for drag selections
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Max ancestors walked looking for a selected-text attribute
    #[serde(default = "default_probe_depth")]
    pub probe_depth: usize,

    #[serde(default = "default_true")]
    pub clipboard_fallback: bool,

    /// Apps where the synthesized copy uses Ctrl+Shift+C
    #[serde(default = "default_terminal_apps")]
    pub terminal_apps: Vec<String>,

    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Delay between a synthesized paste and the clipboard restore
    #[serde(default = "default_paste_settle")]
    pub paste_settle_ms: u64,
}

/// Floating bar behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BarConfig {
    #[serde(default = "default_auto_dismiss")]
    pub auto_dismiss_secs: u64,

    #[serde(default = "default_error_flash")]
    pub error_flash_ms: u64,

    #[serde(default)]
    pub features: FeatureConfig,
}

/// Built-in action toggles
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureConfig {
    #[serde(default = "default_true")]
    pub copy: bool,
    #[serde(default = "default_true")]
    pub cut: bool,
    #[serde(default = "default_true")]
    pub search: bool,
    #[serde(default = "default_true")]
    pub lookup: bool,
    #[serde(default = "default_true")]
    pub translate: bool,
    #[serde(default = "default_true")]
    pub speak: bool,
    #[serde(default = "default_true")]
    pub open_url: bool,

    /// Search URL template, `{query}` is replaced by the encoded selection
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Dictionary lookup URL template
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,
}

/// Sandboxed script configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptConfig {
    #[serde(default = "default_script_timeout")]
    pub timeout_ms: u64,

    /// Upper bound on loop iterations, so abandoned scripts eventually stop
    #[serde(default = "default_loop_limit")]
    pub loop_iteration_limit: u64,
}

/// OpenAI-compatible provider configuration (LLM, translation, speech)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Inline API key (prefer `api_key_env`)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Target language for the translate action
    #[serde(default = "default_translate_target")]
    pub translate_target: String,

    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

/// Local bar bridge service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_service_host")]
    pub host: String,

    #[serde(default = "default_service_port")]
    pub port: u16,
}

/// A user-defined action
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ActionConfig {
    pub id: String,

    pub label: String,

    #[serde(flatten)]
    pub kind: ActionKind,

    #[serde(default)]
    pub output: ActionOutput,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ask for confirmation before the selection is sent to the provider
    #[serde(default)]
    pub confirm_before_send: bool,
}

/// What a custom action runs
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    /// Prompt template sent to the LLM, `{text}` is replaced by the selection
    Llm { prompt: String },
    /// JavaScript defining `transform(text)`
    Script { script: String },
}

/// Where a custom action's result goes
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutput {
    /// Show the result in the bar with copy / apply / discard
    #[default]
    ResultWindow,
    /// Replace the selection directly when the target is editable
    InPlace,
}

fn default_true() -> bool {
    true
}

fn default_drag_threshold() -> f64 {
    5.0
}

fn default_ignored_apps() -> Vec<String> {
    ["org.keepassxc.KeePassXC", "1password"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_terminal_apps() -> Vec<String> {
    [
        "foot",
        "kitty",
        "Alacritty",
        "org.wezfurlong.wezterm",
        "com.mitchellh.ghostty",
        "org.gnome.Terminal",
        "gnome-terminal-server",
        "org.gnome.Ptyxis",
        "org.kde.konsole",
        "konsole",
        "com.gexperts.Tilix",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_file_browsers() -> Vec<String> {
    ["org.gnome.Nautilus", "dolphin", "nemo", "thunar", "com.apple.finder"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_mouse_debounce() -> u64 {
    200
}

fn default_select_all_debounce() -> u64 {
    120
}

fn default_double_click() -> u64 {
    500
}

fn default_min_length() -> usize {
    3
}

fn default_probe_depth() -> usize {
    8
}

fn default_poll_attempts() -> u32 {
    5
}

fn default_poll_interval() -> u64 {
    100
}

fn default_paste_settle() -> u64 {
    150
}

fn default_auto_dismiss() -> u64 {
    10
}

fn default_error_flash() -> u64 {
    2000
}

fn default_search_url() -> String {
    "https://duckduckgo.com/?q={query}".to_string()
}

fn default_lookup_url() -> String {
    "https://en.wiktionary.org/wiki/{query}".to_string()
}

fn default_script_timeout() -> u64 {
    800
}

fn default_loop_limit() -> u64 {
    50_000_000
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_translate_target() -> String {
    "English".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "alloy".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_service_host() -> String {
    "127.0.0.1".to_string()
}

fn default_service_port() -> u16 {
    7519
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            drag_threshold_px: default_drag_threshold(),
            activation_modifier: None,
            ignored_apps: default_ignored_apps(),
            file_browser_apps: default_file_browsers(),
            mouse_debounce_ms: default_mouse_debounce(),
            select_all_debounce_ms: default_select_all_debounce(),
            double_click_ms: default_double_click(),
            suppress_window_drags: true,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            probe_depth: default_probe_depth(),
            clipboard_fallback: true,
            terminal_apps: default_terminal_apps(),
            poll_attempts: default_poll_attempts(),
            poll_interval_ms: default_poll_interval(),
            paste_settle_ms: default_paste_settle(),
        }
    }
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            auto_dismiss_secs: default_auto_dismiss(),
            error_flash_ms: default_error_flash(),
            features: FeatureConfig::default(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            copy: true,
            cut: true,
            search: true,
            lookup: true,
            translate: true,
            speak: true,
            open_url: true,
            search_url: default_search_url(),
            lookup_url: default_lookup_url(),
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_script_timeout(),
            loop_iteration_limit: default_loop_limit(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
            translate_target: default_translate_target(),
            tts_model: default_tts_model(),
            tts_voice: default_tts_voice(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_service_host(),
            port: default_service_port(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_file: Some("auto".to_string()),
            gesture: GestureConfig::default(),
            selection: SelectionConfig::default(),
            bar: BarConfig::default(),
            script: ScriptConfig::default(),
            provider: ProviderConfig::default(),
            service: ServiceConfig::default(),
            actions: Vec::new(),
        }
    }
}

impl ProviderConfig {
    /// Resolve the API key from the inline value or the configured env var
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }

    /// Local endpoints (Ollama, llama.cpp) work without a key
    pub fn is_local(&self) -> bool {
        self.endpoint.contains("localhost")
            || self.endpoint.contains("127.0.0.1")
            || self.endpoint.contains("[::1]")
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "hoverbar")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the runtime directory for ephemeral files (state, pid)
    pub fn runtime_dir() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, otherwise fall back to /tmp
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
            .join("hoverbar")
    }

    /// Resolve the state file path from config
    /// Returns None if state_file is not configured or explicitly disabled
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file.as_ref().and_then(|path| {
            match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(PathBuf::from(path)),
            }
        })
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "hoverbar")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Look up a custom action by id
    pub fn action(&self, id: &str) -> Option<&ActionConfig> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Check the parts serde can't: unique action ids, sane limits
    pub fn validate(&self) -> Result<(), HoverbarError> {
        let mut seen = std::collections::HashSet::new();
        for action in &self.actions {
            if action.id.trim().is_empty() {
                return Err(HoverbarError::Config(format!(
                    "Action '{}' has an empty id",
                    action.label
                )));
            }
            if crate::actions::BuiltinAction::from_id(&action.id).is_some() {
                return Err(HoverbarError::Config(format!(
                    "Action id '{}' is reserved for a built-in action",
                    action.id
                )));
            }
            if !seen.insert(action.id.as_str()) {
                return Err(HoverbarError::Config(format!(
                    "Duplicate action id '{}'",
                    action.id
                )));
            }
        }

        if self.gesture.drag_threshold_px <= 0.0 {
            return Err(HoverbarError::Config(
                "gesture.drag_threshold_px must be positive".to_string(),
            ));
        }

        if let Some(modifier) = &self.gesture.activation_modifier {
            modifier.parse::<crate::input::Modifier>()?;
        }

        if self.script.timeout_ms == 0 {
            return Err(HoverbarError::Config(
                "script.timeout_ms must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, HoverbarError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| HoverbarError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| HoverbarError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    config.validate()?;
    Ok(config)
}

/// Override from environment variables
fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(endpoint) = var("HOVERBAR_ENDPOINT") {
        config.provider.endpoint = endpoint;
    }
    if let Some(model) = var("HOVERBAR_MODEL") {
        config.provider.model = model;
    }
    if let Some(target) = var("HOVERBAR_TRANSLATE_TARGET") {
        config.provider.translate_target = target;
    }
    if let Some(threshold) = var("HOVERBAR_DRAG_THRESHOLD") {
        match threshold.parse::<f64>() {
            Ok(px) => config.gesture.drag_threshold_px = px,
            Err(_) => tracing::warn!("Ignoring invalid HOVERBAR_DRAG_THRESHOLD={:?}", threshold),
        }
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<(), HoverbarError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| HoverbarError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| HoverbarError::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, contents)
        .map_err(|e| HoverbarError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gesture.drag_threshold_px, 5.0);
        assert_eq!(config.gesture.mouse_debounce_ms, 200);
        assert_eq!(config.gesture.select_all_debounce_ms, 120);
        assert_eq!(config.selection.min_length, 3);
        assert_eq!(config.selection.probe_depth, 8);
        assert_eq!(config.bar.auto_dismiss_secs, 10);
        assert_eq!(config.bar.error_flash_ms, 2000);
        assert_eq!(config.script.timeout_ms, 800);
        assert!(config.actions.is_empty());
    }

    #[test]
    fn test_defaults_match_template() {
        let template: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        let defaults = Config::default();
        assert_eq!(defaults.gesture.ignored_apps, template.gesture.ignored_apps);
        assert_eq!(defaults.gesture.file_browser_apps, template.gesture.file_browser_apps);
        assert_eq!(defaults.selection.terminal_apps, template.selection.terminal_apps);

        // An empty file still gets the password-manager exclusion
        let empty: Config = toml::from_str("").unwrap();
        assert!(empty
            .gesture
            .ignored_apps
            .contains(&"org.keepassxc.KeePassXC".to_string()));
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.gesture.ignored_apps.len(), 2);
        assert!(config.bar.features.translate);
        assert_eq!(config.service.port, 7519);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_custom_actions() {
        let toml_str = r#"
            [[actions]]
            id = "fix"
            label = "Fix grammar"
            kind = "llm"
            prompt = "Fix: {text}"
            confirm_before_send = true

            [[actions]]
            id = "upper"
            label = "UPPER"
            kind = "script"
            script = "function transform(t) { return t.toUpperCase(); }"
            output = "in_place"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.actions.len(), 2);

        let fix = config.action("fix").unwrap();
        assert_eq!(
            fix.kind,
            ActionKind::Llm {
                prompt: "Fix: {text}".to_string()
            }
        );
        assert_eq!(fix.output, ActionOutput::ResultWindow);
        assert!(fix.enabled);
        assert!(fix.confirm_before_send);

        let upper = config.action("upper").unwrap();
        assert!(matches!(upper.kind, ActionKind::Script { .. }));
        assert_eq!(upper.output, ActionOutput::InPlace);
    }

    #[test]
    fn test_duplicate_action_ids_rejected() {
        let toml_str = r#"
            [[actions]]
            id = "a"
            label = "One"
            kind = "llm"
            prompt = "{text}"

            [[actions]]
            id = "a"
            label = "Two"
            kind = "llm"
            prompt = "{text}"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate action id 'a'"));
    }

    #[test]
    fn test_builtin_action_id_reserved() {
        let toml_str = r#"
            [[actions]]
            id = "translate"
            label = "My translate"
            kind = "llm"
            prompt = "{text}"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("reserved"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| match key {
            "HOVERBAR_MODEL" => Some("llama3.2".to_string()),
            "HOVERBAR_DRAG_THRESHOLD" => Some("12".to_string()),
            _ => None,
        });
        assert_eq!(config.provider.model, "llama3.2");
        assert_eq!(config.gesture.drag_threshold_px, 12.0);
    }

    #[test]
    fn test_invalid_env_threshold_is_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| {
            (key == "HOVERBAR_DRAG_THRESHOLD").then(|| "far".to_string())
        });
        assert_eq!(config.gesture.drag_threshold_px, 5.0);
    }

    #[test]
    fn test_load_and_save_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.gesture.activation_modifier = Some("alt".to_string());
        save_config(&config, &path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.gesture.activation_modifier.as_deref(), Some("alt"));
    }

    #[test]
    fn test_state_file_resolution() {
        let mut config = Config::default();
        config.state_file = Some("disabled".to_string());
        assert!(config.resolve_state_file().is_none());

        config.state_file = Some("/tmp/custom-state".to_string());
        assert_eq!(
            config.resolve_state_file(),
            Some(PathBuf::from("/tmp/custom-state"))
        );
    }

    #[test]
    fn test_local_provider_detection() {
        let provider = ProviderConfig {
            endpoint: "http://localhost:11434/v1".to_string(),
            ..Default::default()
        };
        assert!(provider.is_local());
        assert!(!ProviderConfig::default().is_local());
    }

    #[test]
    fn test_unknown_activation_modifier_rejected() {
        let mut config = Config::default();
        config.gesture.activation_modifier = Some("hyper".to_string());
        assert!(matches!(
            config.validate(),
            Err(HoverbarError::Input(crate::error::InputError::UnknownModifier(_)))
        ));
    }
}
