//! Built-in bar actions
//!
//! Copy, cut, search, lookup and open-as-URL are instant, best-effort OS
//! calls. Translate and speak go through the providers and are driven by
//! the orchestrator instead.

use crate::clipboard::{ClipboardBackend, KeyCombo, KeySynth};
use crate::config::FeatureConfig;
use crate::error::HoverbarError;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinAction {
    Copy,
    Cut,
    Search,
    Lookup,
    Translate,
    Speak,
    OpenUrl,
}

impl BuiltinAction {
    /// Bar order
    pub const ALL: [BuiltinAction; 7] = [
        BuiltinAction::Copy,
        BuiltinAction::Cut,
        BuiltinAction::Search,
        BuiltinAction::Lookup,
        BuiltinAction::Translate,
        BuiltinAction::Speak,
        BuiltinAction::OpenUrl,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            BuiltinAction::Copy => "copy",
            BuiltinAction::Cut => "cut",
            BuiltinAction::Search => "search",
            BuiltinAction::Lookup => "lookup",
            BuiltinAction::Translate => "translate",
            BuiltinAction::Speak => "speak",
            BuiltinAction::OpenUrl => "open_url",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BuiltinAction::Copy => "Copy",
            BuiltinAction::Cut => "Cut",
            BuiltinAction::Search => "Search",
            BuiltinAction::Lookup => "Look Up",
            BuiltinAction::Translate => "Translate",
            BuiltinAction::Speak => "Speak",
            BuiltinAction::OpenUrl => "Open",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.id() == id)
    }

    /// Performed immediately, followed by a dismiss
    pub fn is_instant(&self) -> bool {
        !matches!(self, BuiltinAction::Translate | BuiltinAction::Speak)
    }

    pub fn enabled_in(&self, features: &FeatureConfig) -> bool {
        match self {
            BuiltinAction::Copy => features.copy,
            BuiltinAction::Cut => features.cut,
            BuiltinAction::Search => features.search,
            BuiltinAction::Lookup => features.lookup,
            BuiltinAction::Translate => features.translate,
            BuiltinAction::Speak => features.speak,
            BuiltinAction::OpenUrl => features.open_url,
        }
    }
}

/// OS-level side effects of the instant actions
#[async_trait::async_trait]
pub trait SystemActions: Send + Sync {
    /// Put `text` on the clipboard
    async fn copy(&self, text: &str) -> Result<(), HoverbarError>;

    /// Cut the selection in the focused app
    async fn cut(&self) -> Result<(), HoverbarError>;

    /// Open `url` in the default handler
    async fn open_url(&self, url: &Url) -> Result<(), HoverbarError>;
}

/// Fill a `{query}` URL template; the query is percent-encoded
pub fn query_url(template: &str, query: &str) -> Result<Url, HoverbarError> {
    let encoded = urlencoding::encode(query.trim());
    let filled = if template.contains("{query}") {
        template.replace("{query}", &encoded)
    } else {
        format!("{}{}", template, encoded)
    };
    Url::parse(&filled).map_err(|e| HoverbarError::Config(format!("Bad URL template {:?}: {}", template, e)))
}

/// Interpret a selection as a web address, if it is one
///
/// Accepts `http(s)://...` as is and bare `example.com/path` forms by
/// prefixing `https://`. Anything with inner whitespace is rejected.
pub fn url_from_selection(text: &str) -> Option<Url> {
    let text = text.trim();
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        return None;
    }

    if let Ok(url) = Url::parse(text) {
        return matches!(url.scheme(), "http" | "https").then_some(url);
    }

    let host = text.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    let labels: Vec<&str> = host.split('.').collect();
    let plausible = labels.len() >= 2
        && labels.iter().all(|l| !l.is_empty())
        && labels
            .last()
            .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));
    if !plausible {
        return None;
    }

    Url::parse(&format!("https://{}", text)).ok()
}

/// Perform an instant action on `text`
pub async fn perform_instant(
    system: &dyn SystemActions,
    action: BuiltinAction,
    text: &str,
    features: &FeatureConfig,
) -> Result<(), HoverbarError> {
    match action {
        BuiltinAction::Copy => system.copy(text).await,
        BuiltinAction::Cut => system.cut().await,
        BuiltinAction::Search => system.open_url(&query_url(&features.search_url, text)?).await,
        BuiltinAction::Lookup => system.open_url(&query_url(&features.lookup_url, text)?).await,
        BuiltinAction::OpenUrl => match url_from_selection(text) {
            Some(url) => system.open_url(&url).await,
            None => Err(HoverbarError::Action("selection is not a URL".to_string())),
        },
        BuiltinAction::Translate | BuiltinAction::Speak => Err(HoverbarError::Action(format!(
            "{} is not an instant action",
            action.id()
        ))),
    }
}

/// Desktop implementation: clipboard backend, key synthesis, `xdg-open`/`open`
pub struct DesktopActions {
    clipboard: Arc<dyn ClipboardBackend>,
    keys: Arc<dyn KeySynth>,
    opener: &'static str,
}

impl DesktopActions {
    pub fn new(clipboard: Arc<dyn ClipboardBackend>, keys: Arc<dyn KeySynth>) -> Self {
        let opener = if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        Self {
            clipboard,
            keys,
            opener,
        }
    }
}

#[async_trait::async_trait]
impl SystemActions for DesktopActions {
    async fn copy(&self, text: &str) -> Result<(), HoverbarError> {
        self.clipboard.write_text(text).await?;
        tracing::debug!("Copied {} chars via {}", text.chars().count(), self.clipboard.name());
        Ok(())
    }

    async fn cut(&self) -> Result<(), HoverbarError> {
        self.keys.send(KeyCombo::Cut).await?;
        Ok(())
    }

    async fn open_url(&self, url: &Url) -> Result<(), HoverbarError> {
        tracing::debug!("Opening {} with {}", url, self.opener);

        // The opener may hand off to a long-lived browser; don't wait on it
        Command::new(self.opener)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| HoverbarError::Action(format!("{}: {}", self.opener, e)))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records what would have happened
    #[derive(Default)]
    pub struct RecordingActions {
        pub copied: Mutex<Vec<String>>,
        pub cuts: Mutex<usize>,
        pub opened: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl SystemActions for RecordingActions {
        async fn copy(&self, text: &str) -> Result<(), HoverbarError> {
            self.copied.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn cut(&self) -> Result<(), HoverbarError> {
            *self.cuts.lock().unwrap() += 1;
            Ok(())
        }

        async fn open_url(&self, url: &Url) -> Result<(), HoverbarError> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingActions;
    use super::*;

    #[test]
    fn test_ids_round_trip() {
        for action in BuiltinAction::ALL {
            assert_eq!(BuiltinAction::from_id(action.id()), Some(action));
        }
        assert_eq!(BuiltinAction::from_id("fix-grammar"), None);
        assert!(!BuiltinAction::Translate.is_instant());
        assert!(BuiltinAction::Lookup.is_instant());
    }

    #[test]
    fn test_query_url_encodes() {
        let url = query_url("https://duckduckgo.com/?q={query}", " rust & tokio ").unwrap();
        assert_eq!(url.as_str(), "https://duckduckgo.com/?q=rust%20%26%20tokio");

        let url = query_url("https://en.wiktionary.org/wiki/", "日本").unwrap();
        assert_eq!(
            url.as_str(),
            "https://en.wiktionary.org/wiki/%E6%97%A5%E6%9C%AC"
        );

        assert!(query_url("not a url {query}", "x").is_err());
    }

    #[test]
    fn test_url_from_selection() {
        assert_eq!(
            url_from_selection(" https://example.com/a?b=1 ").map(|u| u.to_string()),
            Some("https://example.com/a?b=1".to_string())
        );
        assert_eq!(
            url_from_selection("docs.rs/tokio").map(|u| u.to_string()),
            Some("https://docs.rs/tokio".to_string())
        );
        assert_eq!(url_from_selection("hello world"), None);
        assert_eq!(url_from_selection("version 1.2"), None);
        assert_eq!(url_from_selection("1.2"), None);
        assert_eq!(url_from_selection("file:///etc/passwd"), None);
        assert_eq!(url_from_selection("javascript:alert(1)"), None);
    }

    #[tokio::test]
    async fn test_perform_instant() {
        let system = RecordingActions::default();
        let features = FeatureConfig::default();

        perform_instant(&system, BuiltinAction::Copy, "hello", &features)
            .await
            .unwrap();
        perform_instant(&system, BuiltinAction::Cut, "hello", &features)
            .await
            .unwrap();
        perform_instant(&system, BuiltinAction::Search, "hello world", &features)
            .await
            .unwrap();
        perform_instant(&system, BuiltinAction::OpenUrl, "example.org", &features)
            .await
            .unwrap();

        assert_eq!(*system.copied.lock().unwrap(), vec!["hello".to_string()]);
        assert_eq!(*system.cuts.lock().unwrap(), 1);
        assert_eq!(
            *system.opened.lock().unwrap(),
            vec![
                "https://duckduckgo.com/?q=hello%20world".to_string(),
                "https://example.org/".to_string()
            ]
        );

        assert!(
            perform_instant(&system, BuiltinAction::OpenUrl, "not a link", &features)
                .await
                .is_err()
        );
        assert!(
            perform_instant(&system, BuiltinAction::Speak, "x", &features)
                .await
                .is_err()
        );
    }
}
