//! Desktop accessibility tree for Wayland compositors
//!
//! Linux has no accessibility tree we can rely on across toolkits, so this
//! backend works at window granularity:
//! - Hyprland: `hyprctl activewindow -j`, `hyprctl clients -j`, `hyprctl cursorpos -j`
//! - Sway: `swaymsg -t get_tree`
//!
//! Each window is one element (no parents). The focused window's selected
//! text is the primary selection (`wl-paste --primary`, falling back to
//! `xclip -selection primary -o`). The primary selection outlives the
//! selection that set it, so a fingerprint of it is exposed as the selection
//! stamp and only read when a press or a resolution needs it. Windows are
//! never reported as editable, so select-all and in-place output stay off on
//! this backend.
//!
//! Wayland has no secure-input flag; windows of the configured secure apps
//! (password managers) count as secure input instead.

use super::{AccessibilityTree, AppInfo, ElementInfo, ElementRef, Role};
use crate::input::Point;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Max time for one compositor / clipboard query
const QUERY_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    Hyprland,
    Sway,
}

impl Compositor {
    /// Detect the running compositor from its IPC environment variables
    pub fn detect() -> Option<Self> {
        if std::env::var_os("HYPRLAND_INSTANCE_SIGNATURE").is_some() {
            Some(Compositor::Hyprland)
        } else if std::env::var_os("SWAYSOCK").is_some() {
            Some(Compositor::Sway)
        } else {
            None
        }
    }

    fn tool(&self) -> &'static str {
        match self {
            Compositor::Hyprland => "hyprctl",
            Compositor::Sway => "swaymsg",
        }
    }
}

/// A toplevel window as reported by the compositor
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub id: u64,
    pub app_id: String,
    pub pid: u32,
    pub origin: Point,
    pub size: (f64, f64),
    pub focused: bool,
}

impl Window {
    fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.y >= self.origin.y
            && point.x < self.origin.x + self.size.0
            && point.y < self.origin.y + self.size.1
    }
}

/// Window-level tree backed by compositor IPC
pub struct DesktopTree {
    compositor: Option<Compositor>,
    /// Lowercased app ids treated as secure input
    secure_apps: Vec<String>,
}

impl DesktopTree {
    pub fn new() -> Self {
        Self::with_compositor(Compositor::detect())
    }

    pub fn with_compositor(compositor: Option<Compositor>) -> Self {
        if compositor.is_none() {
            tracing::warn!(
                "No supported compositor detected (Hyprland or Sway); selection probing disabled"
            );
        }
        Self {
            compositor,
            secure_apps: Vec::new(),
        }
    }

    /// Treat focused windows of `apps` (case-insensitive) as secure input
    pub fn with_secure_apps(mut self, apps: &[String]) -> Self {
        self.secure_apps = apps.iter().map(|a| a.to_lowercase()).collect();
        self
    }

    async fn windows(&self) -> Vec<Window> {
        match self.compositor {
            Some(Compositor::Hyprland) => run_json("hyprctl", &["clients", "-j"])
                .await
                .and_then(|v| v.as_array().cloned())
                .map(|clients| clients.iter().filter_map(parse_hypr_client).collect())
                .unwrap_or_default(),
            Some(Compositor::Sway) => run_json("swaymsg", &["-t", "get_tree"])
                .await
                .map(|tree| {
                    let mut found = Vec::new();
                    collect_sway_windows(&tree, &mut found);
                    found
                })
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    async fn focused_window(&self) -> Option<Window> {
        match self.compositor? {
            Compositor::Hyprland => {
                let active = run_json("hyprctl", &["activewindow", "-j"]).await?;
                parse_hypr_client(&active).map(|w| Window { focused: true, ..w })
            }
            Compositor::Sway => self.windows().await.into_iter().find(|w| w.focused),
        }
    }
}

impl Default for DesktopTree {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AccessibilityTree for DesktopTree {
    async fn is_trusted(&self, prompt: bool) -> bool {
        let Some(compositor) = self.compositor else {
            return false;
        };
        let has_ipc = which::which(compositor.tool()).is_ok();
        let has_selection =
            which::which("wl-paste").is_ok() || which::which("xclip").is_ok();
        if prompt && !(has_ipc && has_selection) {
            tracing::warn!(
                "Selection probing needs {} and wl-clipboard (or xclip) on PATH",
                compositor.tool()
            );
        }
        has_ipc && has_selection
    }

    async fn frontmost_app(&self) -> Option<AppInfo> {
        self.focused_window().await.map(|w| AppInfo {
            app_id: w.app_id,
            pid: w.pid,
        })
    }

    async fn focused_element(&self) -> Option<ElementRef> {
        self.focused_window().await.map(|w| ElementRef(w.id))
    }

    async fn element_at(&self, point: Point) -> Option<ElementRef> {
        self.windows()
            .await
            .into_iter()
            .find(|w| w.contains(point))
            .map(|w| ElementRef(w.id))
    }

    async fn element_info(&self, element: ElementRef) -> Option<ElementInfo> {
        let focused = self.focused_window().await;
        let window = match focused {
            Some(w) if w.id == element.0 => w,
            _ => self.windows().await.into_iter().find(|w| w.id == element.0)?,
        };

        Some(ElementInfo {
            pid: Some(window.pid),
            ..ElementInfo::new(Role::Window)
        })
    }

    async fn selected_text(&self, element: ElementRef) -> Option<String> {
        let focused = self.focused_window().await?;
        if focused.id != element.0 {
            return None;
        }
        String::from_utf8(read_primary_selection().await?).ok()
    }

    async fn selection_stamp(&self) -> Option<u64> {
        self.compositor?;
        read_primary_selection().await.map(|bytes| fingerprint(&bytes))
    }

    async fn parent(&self, _element: ElementRef) -> Option<ElementRef> {
        None
    }

    async fn focused_origin(&self) -> Option<Point> {
        self.focused_window().await.map(|w| w.origin)
    }

    async fn window_origin(&self, pid: u32) -> Option<Point> {
        if let Some(w) = self.focused_window().await {
            if w.pid == pid {
                return Some(w.origin);
            }
        }
        self.windows()
            .await
            .into_iter()
            .find(|w| w.pid == pid)
            .map(|w| w.origin)
    }

    async fn pointer_location(&self) -> Option<Point> {
        match self.compositor? {
            Compositor::Hyprland => {
                let pos = run_json("hyprctl", &["cursorpos", "-j"]).await?;
                Some(Point::new(pos.get("x")?.as_f64()?, pos.get("y")?.as_f64()?))
            }
            Compositor::Sway => None,
        }
    }

    async fn is_secure_input_active(&self) -> bool {
        if self.secure_apps.is_empty() {
            return false;
        }
        match self.focused_window().await {
            Some(window) => is_secure_app(&window.app_id, &self.secure_apps),
            None => false,
        }
    }
}

async fn run_json(program: &str, args: &[&str]) -> Option<Value> {
    let stdout = run_capture(program, args).await?;
    match serde_json::from_slice(&stdout) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("{} returned invalid JSON: {}", program, e);
            None
        }
    }
}

async fn run_capture(program: &str, args: &[&str]) -> Option<Vec<u8>> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(QUERY_TIMEOUT, output).await {
        Ok(Ok(out)) if out.status.success() => Some(out.stdout),
        Ok(Ok(_)) => None,
        Ok(Err(e)) => {
            tracing::trace!("{} failed: {}", program, e);
            None
        }
        Err(_) => {
            tracing::debug!("{} timed out", program);
            None
        }
    }
}

/// Current primary selection, if any
async fn read_primary_selection() -> Option<Vec<u8>> {
    match run_capture("wl-paste", &["--primary", "--no-newline"]).await {
        Some(bytes) => Some(bytes),
        None => run_capture("xclip", &["-selection", "primary", "-o"]).await,
    }
}

fn fingerprint(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

fn is_secure_app(app_id: &str, secure_apps: &[String]) -> bool {
    secure_apps.contains(&app_id.to_lowercase())
}

fn parse_hypr_client(value: &Value) -> Option<Window> {
    let address = value.get("address")?.as_str()?;
    let id = u64::from_str_radix(address.trim_start_matches("0x"), 16).ok()?;
    let at = value.get("at")?.as_array()?;
    let size = value.get("size")?.as_array()?;
    let pid = value.get("pid")?.as_i64()?;

    Some(Window {
        id,
        app_id: value
            .get("class")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        pid: u32::try_from(pid).ok()?,
        origin: Point::new(at.first()?.as_f64()?, at.get(1)?.as_f64()?),
        size: (size.first()?.as_f64()?, size.get(1)?.as_f64()?),
        focused: false,
    })
}

fn collect_sway_windows(node: &Value, out: &mut Vec<Window>) {
    if let Some(window) = parse_sway_node(node) {
        out.push(window);
    }
    for key in ["nodes", "floating_nodes"] {
        if let Some(children) = node.get(key).and_then(Value::as_array) {
            for child in children {
                collect_sway_windows(child, out);
            }
        }
    }
}

fn parse_sway_node(node: &Value) -> Option<Window> {
    let pid = node.get("pid")?.as_i64()?;
    let rect = node.get("rect")?;
    let app_id = node
        .get("app_id")
        .and_then(Value::as_str)
        .or_else(|| {
            node.get("window_properties")
                .and_then(|p| p.get("class"))
                .and_then(Value::as_str)
        })
        .unwrap_or_default();

    Some(Window {
        id: node.get("id")?.as_u64()?,
        app_id: app_id.to_string(),
        pid: u32::try_from(pid).ok()?,
        origin: Point::new(rect.get("x")?.as_f64()?, rect.get("y")?.as_f64()?),
        size: (
            rect.get("width")?.as_f64()?,
            rect.get("height")?.as_f64()?,
        ),
        focused: node.get("focused").and_then(Value::as_bool).unwrap_or(false),
    })
}
