//! Accessibility probing
//!
//! [`AccessibilityTree`] is the native seam: element handles plus the handful
//! of attributes selection detection needs. [`AccessibilityTextProbe`] layers
//! the selection rules on top of it (ancestor walk for selected text,
//! editability, text contexts, ownership).
//!
//! Every probe method fails closed: when the process is not trusted, or the
//! tree has nothing to say, the answer is `None` / `false`. Nothing here
//! returns an error.

pub mod desktop;

use crate::gesture::EnvSnapshot;
use crate::input::Point;

/// Opaque handle to an element in the native tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementRef(pub u64);

/// Element roles the probe distinguishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    TextField,
    TextArea,
    SearchField,
    ComboBox,
    /// Password entry; never editable from our side
    SecureTextField,
    StaticText,
    Document,
    WebArea,
    Window,
    Other(String),
}

impl Role {
    /// Native editable roles (still need a settable value)
    fn is_editable_role(&self) -> bool {
        matches!(
            self,
            Role::TextField | Role::TextArea | Role::SearchField | Role::ComboBox
        )
    }

    /// Roles that carry readable text even when not editable
    fn is_text_bearing(&self) -> bool {
        matches!(
            self,
            Role::TextField
                | Role::TextArea
                | Role::SearchField
                | Role::ComboBox
                | Role::StaticText
                | Role::Document
                | Role::WebArea
        )
    }
}

/// Attributes read from one element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo {
    pub role: Role,
    /// Rich-text / contenteditable subrole
    pub content_editable: bool,
    pub selected_text: Option<String>,
    pub value_settable: bool,
    pub selection_range_settable: bool,
    pub pid: Option<u32>,
}

impl ElementInfo {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            content_editable: false,
            selected_text: None,
            value_settable: false,
            selection_range_settable: false,
            pid: None,
        }
    }

    fn is_editable(&self) -> bool {
        (self.role.is_editable_role() && self.value_settable)
            || self.content_editable
            || self.selection_range_settable
    }
}

/// The frontmost application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// Bundle id / window class
    pub app_id: String,
    pub pid: u32,
}

/// Native accessibility tree
#[async_trait::async_trait]
pub trait AccessibilityTree: Send + Sync {
    /// Whether the process may query the tree, optionally prompting once
    async fn is_trusted(&self, prompt: bool) -> bool;

    async fn frontmost_app(&self) -> Option<AppInfo>;

    async fn focused_element(&self) -> Option<ElementRef>;

    async fn element_at(&self, point: Point) -> Option<ElementRef>;

    async fn element_info(&self, element: ElementRef) -> Option<ElementInfo>;

    /// Selected text of one element. Backends where this is expensive leave
    /// `ElementInfo::selected_text` empty and override this instead.
    async fn selected_text(&self, element: ElementRef) -> Option<String> {
        self.element_info(element).await?.selected_text
    }

    /// Fingerprint of a selection buffer that outlives the selection itself
    /// (the Wayland/X11 primary selection). `None` for per-element trees.
    async fn selection_stamp(&self) -> Option<u64> {
        None
    }

    async fn parent(&self, element: ElementRef) -> Option<ElementRef>;

    /// On-screen origin of the focused window of `pid`
    async fn window_origin(&self, pid: u32) -> Option<Point>;

    /// Origin of the focused window
    async fn focused_origin(&self) -> Option<Point> {
        let app = self.frontmost_app().await?;
        self.window_origin(app.pid).await
    }

    /// Absolute pointer position, when the platform can report one
    async fn pointer_location(&self) -> Option<Point> {
        None
    }

    /// Whether a password-style field currently has focus
    async fn is_secure_input_active(&self) -> bool;
}

/// Answers "is the current focus editable" for in-place output
#[async_trait::async_trait]
pub trait FocusInspector: Send + Sync {
    async fn is_focus_editable(&self) -> bool;
}

/// Selection-aware queries over an [`AccessibilityTree`]
pub struct AccessibilityTextProbe<T> {
    tree: T,
    max_depth: usize,
    own_pid: u32,
}

impl<T: AccessibilityTree> AccessibilityTextProbe<T> {
    pub fn new(tree: T, max_depth: usize) -> Self {
        Self::with_pid(tree, max_depth, std::process::id())
    }

    /// Probe that treats `own_pid` as this tool's process
    pub fn with_pid(tree: T, max_depth: usize, own_pid: u32) -> Self {
        Self {
            tree,
            max_depth: max_depth.max(1),
            own_pid,
        }
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    pub fn own_pid(&self) -> u32 {
        self.own_pid
    }

    pub async fn is_trusted(&self, prompt: bool) -> bool {
        self.tree.is_trusted(prompt).await
    }

    /// First non-empty selected text on the focused element or its ancestors
    pub async fn selected_text(&self) -> Option<String> {
        if !self.tree.is_trusted(false).await {
            return None;
        }

        let mut current = self.tree.focused_element().await;
        for _ in 0..self.max_depth {
            let element = current?;
            if let Some(text) = self.tree.selected_text(element).await {
                let text = text.trim();
                if !text.is_empty() {
                    return Some(text.to_string());
                }
            }
            current = self.tree.parent(element).await;
        }
        None
    }

    pub async fn is_focused_element_editable(&self) -> bool {
        if !self.tree.is_trusted(false).await {
            return false;
        }
        match self.tree.focused_element().await {
            Some(element) => self.info(element).await.is_some_and(|i| i.is_editable()),
            None => false,
        }
    }

    /// Editable or text-bearing element at `point` (focused element if none)
    pub async fn is_text_context(&self, point: Point) -> bool {
        match self.text_context_element(point).await {
            Some((_, info)) => info.is_editable() || info.role.is_text_bearing(),
            None => false,
        }
    }

    pub async fn is_owned_by_current_process(&self, element: ElementRef) -> bool {
        if !self.tree.is_trusted(false).await {
            return false;
        }
        self.info(element)
            .await
            .and_then(|i| i.pid)
            .is_some_and(|pid| pid == self.own_pid)
    }

    /// Whether the focused element belongs to this tool
    pub async fn focus_owned_by_current_process(&self) -> bool {
        match self.tree.focused_element().await {
            Some(element) => self.is_owned_by_current_process(element).await,
            None => false,
        }
    }

    pub async fn focused_window_origin(&self, pid: u32) -> Option<Point> {
        if !self.tree.is_trusted(false).await {
            return None;
        }
        self.tree.window_origin(pid).await
    }

    pub async fn frontmost_app(&self) -> Option<AppInfo> {
        if !self.tree.is_trusted(false).await {
            return None;
        }
        self.tree.frontmost_app().await
    }

    pub async fn pointer_location(&self) -> Option<Point> {
        if !self.tree.is_trusted(false).await {
            return None;
        }
        self.tree.pointer_location().await
    }

    pub async fn selection_stamp(&self) -> Option<u64> {
        if !self.tree.is_trusted(false).await {
            return None;
        }
        self.tree.selection_stamp().await
    }

    /// Secure input counts as active when we cannot tell
    pub async fn is_secure_input_active(&self) -> bool {
        if !self.tree.is_trusted(false).await {
            return true;
        }
        self.tree.is_secure_input_active().await
    }

    /// What a press has to remember, read in order: the focused window
    /// origin (before the window can move), then the selection stamp
    pub async fn press_snapshot(&self) -> EnvSnapshot {
        if !self.tree.is_trusted(false).await {
            return EnvSnapshot::default();
        }

        let focused_window_origin = self.tree.focused_origin().await;
        let selection_stamp = self.tree.selection_stamp().await;

        EnvSnapshot {
            own_pid: self.own_pid,
            focused_window_origin,
            selection_stamp,
            ..Default::default()
        }
    }

    /// Snapshot of everything the classifier needs at release / key press.
    /// Each element is looked up once; the selection itself is not read.
    pub async fn environment(&self, pointer: Point) -> EnvSnapshot {
        if !self.tree.is_trusted(false).await {
            return EnvSnapshot::default();
        }

        let (frontmost, focused_window_origin, focused, under) = tokio::join!(
            self.tree.frontmost_app(),
            self.tree.focused_origin(),
            self.tree.focused_element(),
            self.tree.element_at(pointer),
        );

        let focused_info = match focused {
            Some(element) => self.info(element).await,
            None => None,
        };
        let under_info = match under {
            Some(element) if Some(element) == focused => focused_info.clone(),
            Some(element) => self.info(element).await,
            None => None,
        };

        let pointer_over_own_ui = under_info
            .as_ref()
            .and_then(|i| i.pid)
            .is_some_and(|pid| pid == self.own_pid);

        // Element under the pointer, else the focused one
        let context = if under.is_some() {
            under_info.as_ref()
        } else {
            focused_info.as_ref()
        };
        let text_context_owned_by_other = context.is_some_and(|info| {
            (info.is_editable() || info.role.is_text_bearing())
                && info.pid.is_some_and(|pid| pid != self.own_pid)
        });

        EnvSnapshot {
            frontmost,
            own_pid: self.own_pid,
            pointer_over_own_ui,
            focused_editable: focused_info.as_ref().is_some_and(|i| i.is_editable()),
            focused_window_origin,
            text_context_owned_by_other,
            selection_stamp: None,
        }
    }

    async fn info(&self, element: ElementRef) -> Option<ElementInfo> {
        self.tree.element_info(element).await
    }

    async fn text_context_element(&self, point: Point) -> Option<(ElementRef, ElementInfo)> {
        if !self.tree.is_trusted(false).await {
            return None;
        }
        let element = match self.tree.element_at(point).await {
            Some(element) => element,
            None => self.tree.focused_element().await?,
        };
        let info = self.info(element).await?;
        Some((element, info))
    }
}

#[async_trait::async_trait]
impl<T: AccessibilityTree> FocusInspector for AccessibilityTextProbe<T> {
    async fn is_focus_editable(&self) -> bool {
        self.is_focused_element_editable().await
    }
}

#[async_trait::async_trait]
impl<T: AccessibilityTree> crate::clipboard::SecureInputFlag for AccessibilityTextProbe<T> {
    async fn is_active(&self) -> bool {
        self.is_secure_input_active().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory tree for unit tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeState {
        pub trusted: bool,
        pub elements: HashMap<u64, (ElementInfo, Option<u64>)>,
        pub focused: Option<u64>,
        pub at_point: Option<u64>,
        pub frontmost: Option<AppInfo>,
        pub origins: HashMap<u32, Point>,
        pub secure: bool,
        pub stamp: Option<u64>,
        pub selection_reads: usize,
    }

    #[derive(Default)]
    pub struct FakeTree {
        pub state: Mutex<FakeState>,
    }

    impl FakeTree {
        pub fn trusted() -> Self {
            let tree = Self::default();
            tree.state.lock().unwrap().trusted = true;
            tree
        }

        pub fn add(&self, id: u64, info: ElementInfo, parent: Option<u64>) {
            self.state.lock().unwrap().elements.insert(id, (info, parent));
        }

        pub fn focus(&self, id: u64) {
            self.state.lock().unwrap().focused = Some(id);
        }
    }

    #[async_trait::async_trait]
    impl AccessibilityTree for FakeTree {
        async fn is_trusted(&self, _prompt: bool) -> bool {
            self.state.lock().unwrap().trusted
        }

        async fn frontmost_app(&self) -> Option<AppInfo> {
            self.state.lock().unwrap().frontmost.clone()
        }

        async fn focused_element(&self) -> Option<ElementRef> {
            self.state.lock().unwrap().focused.map(ElementRef)
        }

        async fn element_at(&self, _point: Point) -> Option<ElementRef> {
            self.state.lock().unwrap().at_point.map(ElementRef)
        }

        async fn element_info(&self, element: ElementRef) -> Option<ElementInfo> {
            let state = self.state.lock().unwrap();
            state.elements.get(&element.0).map(|(info, _)| info.clone())
        }

        async fn selected_text(&self, element: ElementRef) -> Option<String> {
            let mut state = self.state.lock().unwrap();
            state.selection_reads += 1;
            state
                .elements
                .get(&element.0)
                .and_then(|(info, _)| info.selected_text.clone())
        }

        async fn selection_stamp(&self) -> Option<u64> {
            self.state.lock().unwrap().stamp
        }

        async fn parent(&self, element: ElementRef) -> Option<ElementRef> {
            let state = self.state.lock().unwrap();
            state
                .elements
                .get(&element.0)
                .and_then(|(_, parent)| parent.map(ElementRef))
        }

        async fn window_origin(&self, pid: u32) -> Option<Point> {
            self.state.lock().unwrap().origins.get(&pid).copied()
        }

        async fn is_secure_input_active(&self) -> bool {
            self.state.lock().unwrap().secure
        }
    }

    pub fn text(role: Role, selected: Option<&str>, pid: u32) -> ElementInfo {
        ElementInfo {
            selected_text: selected.map(str::to_string),
            pid: Some(pid),
            ..ElementInfo::new(role)
        }
    }
}
