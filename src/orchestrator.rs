//! Action orchestrator
//!
//! Owns the only [`BarSession`] and drives it through the phase table in
//! [`crate::session`]. Everything slow (providers, scripts, speech, timers)
//! runs as a background task that reports back over a channel:
//!
//! ```text
//!  SelectionEvent / Intent ──► Orchestrator ──► BarRenderer
//!                                │    ▲
//!                      spawn     ▼    │  Completion { ticket, result }
//!                         action_task / timer_task
//! ```
//!
//! There is at most one action task and one timer task. Both are cancelled
//! before being replaced, and a completion is only applied when its ticket
//! matches the live slot and that slot's token has not been cancelled, so a
//! superseded task can never write into a newer session.

use crate::actions::{perform_instant, url_from_selection, BuiltinAction, SystemActions};
use crate::approval::{wait_for_approval, ApprovalGate};
use crate::clipboard::SelectionReplacer;
use crate::config::{ActionKind, ActionOutput};
use crate::probe::FocusInspector;
use crate::providers::{
    render_prompt, AudioPlayer, LlmClient, ProviderKind, SettingsProvider, SpeechSynthesizer,
    Translator,
};
use crate::render::BarRenderer;
use crate::script::ScriptRunner;
use crate::selection::SelectionEvent;
use crate::session::{BarPhase, BarSession, BarView, ButtonKind, ButtonView, Origin, PhaseEvent};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Character range inside a result, `start..end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharRange {
    pub start: usize,
    pub end: usize,
}

/// What the user did in the bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    /// Built-in button (translate and speak included)
    Builtin { action: BuiltinAction },
    /// Custom action button
    Custom { id: String },
    /// Copy the highlighted part of the result, or all of it
    ResultCopy {
        #[serde(default)]
        range: Option<CharRange>,
    },
    ResultApply,
    ResultDiscard,
    Approve { id: Uuid },
    Deny { id: Uuid },
    Dismiss,
}

/// Input to the orchestrator loop
#[derive(Debug)]
pub enum Command {
    Selection(SelectionEvent),
    Intent(Intent),
}

/// Cloneable sender side of the orchestrator loop
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
}

impl OrchestratorHandle {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Returns false once the orchestrator is gone
    pub async fn selection(&self, event: SelectionEvent) -> bool {
        self.tx.send(Command::Selection(event)).await.is_ok()
    }

    pub async fn intent(&self, intent: Intent) -> bool {
        self.tx.send(Command::Intent(intent)).await.is_ok()
    }
}

/// How a custom action or translation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Succeeded(String),
    Failed(String),
    /// Abandoned on purpose (send not confirmed); never shown as an error
    Cancelled,
}

#[derive(Debug)]
enum TaskResult {
    Action(ActionOutcome),
    SpeechEnded,
    TimerFired,
}

#[derive(Debug)]
struct Completion {
    ticket: u64,
    result: TaskResult,
}

type Work = Pin<Box<dyn Future<Output = TaskResult> + Send + 'static>>;

struct TaskSlot {
    ticket: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskSlot {
    fn is_live(&self, ticket: u64) -> bool {
        self.ticket == ticket && !self.token.is_cancelled()
    }

    fn cancel(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Everything the orchestrator talks to
pub struct Collaborators {
    pub settings: Arc<dyn SettingsProvider>,
    pub llm: Arc<dyn LlmClient>,
    pub translator: Arc<dyn Translator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub player: Arc<dyn AudioPlayer>,
    pub replacer: Arc<dyn SelectionReplacer>,
    pub system: Arc<dyn SystemActions>,
    pub focus: Arc<dyn FocusInspector>,
    pub scripts: ScriptRunner,
    pub renderer: Arc<dyn BarRenderer>,
}

pub struct Orchestrator {
    deps: Collaborators,
    session: Option<BarSession>,
    buttons: Vec<ButtonView>,
    approval: ApprovalGate,
    action_task: Option<TaskSlot>,
    timer_task: Option<TaskSlot>,
    next_ticket: u64,
    completions_tx: mpsc::Sender<Completion>,
    completions_rx: mpsc::Receiver<Completion>,
}

fn outcome<E: std::fmt::Display>(result: Result<String, E>) -> TaskResult {
    TaskResult::Action(match result {
        Ok(text) => ActionOutcome::Succeeded(text),
        Err(e) => ActionOutcome::Failed(e.to_string()),
    })
}

/// `range` of `text` in characters; `None` when empty or out of bounds
fn slice_chars(text: &str, range: CharRange) -> Option<String> {
    if range.start >= range.end || range.end > text.chars().count() {
        return None;
    }
    Some(
        text.chars()
            .skip(range.start)
            .take(range.end - range.start)
            .collect(),
    )
}

impl Orchestrator {
    pub fn new(deps: Collaborators) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel(32);
        Self {
            deps,
            session: None,
            buttons: Vec::new(),
            approval: ApprovalGate::new(),
            action_task: None,
            timer_task: None,
            next_ticket: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn session(&self) -> Option<&BarSession> {
        self.session.as_ref()
    }

    /// Current projection, as last handed to the renderer
    pub fn view(&self) -> BarView {
        BarView::project(
            self.session.as_ref(),
            &self.buttons,
            self.approval.pending().map(|r| r.view()),
        )
    }

    /// Main loop; returns on shutdown or when every handle is dropped
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        tracing::debug!("Orchestrator started");
        self.publish();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(Command::Selection(event)) => self.handle_selection(event).await,
                    Some(Command::Intent(intent)) => self.handle_intent(intent).await,
                    None => break,
                },
                Some(completion) = self.completions_rx.recv() => {
                    self.on_completion(completion).await;
                }
            }
        }

        self.dismiss("shutdown");
        tracing::debug!("Orchestrator stopped");
    }

    /// Wait for the next background completion and apply it
    pub async fn process_next_completion(&mut self) {
        if let Some(completion) = self.completions_rx.recv().await {
            self.on_completion(completion).await;
        }
    }

    /// A new selection replaces whatever was showing
    pub async fn handle_selection(&mut self, event: SelectionEvent) {
        self.dismiss("new selection");

        self.buttons = self.buttons_for(event.text());
        tracing::info!(
            "Showing bar for {:?} selection ({} chars)",
            event.gesture(),
            event.text().chars().count()
        );
        self.session = Some(BarSession::new(event));
        self.start_timer(self.deps.settings.auto_dismiss());
        self.publish();
    }

    pub async fn handle_intent(&mut self, intent: Intent) {
        if self.session.is_none() {
            tracing::debug!("No bar, ignoring {:?}", intent);
            return;
        }

        match intent {
            Intent::Builtin { action } => self.pick_builtin(action).await,
            Intent::Custom { id } => self.pick_custom(&id),
            Intent::ResultCopy { range } => self.result_copy(range).await,
            Intent::ResultApply => self.result_apply().await,
            Intent::ResultDiscard => {
                if matches!(self.phase(), BarPhase::Result { .. }) {
                    self.dismiss("result discarded");
                }
            }
            Intent::Approve { id } => {
                if let Err(e) = self.approval.approve(id) {
                    tracing::warn!("{}", e);
                }
                self.publish();
            }
            Intent::Deny { id } => {
                if let Err(e) = self.approval.deny(id) {
                    tracing::warn!("{}", e);
                }
                self.publish();
            }
            Intent::Dismiss => self.dismiss("user"),
        }
    }

    fn phase(&self) -> BarPhase {
        self.session
            .as_ref()
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }

    fn selected_text(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.selection.text().to_string())
    }

    fn button(&self, id: &str) -> Option<&ButtonView> {
        self.buttons.iter().find(|b| b.id == id)
    }

    fn buttons_for(&self, text: &str) -> Vec<ButtonView> {
        let settings = &self.deps.settings;
        let features = settings.features();

        let builtin = BuiltinAction::ALL
            .into_iter()
            .filter(|a| a.enabled_in(&features))
            .filter(|a| *a != BuiltinAction::OpenUrl || url_from_selection(text).is_some())
            .map(|a| ButtonView {
                id: a.id().to_string(),
                label: a.label().to_string(),
                kind: ButtonKind::Builtin,
                enabled: match a {
                    BuiltinAction::Translate => settings.has_credentials(ProviderKind::Translation),
                    BuiltinAction::Speak => settings.has_credentials(ProviderKind::Speech),
                    _ => true,
                },
            });

        let custom = settings
            .custom_actions()
            .into_iter()
            .filter(|a| a.enabled)
            .map(|a| ButtonView {
                enabled: match a.kind {
                    ActionKind::Llm { .. } => settings.has_credentials(ProviderKind::Llm),
                    ActionKind::Script { .. } => true,
                },
                id: a.id,
                label: a.label,
                kind: ButtonKind::Custom,
            });

        builtin.chain(custom).collect()
    }

    fn apply(&mut self, event: PhaseEvent) -> bool {
        self.session
            .as_mut()
            .map(|s| s.apply(event))
            .unwrap_or(false)
    }

    fn publish(&self) {
        self.deps.renderer.render(&self.view());
    }

    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn spawn(&mut self, work: Work) -> TaskSlot {
        let ticket = self.ticket();
        let token = CancellationToken::new();
        let child = token.clone();
        let tx = self.completions_tx.clone();

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                _ = child.cancelled() => return,
                result = work => result,
            };
            if child.is_cancelled() {
                return;
            }
            let _ = tx.send(Completion { ticket, result }).await;
        });

        TaskSlot {
            ticket,
            token,
            handle,
        }
    }

    /// Cancel the action task, its pending confirmation and any speech
    fn cancel_action_task(&mut self) {
        if let Some(slot) = self.action_task.take() {
            slot.cancel();
        }
        if self.phase().is_speaking() {
            self.deps.player.stop();
        }
        if self.approval.cancel() {
            tracing::debug!("Pending confirmation cancelled");
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(slot) = self.timer_task.take() {
            slot.cancel();
        }
    }

    /// Replace the timer; the bar is dismissed when it fires
    fn start_timer(&mut self, after: Duration) {
        self.cancel_timer();
        if after.is_zero() {
            return;
        }
        let slot = self.spawn(Box::pin(async move {
            tokio::time::sleep(after).await;
            TaskResult::TimerFired
        }));
        self.timer_task = Some(slot);
    }

    fn start_action(&mut self, work: Work) {
        let slot = self.spawn(work);
        self.action_task = Some(slot);
    }

    /// Close the bar and stop everything tied to it
    fn dismiss(&mut self, reason: &str) {
        let had_session = self.session.is_some();
        self.cancel_action_task();
        self.cancel_timer();
        self.session = None;
        self.buttons.clear();

        if had_session {
            tracing::debug!("Bar dismissed ({})", reason);
            self.publish();
        }
    }

    /// Show the error state on a button, then dismiss after the flash
    fn flash(&mut self, origin: Origin) {
        self.cancel_action_task();
        if self.apply(PhaseEvent::Flash(origin)) {
            self.start_timer(self.deps.settings.error_flash());
            self.publish();
        }
    }

    async fn pick_builtin(&mut self, action: BuiltinAction) {
        let Some(enabled) = self.button(action.id()).map(|b| b.enabled) else {
            tracing::debug!("'{}' is not offered for this selection", action.id());
            return;
        };
        if !self.phase().accepts_picks() {
            return;
        }
        let Some(text) = self.selected_text() else {
            return;
        };

        if !enabled {
            tracing::info!("'{}' unavailable: provider has no credentials", action.id());
            let origin = match action {
                BuiltinAction::Translate => Origin::Translate,
                other => Origin::Action(other.id().to_string()),
            };
            self.flash(origin);
            return;
        }

        match action {
            BuiltinAction::Translate => self.start_translate(text),
            BuiltinAction::Speak => self.toggle_speak(text),
            instant => {
                let features = self.deps.settings.features();
                if let Err(e) =
                    perform_instant(self.deps.system.as_ref(), instant, &text, &features).await
                {
                    tracing::warn!("'{}' failed: {}", instant.id(), e);
                }
                self.dismiss(instant.id());
            }
        }
    }

    fn start_translate(&mut self, text: String) {
        self.cancel_action_task();
        self.cancel_timer();
        if !self.apply(PhaseEvent::StartTranslate) {
            return;
        }

        let translator = self.deps.translator.clone();
        let target = self.deps.settings.translate_target();
        tracing::debug!("Translating {} chars into {}", text.chars().count(), target);
        self.start_action(Box::pin(async move {
            outcome(translator.translate(&text, &target).await)
        }));
        self.publish();
    }

    fn toggle_speak(&mut self, text: String) {
        if self.phase().is_speaking() {
            self.cancel_action_task();
            self.apply(PhaseEvent::SpeechEnded);
            self.start_timer(self.deps.settings.auto_dismiss());
            self.publish();
            return;
        }

        self.cancel_action_task();
        // Speech has no implicit time limit
        self.cancel_timer();
        if !self.apply(PhaseEvent::StartSpeaking) {
            return;
        }

        let speech = self.deps.speech.clone();
        let player = self.deps.player.clone();
        self.start_action(Box::pin(async move {
            match speech.synthesize(&text).await {
                Ok(audio) => {
                    if let Err(e) = player.play(audio).await {
                        tracing::warn!("Playback failed: {}", e);
                    }
                }
                Err(e) => tracing::warn!("Speech synthesis failed: {}", e),
            }
            TaskResult::SpeechEnded
        }));
        self.publish();
    }

    fn pick_custom(&mut self, id: &str) {
        let Some(enabled) = self.button(id).map(|b| b.enabled) else {
            tracing::debug!("Custom action '{}' is not offered", id);
            return;
        };
        if !self.phase().accepts_picks() {
            return;
        }
        let Some(action) = self
            .deps
            .settings
            .custom_actions()
            .into_iter()
            .find(|a| a.id == id)
        else {
            return;
        };
        let Some(text) = self.selected_text() else {
            return;
        };

        if !enabled {
            tracing::info!("'{}' unavailable: provider has no credentials", id);
            self.flash(Origin::Action(id.to_string()));
            return;
        }

        self.cancel_action_task();
        self.cancel_timer();
        if !self.apply(PhaseEvent::StartAction(action.id.clone())) {
            return;
        }

        let work: Work = match action.kind {
            ActionKind::Llm { prompt } => {
                let prompt = render_prompt(&prompt, &text);
                let approval = if action.confirm_before_send {
                    match self.approval.request(&action.id, &prompt) {
                        Ok((_, rx)) => Some(rx),
                        Err(e) => {
                            tracing::warn!("{}", e);
                            self.apply(PhaseEvent::Cancelled);
                            self.start_timer(self.deps.settings.auto_dismiss());
                            self.publish();
                            return;
                        }
                    }
                } else {
                    None
                };

                let llm = self.deps.llm.clone();
                Box::pin(async move {
                    if let Some(rx) = approval {
                        if !wait_for_approval(rx).await {
                            return TaskResult::Action(ActionOutcome::Cancelled);
                        }
                    }
                    outcome(llm.complete(&prompt).await)
                })
            }
            ActionKind::Script { script } => {
                let runner = self.deps.scripts.clone();
                Box::pin(async move { outcome(runner.run_default(&script, &text).await) })
            }
        };

        tracing::debug!("Running custom action '{}'", action.id);
        self.start_action(work);
        self.publish();
    }

    async fn result_copy(&mut self, range: Option<CharRange>) {
        let BarPhase::Result { text, .. } = self.phase() else {
            return;
        };
        let chosen = range
            .and_then(|r| slice_chars(&text, r))
            .unwrap_or(text);

        if let Err(e) = self.deps.system.copy(&chosen).await {
            tracing::warn!("Copying result failed: {}", e);
        }
        self.dismiss("result copied");
    }

    async fn result_apply(&mut self) {
        let BarPhase::Result { text, .. } = self.phase() else {
            return;
        };
        self.dismiss("result applied");
        self.replace(&text).await;
    }

    async fn replace(&self, text: &str) {
        if let Err(e) = self.deps.replacer.replace_selection(text).await {
            tracing::warn!("Replacing selection failed: {}", e);
        }
    }

    /// Whether a finished custom action writes straight into the target
    async fn wants_in_place(&self, action_id: &str) -> bool {
        let in_place = self
            .deps
            .settings
            .custom_actions()
            .into_iter()
            .find(|a| a.id == action_id)
            .is_some_and(|a| {
                matches!(a.kind, ActionKind::Script { .. }) && a.output == ActionOutput::InPlace
            });
        in_place && self.deps.focus.is_focus_editable().await
    }

    async fn on_completion(&mut self, completion: Completion) {
        let Completion { ticket, result } = completion;

        match result {
            TaskResult::TimerFired => {
                if !self.timer_task.as_ref().is_some_and(|s| s.is_live(ticket)) {
                    tracing::trace!("Dropping stale timer {}", ticket);
                    return;
                }
                self.timer_task = None;
                self.dismiss("timeout");
            }
            TaskResult::SpeechEnded => {
                if !self.take_live_action(ticket) {
                    return;
                }
                if self.apply(PhaseEvent::SpeechEnded) {
                    self.start_timer(self.deps.settings.auto_dismiss());
                    self.publish();
                }
            }
            TaskResult::Action(outcome) => {
                if !self.take_live_action(ticket) {
                    return;
                }
                self.finish_action(outcome).await;
            }
        }
    }

    fn take_live_action(&mut self, ticket: u64) -> bool {
        if self.action_task.as_ref().is_some_and(|s| s.is_live(ticket)) {
            self.action_task = None;
            true
        } else {
            tracing::debug!("Dropping stale completion {}", ticket);
            false
        }
    }

    async fn finish_action(&mut self, outcome: ActionOutcome) {
        match outcome {
            ActionOutcome::Succeeded(text) => {
                if let BarPhase::Processing { action_id } = self.phase() {
                    if self.wants_in_place(&action_id).await {
                        tracing::debug!("'{}' replacing selection in place", action_id);
                        self.dismiss("in-place result");
                        self.replace(&text).await;
                        return;
                    }
                }
                if self.apply(PhaseEvent::Succeeded(text)) {
                    self.start_timer(self.deps.settings.auto_dismiss());
                    self.publish();
                }
            }
            ActionOutcome::Failed(message) => {
                tracing::warn!("{} failed: {}", self.phase(), message);
                if self.apply(PhaseEvent::Failed) {
                    self.start_timer(self.deps.settings.error_flash());
                    self.publish();
                }
            }
            ActionOutcome::Cancelled => {
                tracing::debug!("Action cancelled");
                if self.apply(PhaseEvent::Cancelled) {
                    self.start_timer(self.deps.settings.auto_dismiss());
                    self.publish();
                }
            }
        }
    }
}
