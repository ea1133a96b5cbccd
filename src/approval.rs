//! Send confirmation for custom LLM actions
//!
//! An action with `confirm_before_send = true` parks its task on a oneshot
//! receiver until the user approves or denies. Only one request can be
//! pending at a time. Denying, cancelling or dropping the gate all read as
//! "not approved" on the task side, which treats it as a cancellation.

use crate::error::ApprovalError;
use crate::session::ApprovalView;
use tokio::sync::oneshot;
use uuid::Uuid;

/// A request waiting for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub action_id: String,
    /// What will be sent (shown in the bar)
    pub prompt: String,
}

impl ApprovalRequest {
    pub fn view(&self) -> ApprovalView {
        ApprovalView {
            id: self.id.to_string(),
            action_id: self.action_id.clone(),
            prompt: self.prompt.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Denied,
}

struct Pending {
    request: ApprovalRequest,
    reply: oneshot::Sender<Decision>,
}

/// Holds at most one pending request
#[derive(Default)]
pub struct ApprovalGate {
    pending: Option<Pending>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a request; the receiver resolves once the user decides
    pub fn request(
        &mut self,
        action_id: &str,
        prompt: &str,
    ) -> Result<(ApprovalRequest, oneshot::Receiver<Decision>), ApprovalError> {
        if let Some(pending) = &self.pending {
            if !pending.reply.is_closed() {
                return Err(ApprovalError::AlreadyPending(
                    pending.request.action_id.clone(),
                ));
            }
        }

        let (reply, rx) = oneshot::channel();
        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            action_id: action_id.to_string(),
            prompt: prompt.to_string(),
        };
        tracing::debug!("Awaiting confirmation for '{}'", action_id);
        self.pending = Some(Pending {
            request: request.clone(),
            reply,
        });
        Ok((request, rx))
    }

    pub fn approve(&mut self, id: Uuid) -> Result<(), ApprovalError> {
        self.resolve(id, Decision::Approved)
    }

    pub fn deny(&mut self, id: Uuid) -> Result<(), ApprovalError> {
        self.resolve(id, Decision::Denied)
    }

    /// Drop the pending request, if any; returns whether there was one
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn pending(&self) -> Option<&ApprovalRequest> {
        self.pending.as_ref().map(|p| &p.request)
    }

    fn resolve(&mut self, id: Uuid, decision: Decision) -> Result<(), ApprovalError> {
        match self.pending.take() {
            Some(pending) if pending.request.id == id => {
                tracing::debug!("'{}' {:?}", pending.request.action_id, decision);
                // Task may already be gone; nothing to do then
                let _ = pending.reply.send(decision);
                Ok(())
            }
            other => {
                self.pending = other;
                Err(ApprovalError::UnknownRequest(id.to_string()))
            }
        }
    }
}

/// Wait for a decision; anything but an explicit approval is `false`
pub async fn wait_for_approval(rx: oneshot::Receiver<Decision>) -> bool {
    matches!(rx.await, Ok(Decision::Approved))
}
