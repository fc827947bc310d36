//! Approval Gate: mediates human-in-the-loop confirmation before an
//! operation that mutates external state or spends significant resources.

use async_trait::async_trait;
use dashmap::DashSet;
use jimi_protocol::ApprovalPolicy;
use jimi_protocol::WireMessage;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::wire::Wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    ApproveForSession,
    Reject,
}

impl ApprovalDecision {
    fn as_str(self) -> &'static str {
        match self {
            ApprovalDecision::Approve => "approve",
            ApprovalDecision::ApproveForSession => "approve_for_session",
            ApprovalDecision::Reject => "reject",
        }
    }
}

/// The external collaborator (TUI, GUI, editor integration) that actually
/// surfaces a request to a human and returns their decision. Non-goal per
/// the core's scope; the core only defines this seam.
#[async_trait]
pub trait ApprovalResponder: Send + Sync {
    async fn ask(&self, kind: &str, action: &str, description: &str) -> ApprovalDecision;
}

/// A responder that always rejects; useful as a safe default when no UI is
/// attached and YOLO mode is off.
pub struct AlwaysRejectResponder;

#[async_trait]
impl ApprovalResponder for AlwaysRejectResponder {
    async fn ask(&self, _kind: &str, _action: &str, _description: &str) -> ApprovalDecision {
        ApprovalDecision::Reject
    }
}

pub struct ApprovalGate {
    policy: ApprovalPolicy,
    responder: Box<dyn ApprovalResponder>,
    /// Positive responses cached for the engine's lifetime, keyed by
    /// (kind, action fingerprint). A `DashMap`-backed set rather than a
    /// single `Mutex<HashSet<_>>`: one `ApprovalGate` is shared (via `Arc`)
    /// across a parent engine and every sub-agent it spawns, all of which
    /// can be requesting approvals concurrently.
    session_cache: DashSet<(String, String)>,
    cancellation: CancellationToken,
}

impl ApprovalGate {
    pub fn new(
        policy: ApprovalPolicy,
        responder: Box<dyn ApprovalResponder>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            policy,
            responder,
            session_cache: DashSet::new(),
            cancellation,
        }
    }

    /// Requests approval for `action` of type `kind`, publishing the
    /// request/response pair on `wire` so UIs can observe it regardless of
    /// which responder actually answered.
    pub async fn request(
        &self,
        wire: &Wire,
        kind: &str,
        action: &str,
        description: &str,
    ) -> ApprovalDecision {
        let cache_key = (kind.to_string(), action.to_string());
        if self.session_cache.contains(&cache_key) {
            return ApprovalDecision::Approve;
        }

        if self.policy.yolo {
            return ApprovalDecision::Approve;
        }

        let request_id = Uuid::new_v4().to_string();
        wire.send(WireMessage::ApprovalRequest {
            request_id: request_id.clone(),
            kind: kind.to_string(),
            action: action.to_string(),
            description: description.to_string(),
            timestamp: chrono::Utc::now(),
        });

        let decision = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => ApprovalDecision::Reject,
            decision = self.responder.ask(kind, action, description) => decision,
        };

        wire.send(WireMessage::ApprovalResponse {
            request_id,
            decision: decision.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        });

        if decision == ApprovalDecision::ApproveForSession {
            self.session_cache.insert(cache_key);
        }

        decision
    }
}
