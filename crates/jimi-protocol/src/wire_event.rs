//! Wire event schema: the discriminated events broadcast on the event bus.

use serde::Deserialize;
use serde::Serialize;

use crate::message::ToolCall;

/// Discriminates every event the core can publish on the Wire.
///
/// `message_type` is the serde tag so downstream consumers (UIs, recorders)
/// can dispatch without deserializing the full payload first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum WireMessage {
    StepBegin {
        global_step: u64,
        is_subagent: bool,
        agent_name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    StepInterrupted {
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    ContentPartDelta {
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    ReasoningPartDelta {
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    ToolCallAnnounced {
        tool_call: ToolCall,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    ToolResult {
        tool_call_id: String,
        brief: String,
        is_error: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    ApprovalRequest {
        request_id: String,
        kind: String,
        action: String,
        description: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    ApprovalResponse {
        request_id: String,
        decision: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    TodoUpdate {
        items: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    SubagentStarting {
        subagent_name: String,
        prompt: String,
        depth: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    SubagentCompleted {
        subagent_name: String,
        summary: String,
        depth: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    CompactionBegin {
        token_count_before: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    CompactionEnd {
        token_count_after: u64,
        checkpoint_id: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
    StatusUpdate {
        message_count: usize,
        token_count: u64,
        usage_percent: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl WireMessage {
    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        match self {
            WireMessage::StepBegin { timestamp, .. }
            | WireMessage::StepInterrupted { timestamp, .. }
            | WireMessage::ContentPartDelta { timestamp, .. }
            | WireMessage::ReasoningPartDelta { timestamp, .. }
            | WireMessage::ToolCallAnnounced { timestamp, .. }
            | WireMessage::ToolResult { timestamp, .. }
            | WireMessage::ApprovalRequest { timestamp, .. }
            | WireMessage::ApprovalResponse { timestamp, .. }
            | WireMessage::TodoUpdate { timestamp, .. }
            | WireMessage::SubagentStarting { timestamp, .. }
            | WireMessage::SubagentCompleted { timestamp, .. }
            | WireMessage::CompactionBegin { timestamp, .. }
            | WireMessage::CompactionEnd { timestamp, .. }
            | WireMessage::StatusUpdate { timestamp, .. } => *timestamp,
        }
    }
}
