//! Sub-agent Task Tool plumbing: the schema-only `task` tool entry, the seam
//! a concrete Engine implements to actually spawn and run a child, and the
//! ReCAP recovery-message builder.
//!
//! The real dispatch (push/pop of [`crate::state::ParentContext`], the
//! `revertTo` + recap append) needs mutable access to the parent's Context
//! and ExecutionState, which the [`crate::tools::Tool`] seam deliberately
//! doesn't carry (per the design note against a shared "current executor"
//! pointer). The Executor special-cases the `task` tool name and performs
//! that dance itself; this tool's `execute` is therefore unreachable in
//! normal operation and only exists so the registry can export its schema.

use std::sync::Arc;

use async_trait::async_trait;
use jimi_protocol::Message;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::state::ParentContext;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolOutcome;
use crate::tools::ToolResult;
use crate::wire::Wire;

pub const TASK_TOOL_NAME: &str = "task";

#[derive(Debug, Clone, Deserialize)]
pub struct SubagentTaskArgs {
    pub description: String,
    pub subagent_name: String,
    pub prompt: String,
}

/// What the Executor asks a [`SubagentLauncher`] to do.
pub struct SubagentLaunchRequest {
    pub subagent_name: String,
    pub prompt: String,
    pub depth: u32,
    pub parent_cancellation: CancellationToken,
}

pub struct SubagentLaunchResult {
    pub summary: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SubagentError {
    #[error("unknown sub-agent: {0}")]
    UnknownSubagent(String),
    #[error("sub-agent run failed: {0}")]
    ChildFailed(String),
}

/// Implemented by the Engine: constructs a child Context/registry/Wire for
/// `subagent_name`, bridges the child's events into `parent_wire` (its
/// `StepBegin`/`SubagentStarting` events already carry the depth and
/// sub-agent name), runs the child loop synchronously to completion, and
/// extracts the summary.
#[async_trait]
pub trait SubagentLauncher: Send + Sync {
    async fn launch(&self, req: SubagentLaunchRequest, parent_wire: Arc<Wire>) -> Result<SubagentLaunchResult, SubagentError>;
}

pub struct SubagentTaskTool;

#[async_trait]
impl Tool for SubagentTaskTool {
    fn name(&self) -> &str {
        TASK_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Delegates a sub-goal to a named sub-agent and returns its final summary. Runs in its own isolated conversation context."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "description": { "type": "string", "description": "Short human-readable description of the sub-goal." },
                "subagent_name": { "type": "string", "description": "Name of a registered sub-agent spec to run." },
                "prompt": { "type": "string", "description": "The prompt to hand to the sub-agent." },
            },
            "required": ["description", "subagent_name", "prompt"],
            "additionalProperties": false,
        })
    }

    async fn execute(&self, _args_json: &str, _ctx: &ToolContext<'_>) -> ToolOutcome {
        ToolOutcome::new(ToolResult::error(
            "the task tool must be dispatched by the executor, not the generic registry",
            "internal error",
        ))
    }
}

/// Builds the single recovery message appended to the parent Context after
/// `revertTo(frame.checkpoint_id)`: sub-goal, the snippet of the parent's
/// prior thought, the child's summary, and a resumption instruction. The
/// exact wording is implementation-chosen; only its
/// information content is specified.
pub fn build_recap_message(frame: &ParentContext, summary: &str) -> Message {
    let text = format!(
        "[sub-agent \"{}\" returned]\nprior thought: {}\nresult: {}\nContinue the task above using this result.",
        frame.sub_goal, frame.last_assistant_thought, summary
    );
    Message::user(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CheckpointId;

    #[test]
    fn recap_message_carries_sub_goal_and_summary() {
        let frame = ParentContext::new(3 as CheckpointId, "was about to edit file.rs", 0, "fix the bug");
        let msg = build_recap_message(&frame, "fixed the bug in file.rs");
        assert!(msg.text().contains("fix the bug"));
        assert!(msg.text().contains("was about to edit file.rs"));
        assert!(msg.text().contains("fixed the bug in file.rs"));
    }
}
