//! In-memory todo list. Each call replaces the whole list (the model is
//! expected to resend the full, updated set) and republishes it on the Wire
//! as a `todo_update` event so UIs can render progress.

use std::sync::Mutex;

use async_trait::async_trait;
use jimi_protocol::WireMessage;
use serde::Deserialize;

use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolOutcome;
use crate::tools::ToolResult;

#[derive(Debug, Clone, Deserialize)]
struct TodoItem {
    content: String,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct TodoWriteArgs {
    todos: Vec<TodoItem>,
}

pub struct TodoWriteTool {
    items: Mutex<Vec<String>>,
}

impl TodoWriteTool {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// The current list, rendered as `"[status] content"` lines, for tests
    /// and for any caller that wants the latest snapshot outside the Wire.
    pub fn current(&self) -> Vec<String> {
        self.items.lock().expect("poisoned").clone()
    }
}

impl Default for TodoWriteTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Replaces the current todo list with the given items, each with a status. Use to track multi-step work."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "description": "The full, updated todo list.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": { "type": "string", "description": "What the todo item is." },
                            "status": {
                                "type": "string",
                                "description": "One of pending, in_progress, completed.",
                            },
                        },
                        "required": ["content"],
                        "additionalProperties": false,
                    },
                },
            },
            "required": ["todos"],
            "additionalProperties": false,
        })
    }

    async fn execute(&self, args_json: &str, ctx: &ToolContext<'_>) -> ToolOutcome {
        let args: TodoWriteArgs = match serde_json::from_str(args_json) {
            Ok(a) => a,
            Err(_) => {
                return ToolOutcome::new(ToolResult::error(
                    "failed to parse arguments",
                    "invalid arguments",
                ))
            }
        };

        let rendered: Vec<String> = args
            .todos
            .iter()
            .map(|item| {
                let status = if item.status.is_empty() { "pending" } else { &item.status };
                format!("[{status}] {}", item.content)
            })
            .collect();

        *self.items.lock().expect("poisoned") = rendered.clone();

        ctx.wire.send(WireMessage::TodoUpdate {
            items: rendered.clone(),
            timestamp: chrono::Utc::now(),
        });

        ToolOutcome::new(ToolResult::ok(
            format!("todo list updated ({} items)", rendered.len()),
            "todo list updated",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::AlwaysRejectResponder;
    use crate::approval::ApprovalGate;
    use crate::wire::Wire;
    use jimi_protocol::ApprovalPolicy;
    use jimi_protocol::SandboxPolicy;
    use jimi_protocol::ToolOutputBudget;
    use tokio_util::sync::CancellationToken;

    fn ctx<'a>(sandbox: &'a SandboxPolicy, gate: &'a ApprovalGate, wire: &'a Wire) -> ToolContext<'a> {
        ToolContext {
            work_dir: std::path::Path::new("/tmp"),
            sandbox_policy: sandbox,
            approval: gate,
            wire,
            output_budget: ToolOutputBudget::default(),
            tool_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn replaces_the_list_and_publishes_on_wire() {
        let sandbox = SandboxPolicy::default();
        let gate = ApprovalGate::new(
            ApprovalPolicy { yolo: false },
            Box::new(AlwaysRejectResponder),
            CancellationToken::new(),
        );
        let wire = Wire::new();
        let mut sub = wire.subscribe();
        let tool = TodoWriteTool::new();

        let outcome = tool
            .execute(
                r#"{"todos":[{"content":"write tests","status":"in_progress"}]}"#,
                &ctx(&sandbox, &gate, &wire),
            )
            .await;
        assert!(!outcome.result.unwrap().is_error());
        assert_eq!(tool.current(), vec!["[in_progress] write tests".to_string()]);

        let ev = sub.recv().await.unwrap();
        assert_matches::assert_matches!(ev, WireMessage::TodoUpdate { .. });
    }

    #[tokio::test]
    async fn missing_status_defaults_to_pending() {
        let sandbox = SandboxPolicy::default();
        let gate = ApprovalGate::new(
            ApprovalPolicy { yolo: false },
            Box::new(AlwaysRejectResponder),
            CancellationToken::new(),
        );
        let wire = Wire::new();
        let tool = TodoWriteTool::new();
        tool.execute(r#"{"todos":[{"content":"x"}]}"#, &ctx(&sandbox, &gate, &wire))
            .await;
        assert_eq!(tool.current(), vec!["[pending] x".to_string()]);
    }
}
