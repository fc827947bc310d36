//! A no-op tool: its only effect is that the argument becomes the tool
//! result text, giving the model a place to externalize reasoning without
//! touching the filesystem, network, or sandbox. Used in tests to exercise
//! the max-steps and consecutive-thinking limits deterministically.

use async_trait::async_trait;
use serde::Deserialize;

use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolOutcome;
use crate::tools::ToolResult;

pub struct ThinkTool;

#[derive(Deserialize)]
struct ThinkArgs {
    thought: String,
}

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> &str {
        "Records a private reasoning step without taking any action. Does not touch files, the shell, or the network."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "thought": { "type": "string", "description": "The reasoning to record." },
            },
            "required": ["thought"],
            "additionalProperties": false,
        })
    }

    async fn execute(&self, args_json: &str, _ctx: &ToolContext<'_>) -> ToolOutcome {
        let args: ThinkArgs = match serde_json::from_str(args_json) {
            Ok(a) => a,
            Err(_) => {
                return ToolOutcome::new(ToolResult::error(
                    "failed to parse arguments",
                    "invalid arguments",
                ))
            }
        };
        ToolOutcome::new(ToolResult::ok(args.thought, "recorded"))
    }
}
