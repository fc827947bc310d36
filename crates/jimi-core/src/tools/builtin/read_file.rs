use async_trait::async_trait;
use serde::Deserialize;

use crate::approval::ApprovalDecision;
use crate::sandbox::FileOp;
use crate::sandbox::SandboxValidator;
use crate::sandbox::Verdict;
use crate::tools::builtin::resolve_path;
use crate::tools::truncate_output;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolOutcome;
use crate::tools::ToolResult;

pub struct ReadFileTool;

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads the contents of a file, given a path relative to the workspace root (or an absolute path, subject to sandbox approval)."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to read, workspace-relative unless absolute.",
                },
            },
            "required": ["path"],
            "additionalProperties": false,
        })
    }

    async fn execute(&self, args_json: &str, ctx: &ToolContext<'_>) -> ToolOutcome {
        let args: ReadFileArgs = match serde_json::from_str(args_json) {
            Ok(a) => a,
            Err(_) => {
                return ToolOutcome::new(ToolResult::error(
                    "failed to parse arguments",
                    "invalid arguments",
                ))
            }
        };

        let resolved = resolve_path(ctx.work_dir, &args.path);
        let resolved_str = resolved.to_string_lossy().to_string();

        match SandboxValidator::check_path(ctx.sandbox_policy, &resolved_str, FileOp::Read, None) {
            Verdict::Denied { reason, .. } => {
                return ToolOutcome::new(ToolResult::error(reason, "sandbox denied"))
            }
            Verdict::RequiresApproval { reason, .. } => {
                let decision = ctx
                    .approval
                    .request(ctx.wire, "read_file", &resolved_str, &reason)
                    .await;
                if decision == ApprovalDecision::Reject {
                    return ToolOutcome::new(ToolResult::Rejected);
                }
            }
            Verdict::Allowed => {}
        }

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => {
                let (text, brief) = truncate_output(&content, ctx.output_budget, "read file");
                ToolOutcome::new(ToolResult::ok(text, brief))
            }
            Err(err) => ToolOutcome::new(ToolResult::error(
                format!("failed to read {resolved_str}: {err}"),
                "read failed",
            )),
        }
    }
}
