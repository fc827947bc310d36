//! A minimal patch tool: replaces one exact occurrence of `old_text` with
//! `new_text` in a file. Full unified-diff/hunk parsing (as the `apply_patch`
//! wire format used by codex-apply-patch supports) is out of scope; this
//! gives the model a dependable single-replacement primitive instead.

use async_trait::async_trait;
use serde::Deserialize;

use crate::approval::ApprovalDecision;
use crate::sandbox::FileOp;
use crate::sandbox::SandboxValidator;
use crate::sandbox::Verdict;
use crate::tools::builtin::resolve_path;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolOutcome;
use crate::tools::ToolResult;

pub struct ApplyPatchTool;

#[derive(Deserialize)]
struct ApplyPatchArgs {
    path: String,
    old_text: String,
    new_text: String,
}

#[async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &str {
        "apply_patch"
    }

    fn description(&self) -> &str {
        "Replaces one exact occurrence of old_text with new_text in the file at path. Fails if old_text does not appear exactly once."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File to patch, workspace-relative unless absolute." },
                "old_text": { "type": "string", "description": "Exact text to replace; must appear exactly once in the file." },
                "new_text": { "type": "string", "description": "Replacement text." },
            },
            "required": ["path", "old_text", "new_text"],
            "additionalProperties": false,
        })
    }

    async fn execute(&self, args_json: &str, ctx: &ToolContext<'_>) -> ToolOutcome {
        let args: ApplyPatchArgs = match serde_json::from_str(args_json) {
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

        let existing = match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => content,
            Err(err) => {
                return ToolOutcome::new(ToolResult::error(
                    format!("failed to read {resolved_str}: {err}"),
                    "invalid arguments",
                ))
            }
        };

        let occurrences = existing.matches(args.old_text.as_str()).count();
        if occurrences != 1 {
            return ToolOutcome::new(ToolResult::error(
                format!("old_text occurs {occurrences} times in {resolved_str}; expected exactly 1"),
                "invalid arguments",
            ));
        }

        let patched = existing.replacen(&args.old_text, &args.new_text, 1);
        let size = patched.len() as u64;

        match SandboxValidator::check_path(ctx.sandbox_policy, &resolved_str, FileOp::Write, Some(size)) {
            Verdict::Denied { reason, .. } => {
                return ToolOutcome::new(ToolResult::error(reason, "sandbox denied"))
            }
            Verdict::RequiresApproval { reason, .. } => {
                let decision = ctx
                    .approval
                    .request(ctx.wire, "apply_patch", &resolved_str, &reason)
                    .await;
                if decision == ApprovalDecision::Reject {
                    return ToolOutcome::new(ToolResult::Rejected);
                }
            }
            Verdict::Allowed => {}
        }

        match tokio::fs::write(&resolved, &patched).await {
            Ok(()) => ToolOutcome::new(ToolResult::ok(
                format!("patched {resolved_str}"),
                "applied patch",
            ))
            .with_modified_file(resolved_str),
            Err(err) => ToolOutcome::new(ToolResult::error(
                format!("failed to write {resolved_str}: {err}"),
                "write failed",
            )),
        }
    }
}
