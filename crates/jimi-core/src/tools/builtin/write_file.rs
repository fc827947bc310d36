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

pub struct WriteFileTool;

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes content to a file, creating it if necessary. Paths outside the workspace root require approval; writes over the configured size limit are denied."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path to write, workspace-relative unless absolute." },
                "content": { "type": "string", "description": "Full file content to write." },
            },
            "required": ["path", "content"],
            "additionalProperties": false,
        })
    }

    async fn execute(&self, args_json: &str, ctx: &ToolContext<'_>) -> ToolOutcome {
        let args: WriteFileArgs = match serde_json::from_str(args_json) {
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
        let size = args.content.len() as u64;

        match SandboxValidator::check_path(ctx.sandbox_policy, &resolved_str, FileOp::Write, Some(size)) {
            Verdict::Denied { reason, .. } => {
                return ToolOutcome::new(ToolResult::error(reason, "sandbox denied"))
            }
            Verdict::RequiresApproval { reason, .. } => {
                let decision = ctx
                    .approval
                    .request(ctx.wire, "write_file", &resolved_str, &reason)
                    .await;
                if decision == ApprovalDecision::Reject {
                    return ToolOutcome::new(ToolResult::Rejected);
                }
            }
            Verdict::Allowed => {}
        }

        if let Some(parent) = resolved.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return ToolOutcome::new(ToolResult::error(
                    format!("failed to create parent directories for {resolved_str}: {err}"),
                    "write failed",
                ));
            }
        }

        match tokio::fs::write(&resolved, &args.content).await {
            Ok(()) => ToolOutcome::new(ToolResult::ok(
                format!("wrote {size} bytes to {resolved_str}"),
                "wrote file",
            ))
            .with_modified_file(resolved_str),
            Err(err) => ToolOutcome::new(ToolResult::error(
                format!("failed to write {resolved_str}: {err}"),
                "write failed",
            )),
        }
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
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    fn ctx<'a>(
        work_dir: &'a std::path::Path,
        sandbox: &'a SandboxPolicy,
        gate: &'a ApprovalGate,
        wire: &'a Wire,
    ) -> ToolContext<'a> {
        ToolContext {
            work_dir,
            sandbox_policy: sandbox,
            approval: gate,
            wire,
            output_budget: ToolOutputBudget::default(),
            tool_timeout_secs: 10,
        }
    }

    #[tokio::test]
    async fn writes_within_workspace_without_approval() {
        let dir = tempdir().unwrap();
        let mut sandbox = SandboxPolicy::default();
        sandbox.workspace_root = Some(dir.path().to_string_lossy().to_string());
        let gate = ApprovalGate::new(
            ApprovalPolicy { yolo: false },
            Box::new(AlwaysRejectResponder),
            CancellationToken::new(),
        );
        let wire = Wire::new();

        let outcome = WriteFileTool
            .execute(
                r#"{"path":"out.txt","content":"hi"}"#,
                &ctx(dir.path(), &sandbox, &gate, &wire),
            )
            .await;

        assert!(!outcome.result.unwrap().is_error());
        assert_eq!(outcome.modified_files.len(), 1);
        let written = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(written, "hi");
    }

    #[tokio::test]
    async fn oversized_write_is_denied() {
        let dir = tempdir().unwrap();
        let mut sandbox = SandboxPolicy::default();
        sandbox.workspace_root = Some(dir.path().to_string_lossy().to_string());
        sandbox.max_write_file_size_bytes = Some(2);
        let gate = ApprovalGate::new(
            ApprovalPolicy { yolo: false },
            Box::new(AlwaysRejectResponder),
            CancellationToken::new(),
        );
        let wire = Wire::new();

        let outcome = WriteFileTool
            .execute(
                r#"{"path":"out.txt","content":"too long"}"#,
                &ctx(dir.path(), &sandbox, &gate, &wire),
            )
            .await;

        assert!(outcome.result.unwrap().is_error());
        assert!(outcome.modified_files.is_empty());
    }

    #[tokio::test]
    async fn write_outside_workspace_rejected_without_approval() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let mut sandbox = SandboxPolicy::default();
        sandbox.workspace_root = Some(dir.path().to_string_lossy().to_string());
        let gate = ApprovalGate::new(
            ApprovalPolicy { yolo: false },
            Box::new(AlwaysRejectResponder),
            CancellationToken::new(),
        );
        let wire = Wire::new();
        let outside_path = outside.path().join("out.txt").to_string_lossy().to_string();

        let outcome = WriteFileTool
            .execute(
                &serde_json::json!({"path": outside_path, "content": "hi"}).to_string(),
                &ctx(dir.path(), &sandbox, &gate, &wire),
            )
            .await;

        assert_eq!(outcome.result.unwrap(), ToolResult::Rejected);
    }
}
