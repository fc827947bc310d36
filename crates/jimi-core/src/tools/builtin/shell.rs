use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::approval::ApprovalDecision;
use crate::sandbox::SandboxValidator;
use crate::sandbox::Verdict;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolOutcome;
use crate::tools::ToolResult;

pub struct ShellTool;

#[derive(Deserialize)]
struct ShellArgs {
    command: String,
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Runs a shell command in the session working directory, subject to sandbox command rules and a per-invocation timeout."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run, as passed to `sh -c`." },
            },
            "required": ["command"],
            "additionalProperties": false,
        })
    }

    async fn execute(&self, args_json: &str, ctx: &ToolContext<'_>) -> ToolOutcome {
        let args: ShellArgs = match serde_json::from_str(args_json) {
            Ok(a) => a,
            Err(_) => {
                return ToolOutcome::new(ToolResult::error(
                    "failed to parse arguments",
                    "invalid arguments",
                ))
            }
        };

        match SandboxValidator::check_command(ctx.sandbox_policy, &args.command) {
            Verdict::Denied { reason, .. } => {
                return ToolOutcome::new(ToolResult::error(reason, "sandbox denied"))
            }
            Verdict::RequiresApproval { reason, .. } => {
                let decision = ctx
                    .approval
                    .request(ctx.wire, "shell", &args.command, &reason)
                    .await;
                if decision == ApprovalDecision::Reject {
                    return ToolOutcome::new(ToolResult::Rejected);
                }
            }
            Verdict::Allowed => {}
        }

        let mut child = match Command::new("sh")
            .arg("-c")
            .arg(&args.command)
            .current_dir(ctx.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                return ToolOutcome::new(ToolResult::error(
                    format!("failed to spawn command: {err}"),
                    "external process error",
                ))
            }
        };

        // `child` is kept alive (not consumed by `wait_with_output`) so the
        // timeout branch can still reach it to force-kill the process. The
        // pipes are drained concurrently with the wait, not after it, so a
        // chatty child can't deadlock on a full stdout/stderr pipe buffer.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let drain = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            let (wait_res, _, _) = tokio::join!(
                child.wait(),
                async {
                    if let Some(handle) = stdout_pipe.as_mut() {
                        let _ = handle.read_to_end(&mut stdout).await;
                    }
                },
                async {
                    if let Some(handle) = stderr_pipe.as_mut() {
                        let _ = handle.read_to_end(&mut stderr).await;
                    }
                },
            );
            (wait_res, stdout, stderr)
        };

        let timeout = Duration::from_secs(ctx.tool_timeout_secs);
        let (status, stdout, stderr) = match tokio::time::timeout(timeout, drain).await {
            Ok((Ok(status), stdout, stderr)) => (status, stdout, stderr),
            Ok((Err(err), _, _)) => {
                let _ = child.start_kill();
                return ToolOutcome::new(ToolResult::error(
                    format!("command failed to complete: {err}"),
                    "external process error",
                ))
            }
            Err(_) => {
                let _ = child.start_kill();
                return ToolOutcome::new(ToolResult::error(
                    format!("command exceeded {}s timeout", ctx.tool_timeout_secs),
                    "timeout",
                ))
            }
        };

        let mut combined = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr);
        if !stderr.is_empty() {
            combined.push_str("\n--- stderr ---\n");
            combined.push_str(&stderr);
        }

        let (text, brief) = crate::tools::truncate_output(
            &combined,
            ctx.output_budget,
            &format!("exit code {}", status.code().unwrap_or(-1)),
        );

        if status.success() {
            ToolOutcome::new(ToolResult::ok(text, brief))
        } else {
            ToolOutcome::new(ToolResult::error(text, brief))
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
            tool_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn runs_a_simple_command() {
        let dir = tempdir().unwrap();
        let sandbox = SandboxPolicy::default();
        let gate = ApprovalGate::new(
            ApprovalPolicy { yolo: false },
            Box::new(AlwaysRejectResponder),
            CancellationToken::new(),
        );
        let wire = Wire::new();

        let outcome = ShellTool
            .execute(r#"{"command":"echo hello"}"#, &ctx(dir.path(), &sandbox, &gate, &wire))
            .await;

        match outcome.result.unwrap() {
            ToolResult::Ok { output, .. } => assert!(output.contains("hello")),
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dangerous_command_denied() {
        let dir = tempdir().unwrap();
        let mut sandbox = SandboxPolicy::default();
        sandbox.dangerous_command_patterns = vec!["rm -rf".to_string()];
        let gate = ApprovalGate::new(
            ApprovalPolicy { yolo: false },
            Box::new(AlwaysRejectResponder),
            CancellationToken::new(),
        );
        let wire = Wire::new();

        let outcome = ShellTool
            .execute(
                r#"{"command":"rm -rf /tmp/whatever"}"#,
                &ctx(dir.path(), &sandbox, &gate, &wire),
            )
            .await;

        assert!(outcome.result.unwrap().is_error());
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_as_error() {
        let dir = tempdir().unwrap();
        let sandbox = SandboxPolicy::default();
        let gate = ApprovalGate::new(
            ApprovalPolicy { yolo: false },
            Box::new(AlwaysRejectResponder),
            CancellationToken::new(),
        );
        let wire = Wire::new();

        let outcome = ShellTool
            .execute(r#"{"command":"exit 1"}"#, &ctx(dir.path(), &sandbox, &gate, &wire))
            .await;

        assert!(outcome.result.unwrap().is_error());
    }
}
