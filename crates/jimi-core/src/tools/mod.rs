//! Tool Registry & Tool Contract: maps a tool name to an implementation and
//! its JSON-schema parameter description, and dispatches `execute` through a
//! uniform seam shared by built-in and externally-registered tools.

pub mod builtin;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use jimi_protocol::ToolOutputBudget;
use jimi_protocol::SandboxPolicy;

use crate::approval::ApprovalGate;
use crate::wire::Wire;

/// What a tool actually did, as seen by a caller. `ok`/`error` become a
/// tool-role Message's content; `rejected` is produced only when the
/// Approval Gate denies the request.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Ok { output: String, brief: String },
    Error { output: String, brief: String },
    Rejected,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>, brief: impl Into<String>) -> Self {
        ToolResult::Ok {
            output: output.into(),
            brief: brief.into(),
        }
    }

    pub fn error(output: impl Into<String>, brief: impl Into<String>) -> Self {
        ToolResult::Error {
            output: output.into(),
            brief: brief.into(),
        }
    }

    /// The text that becomes the tool-role Message's content, regardless of
    /// which variant produced it.
    pub fn as_message_text(&self) -> String {
        match self {
            ToolResult::Ok { output, .. } => output.clone(),
            ToolResult::Error { output, .. } => output.clone(),
            ToolResult::Rejected => "rejected by user".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error { .. })
    }
}

/// The outcome of one tool execution, as seen by the Executor: the
/// ToolResult plus any workspace-relative paths the tool wrote to, so
/// ExecutionState can record them without every tool needing its own
/// reference into the state.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    pub result: Option<ToolResult>,
    pub modified_files: Vec<String>,
}

impl ToolOutcome {
    pub fn new(result: ToolResult) -> Self {
        Self {
            result: Some(result),
            modified_files: Vec::new(),
        }
    }

    pub fn with_modified_file(mut self, path: impl Into<String>) -> Self {
        self.modified_files.push(path.into());
        self
    }
}

/// Collaborators a tool needs to act: workspace boundary, sandbox policy,
/// the single Approval Gate, and the Wire to publish incremental events on.
pub struct ToolContext<'a> {
    pub work_dir: &'a Path,
    pub sandbox_policy: &'a SandboxPolicy,
    pub approval: &'a ApprovalGate,
    pub wire: &'a Wire,
    pub output_budget: ToolOutputBudget,
    pub tool_timeout_secs: u64,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameter_schema(&self) -> serde_json::Value;

    /// Executes the tool. Implementations validate via the Sandbox Validator
    /// and request approval via the Approval Gate themselves before acting;
    /// the registry does not do this on a tool's behalf since the approval
    /// `kind`/`action`/`description` triple is tool-specific.
    async fn execute(&self, args_json: &str, ctx: &ToolContext<'_>) -> ToolOutcome;
}

/// Truncates `text` to the configured character/line budget, appending a
/// note to the brief when truncation occurred.
pub fn truncate_output(text: &str, budget: ToolOutputBudget, brief: &str) -> (String, String) {
    let mut lines: Vec<&str> = text.lines().collect();
    let line_truncated = lines.len() > budget.max_lines;
    if line_truncated {
        lines.truncate(budget.max_lines);
    }
    let mut joined = lines.join("\n");
    let char_truncated = joined.chars().count() > budget.max_chars;
    if char_truncated {
        joined = joined.chars().take(budget.max_chars).collect();
    }
    if line_truncated || char_truncated {
        (joined, format!("{brief} (truncated)"))
    } else {
        (joined, brief.to_string())
    }
}

pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Assembles the registry with every in-process built-in tool, including
    /// the schema-only `task` entry. Its real dispatch is special-cased by
    /// the Executor rather than routed through `execute` (see
    /// [`crate::subagent::SubagentTaskTool`]), but it still needs a registry
    /// entry so `schemas_for` can surface it to agents that declare
    /// sub-agents; `AgentExecutor::allowed_tool_names` only puts it on an
    /// agent's allow-list when that agent actually has sub-agents configured.
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::empty();
        registry.register_external(Box::new(builtin::ReadFileTool));
        registry.register_external(Box::new(builtin::WriteFileTool));
        registry.register_external(Box::new(builtin::ApplyPatchTool));
        registry.register_external(Box::new(builtin::ShellTool));
        registry.register_external(Box::new(builtin::WebFetchTool));
        registry.register_external(Box::new(builtin::WebSearchTool::new(Box::new(
            builtin::web_search::StubWebSearchProvider,
        ))));
        registry.register_external(Box::new(builtin::TodoWriteTool::new()));
        registry.register_external(Box::new(builtin::ThinkTool));
        registry.register_external(Box::new(crate::subagent::SubagentTaskTool));
        registry
    }

    /// Registers a tool, whether built-in or dynamically loaded from an
    /// extension process or a YAML-described custom command. Replaces any
    /// existing tool registered under the same name.
    pub fn register_external(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Every registered tool name, in no particular order. Used by the
    /// Executor to intersect the registry's capability set with an agent's
    /// whitelist/disallow list.
    pub fn all_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Tool schemas for the names in `allowed`, in the order given, skipping
    /// any name the registry doesn't recognize.
    pub fn schemas_for(&self, allowed: &[String]) -> Vec<serde_json::Value> {
        allowed
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameter_schema(),
                })
            })
            .collect()
    }

    /// Dispatches `name` with `args_json`, enforcing the agent's tool
    /// whitelist first. A name outside the whitelist is reported identically
    /// to an unregistered tool, so the model can't probe for restricted
    /// tools by name.
    pub async fn execute(
        &self,
        name: &str,
        args_json: &str,
        ctx: &ToolContext<'_>,
        allowed: &[String],
    ) -> ToolOutcome {
        if !allowed.iter().any(|a| a == name) {
            return ToolOutcome::new(ToolResult::error(
                format!("unknown tool: {name}"),
                "invalid arguments",
            ));
        }
        match self.get(name) {
            Some(tool) => tool.execute(args_json, ctx).await,
            None => ToolOutcome::new(ToolResult::error(
                format!("unknown tool: {name}"),
                "invalid arguments",
            )),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtin_tools()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_output_marks_brief_when_over_budget() {
        let budget = ToolOutputBudget {
            max_chars: 5,
            max_lines: 10,
        };
        let (text, brief) = truncate_output("abcdefgh", budget, "ok");
        assert_eq!(text, "abcde");
        assert_eq!(brief, "ok (truncated)");
    }

    #[test]
    fn truncate_output_leaves_brief_untouched_under_budget() {
        let budget = ToolOutputBudget {
            max_chars: 100,
            max_lines: 100,
        };
        let (text, brief) = truncate_output("short", budget, "ok");
        assert_eq!(text, "short");
        assert_eq!(brief, "ok");
    }

    #[tokio::test]
    async fn execute_rejects_tool_outside_whitelist() {
        let registry = ToolRegistry::with_builtin_tools();
        let sandbox = SandboxPolicy::default();
        let gate = ApprovalGate::new(
            jimi_protocol::ApprovalPolicy { yolo: true },
            Box::new(crate::approval::AlwaysRejectResponder),
            tokio_util::sync::CancellationToken::new(),
        );
        let wire = Wire::new();
        let ctx = ToolContext {
            work_dir: Path::new("/tmp"),
            sandbox_policy: &sandbox,
            approval: &gate,
            wire: &wire,
            output_budget: ToolOutputBudget::default(),
            tool_timeout_secs: 60,
        };
        let outcome = registry.execute("shell", "{}", &ctx, &["read_file".to_string()]).await;
        assert!(outcome.result.unwrap().is_error());
    }
}
