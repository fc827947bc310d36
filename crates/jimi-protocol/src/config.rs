//! Validated configuration records the core consumes. Loading these from
//! on-disk files and command-line parsing are external collaborators.

use serde::Deserialize;
use serde::Serialize;

/// Step/recursion/timeout limits enforced by the Executor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    pub max_steps_per_run: u64,
    /// Consecutive no-tool-call assistant steps before forcing finish.
    pub max_thinking_steps: u32,
    pub max_recursion_depth: u32,
    pub tool_timeout_secs: u64,
    pub stream_retry_cap: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps_per_run: 200,
            max_thinking_steps: 3,
            max_recursion_depth: 4,
            tool_timeout_secs: 60,
            stream_retry_cap: 3,
        }
    }
}

/// Fraction of the model's context window at which compaction triggers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompactionPolicy {
    pub trigger_fraction: f32,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            trigger_fraction: 0.75,
        }
    }
}

/// Whether approval requests auto-resolve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalPolicy {
    /// YOLO mode: every request resolves to approve synchronously.
    pub yolo: bool,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self { yolo: false }
    }
}

/// Filesystem, shell, and network policy evaluated by the Sandbox Validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxPolicy {
    /// When true, every sandbox request is allowed unconditionally.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub workspace_root: Option<String>,
    #[serde(default)]
    pub denied_path_globs: Vec<String>,
    #[serde(default)]
    pub write_allow_list: Vec<String>,
    #[serde(default)]
    pub max_write_file_size_bytes: Option<u64>,
    #[serde(default)]
    pub dangerous_commands_allowed: bool,
    #[serde(default)]
    pub dangerous_command_patterns: Vec<String>,
    #[serde(default)]
    pub command_whitelist: Vec<String>,
    #[serde(default)]
    pub network_disabled: bool,
    #[serde(default)]
    pub denied_domains: Vec<String>,
}

/// Tool output truncation budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToolOutputBudget {
    pub max_chars: usize,
    pub max_lines: usize,
}

impl Default for ToolOutputBudget {
    fn default() -> Self {
        Self {
            max_chars: 16_000,
            max_lines: 1_000,
        }
    }
}
