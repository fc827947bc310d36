//! Execution State: per-task and per-session counters plus the sub-agent
//! recursion stack. Pure in-memory bookkeeping; no I/O.

use chrono::DateTime;
use chrono::Utc;

use crate::context::CheckpointId;

/// A stack frame pushed before a sub-agent runs and consumed on its
/// completion (`ParentContext`). `last_assistant_thought` is truncated to
/// 200 chars at push time so ReCAP's recovery message stays bounded.
#[derive(Debug, Clone)]
pub struct ParentContext {
    pub checkpoint_id: CheckpointId,
    pub last_assistant_thought: String,
    pub depth_before_push: u32,
    pub sub_goal: String,
    pub timestamp: DateTime<Utc>,
}

const THOUGHT_SNIPPET_MAX_CHARS: usize = 200;

impl ParentContext {
    pub fn new(checkpoint_id: CheckpointId, last_assistant_thought: &str, depth_before_push: u32, sub_goal: impl Into<String>) -> Self {
        let snippet: String = last_assistant_thought.chars().take(THOUGHT_SNIPPET_MAX_CHARS).collect();
        Self {
            checkpoint_id,
            last_assistant_thought: snippet,
            depth_before_push,
            sub_goal: sub_goal.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Per-task counters and bookkeeping, reset at the start of every `run()`.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub start_time: DateTime<Utc>,
    pub user_query: String,
    pub step_count: u64,
    pub tokens_consumed: u64,
    pub consecutive_no_tool_call_count: u32,
    pub tools_used: Vec<String>,
    pub modified_files: Vec<String>,
}

impl TaskState {
    fn new(user_query: impl Into<String>) -> Self {
        Self {
            start_time: Utc::now(),
            user_query: user_query.into(),
            step_count: 0,
            tokens_consumed: 0,
            consecutive_no_tool_call_count: 0,
            tools_used: Vec::new(),
            modified_files: Vec::new(),
        }
    }
}

/// One entry in the session's task history, recorded when a task finishes
/// (successfully, forced, or failed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,
}

#[derive(Debug, Clone)]
pub struct TaskHistoryEntry {
    pub user_query: String,
    pub outcome: TaskOutcome,
    pub step_count: u64,
    pub finished_at: DateTime<Utc>,
}

/// Bookkeeping that survives across tasks within the same session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub start_time: DateTime<Utc>,
    pub files_modified: Vec<String>,
    pub key_decisions: Vec<String>,
    pub lessons_learned: Vec<String>,
    pub tasks_completed: u64,
    pub history: Vec<TaskHistoryEntry>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            start_time: Utc::now(),
            files_modified: Vec::new(),
            key_decisions: Vec::new(),
            lessons_learned: Vec::new(),
            tasks_completed: 0,
            history: Vec::new(),
        }
    }
}

/// Raised by [`ExecutionState::push_parent_context`] when pushing would
/// exceed the configured recursion cap. The caller (the Task tool) must
/// refuse to start the child without having mutated any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("sub-agent recursion depth {attempted} exceeds max {max}")]
pub struct RecursionCapExceeded {
    pub attempted: u32,
    pub max: u32,
}

/// The full execution-state record owned by one Executor: per-task counters,
/// per-session history, and the sub-agent parent-context stack.
pub struct ExecutionState {
    pub task: TaskState,
    pub session: SessionState,
    parent_stack: Vec<ParentContext>,
    depth: u32,
}

impl ExecutionState {
    /// Fresh state with no task yet started; call [`Self::initialize_task`]
    /// before the first step of a run.
    pub fn new() -> Self {
        Self {
            task: TaskState::new(String::new()),
            session: SessionState::new(),
            parent_stack: Vec::new(),
            depth: 0,
        }
    }

    /// Fresh state seeded at `depth` rather than 0. A sub-agent Engine's own
    /// `ExecutionState` starts with no parent-stack frames of its own, but it
    /// must still carry the depth it was launched at so the recursion cap
    /// bounds the whole sub-agent tree, not just one Engine's local stack.
    pub fn new_with_depth(depth: u32) -> Self {
        Self {
            depth,
            ..Self::new()
        }
    }

    pub fn initialize_session(&mut self) {
        self.session = SessionState::new();
    }

    /// Resets per-task counters for a new `run()` call. Session bookkeeping
    /// and the recursion stack (meaningful only within one task) are left
    /// alone; a sub-agent Engine calls this on its own fresh `ExecutionState`
    /// rather than reusing the parent's.
    pub fn initialize_task(&mut self, user_query: impl Into<String>) {
        self.task = TaskState::new(user_query);
    }

    pub fn increment_step(&mut self) -> u64 {
        self.task.step_count += 1;
        self.task.step_count
    }

    pub fn add_tokens(&mut self, n: u64) {
        self.task.tokens_consumed += n;
    }

    pub fn record_tool_used(&mut self, name: impl Into<String>) {
        self.task.tools_used.push(name.into());
    }

    pub fn record_modified_file(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.task.modified_files.contains(&path) {
            self.task.modified_files.push(path.clone());
        }
        if !self.session.files_modified.contains(&path) {
            self.session.files_modified.push(path);
        }
    }

    pub fn reset_no_tool_call_counter(&mut self) {
        self.task.consecutive_no_tool_call_count = 0;
    }

    /// Increments the consecutive-no-tool-call counter and returns its new
    /// value, for the caller to compare against `max_thinking_steps`.
    pub fn increment_no_tool_call_counter(&mut self) -> u32 {
        self.task.consecutive_no_tool_call_count += 1;
        self.task.consecutive_no_tool_call_count
    }

    pub fn should_force_complete(&self, max_thinking_steps: u32) -> bool {
        self.task.consecutive_no_tool_call_count >= max_thinking_steps
    }

    pub fn current_depth(&self) -> u32 {
        self.depth
    }

    /// Pushes a frame before a sub-agent starts. Fails without mutating
    /// anything if doing so would exceed `max_depth`.
    pub fn push_parent_context(&mut self, frame: ParentContext, max_depth: u32) -> Result<(), RecursionCapExceeded> {
        let attempted = self.depth + 1;
        if attempted > max_depth {
            return Err(RecursionCapExceeded { attempted, max: max_depth });
        }
        self.parent_stack.push(frame);
        self.depth = attempted;
        Ok(())
    }

    /// Pops the most recent frame on sub-agent completion, restoring the
    /// depth recorded before it was pushed.
    pub fn pop_parent_context(&mut self) -> Option<ParentContext> {
        let frame = self.parent_stack.pop()?;
        self.depth = frame.depth_before_push;
        Some(frame)
    }

    pub fn record_task_finished(&mut self, outcome: TaskOutcome) {
        if outcome == TaskOutcome::Success {
            self.session.tasks_completed += 1;
        }
        self.session.history.push(TaskHistoryEntry {
            user_query: self.task.user_query.clone(),
            outcome,
            step_count: self.task.step_count,
            finished_at: Utc::now(),
        });
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}
