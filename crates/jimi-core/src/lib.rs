//! The agent execution core: the step loop, durable conversation context,
//! tool dispatch and sandboxing, approval gating, compaction, and sub-agent
//! recursion that together drive one Jimi agent run.
//!
//! A host constructs an [`Engine`] from an [`EngineConfig`] and calls
//! [`Engine::run`]; everything else in this crate is the machinery `Engine`
//! assembles underneath that one call.

mod approval;
mod compaction;
mod context;
mod context_manager;
mod engine;
mod error;
mod executor;
mod sandbox;
mod sessions_meta;
mod state;
mod stream;
mod subagent;
mod tools;
mod wire;

pub use approval::AlwaysRejectResponder;
pub use approval::ApprovalDecision;
pub use approval::ApprovalGate;
pub use approval::ApprovalResponder;
pub use compaction::should_compact;
pub use compaction::CompactionStrategy;
pub use compaction::SimpleCompactionStrategy;
pub use context::CheckpointId;
pub use context::Context;
pub use context_manager::ContextHook;
pub use context_manager::ContextManager;
pub use context_manager::PreparedStep;
pub use engine::Engine;
pub use engine::EngineConfig;
pub use engine::EngineStatus;
pub use error::CompactionError;
pub use error::ContextError;
pub use error::EngineError;
pub use error::ExecutorError;
pub use error::ToolError;
pub use executor::AgentExecutor;
pub use executor::AgentExecutorConfig;
pub use executor::RunOutcome;
pub use sandbox::FileOp;
pub use sandbox::SandboxValidator;
pub use sandbox::Verdict;
pub use sandbox::ViolationKind;
pub use sessions_meta::default_sessions_path;
pub use sessions_meta::load_sessions;
pub use sessions_meta::record_session;
pub use sessions_meta::SessionsMetaError;
pub use state::ExecutionState;
pub use state::ParentContext;
pub use state::RecursionCapExceeded;
pub use state::SessionState;
pub use state::TaskHistoryEntry;
pub use state::TaskOutcome;
pub use state::TaskState;
pub use subagent::SubagentError;
pub use subagent::SubagentLaunchRequest;
pub use subagent::SubagentLaunchResult;
pub use subagent::SubagentLauncher;
pub use subagent::SubagentTaskTool;
pub use tools::builtin;
pub use tools::Tool;
pub use tools::ToolContext;
pub use tools::ToolOutcome;
pub use tools::ToolRegistry;
pub use tools::ToolResult;
pub use wire::Wire;
pub use wire::WireSubscription;
