//! Error taxonomy. Tool-level errors are absorbed into [`crate::tools::ToolResult`]
//! so the model can react; only step- and engine-level failures surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("io error persisting context: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed history line, skipping: {0}")]
    MalformedLine(String),
    #[error("checkpoint {0} does not exist")]
    UnknownCheckpoint(u64),
}

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("context error during compaction: {0}")]
    Context(#[from] ContextError),
    #[error("summarization stream failed: {0}")]
    Summarization(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments")]
    InvalidArguments,
    #[error("sandbox denied: {0}")]
    SandboxDenied(String),
    #[error("tool timed out")]
    Timeout,
    #[error("external process error: {0}")]
    External(String),
}

/// Failure taxonomy surfaced by the Executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("LLM client was not configured")]
    LlmNotSet,
    #[error("max_steps_per_run exceeded")]
    MaxStepsReached,
    #[error("run was cancelled")]
    RunCancelled,
    #[error("compaction failed: {0}")]
    CompactionFailed(#[from] CompactionError),
    #[error("tool dispatch failed: {0}")]
    ToolDispatchFailed(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}
