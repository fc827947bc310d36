//! The streaming chat interface the core consumes.
//!
//! Concrete provider wire formats are out of scope for this subsystem; this
//! module defines only the seam a provider adapter must satisfy.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::message::Message;

/// Authoritative token usage reported by the provider at stream end, when
/// available. Overrides the byte-based estimate on the receiving Context.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
}

/// One incremental chunk of an in-flight LLM response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    ContentDelta(String),
    ReasoningDelta(String),
    ToolCallDelta {
        id: String,
        name_delta: Option<String>,
        args_delta: String,
    },
    Finish {
        reason: FinishReason,
        usage: Option<Usage>,
    },
}

/// A transport-level error from the streaming chat interface. The Response
/// Stream Processor retries these with exponential backoff up to a
/// configured cap per step.
#[derive(Debug, thiserror::Error)]
pub enum LlmStreamError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("stream timed out")]
    Timeout,
}

/// A boxed, ordered stream of chunks. A concrete transport yields these one
/// at a time; the processor folds them into a completed Message.
#[async_trait]
pub trait ChatStream: Send {
    /// Returns the next chunk, or `None` once the stream is exhausted after
    /// a `Finish` chunk has already been yielded.
    async fn next_chunk(&mut self) -> Result<Option<StreamChunk>, LlmStreamError>;
}

/// Capabilities of the selected model, needed for compaction thresholds and
/// `status()` reporting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelCapacity {
    pub context_window_tokens: u64,
    pub reserved_response_tokens: u64,
}

impl Default for ModelCapacity {
    fn default() -> Self {
        Self {
            context_window_tokens: 128_000,
            reserved_response_tokens: 2048,
        }
    }
}

/// The streaming chat client the core drives. A concrete provider adapter
/// (OpenAI/Anthropic/etc wire format) lives outside this subsystem.
#[async_trait]
pub trait ChatClient: Send + Sync {
    fn model_name(&self) -> &str;
    fn capacity(&self) -> ModelCapacity;

    /// Opens a stream for one step given the full message history and the
    /// JSON-schema tool specs available to this agent.
    async fn stream(
        &self,
        system_prompt: &str,
        history: &[Message],
        tool_schemas: &[serde_json::Value],
    ) -> Result<Box<dyn ChatStream>, LlmStreamError>;
}
