//! Shared data model for the Jimi agent execution core: messages, wire
//! events, agent/config records, and the streaming chat interface the
//! core consumes from an external LLM provider adapter.

pub mod agent_spec;
pub mod config;
pub mod llm;
pub mod message;
pub mod session_meta;
pub mod wire_event;

pub use agent_spec::AgentDefinition;
pub use agent_spec::AgentSpecFile;
pub use agent_spec::ToolAccess;
pub use config::ApprovalPolicy;
pub use config::CompactionPolicy;
pub use config::Limits;
pub use config::SandboxPolicy;
pub use config::ToolOutputBudget;
pub use llm::ChatClient;
pub use llm::ChatStream;
pub use llm::FinishReason;
pub use llm::LlmStreamError;
pub use llm::ModelCapacity;
pub use llm::StreamChunk;
pub use llm::Usage;
pub use message::ContentPart;
pub use message::Message;
pub use message::Role;
pub use message::ToolCall;
pub use session_meta::SessionMetadata;
pub use wire_event::WireMessage;
