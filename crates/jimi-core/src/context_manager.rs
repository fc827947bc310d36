//! Context Manager: pre-step housekeeping run by the Executor before every
//! LLM call — compaction check, checkpointing, then optional knowledge/skill
//! injection for that call only.

use jimi_protocol::ChatClient;
use jimi_protocol::CompactionPolicy;
use jimi_protocol::Message;

use crate::compaction;
use crate::compaction::CompactionStrategy;
use crate::context::CheckpointId;
use crate::context::Context;
use crate::error::CompactionError;
use crate::wire::Wire;

/// Seam for external skill/knowledge injection. Non-goal: the hook
/// *system* (YAML-defined hooks, priorities, phases) lives outside the core;
/// this is only the callback contract the Context Manager invokes.
pub trait ContextHook: Send + Sync {
    /// Returns additional system-level guidance to prepend to the upcoming
    /// LLM call, or `None` to contribute nothing. Never persisted to the
    /// Context itself.
    fn before_step(&self, context: &Context) -> Option<String>;
}

pub struct ContextManager {
    retry_cap: u32,
}

/// What [`ContextManager::prepare_step`] produced: any checkpoint created by
/// compaction, and the ephemeral system messages to prepend to this call's
/// history (not persisted).
pub struct PreparedStep {
    pub compaction_checkpoint: Option<CheckpointId>,
    pub ephemeral_system_messages: Vec<Message>,
}

impl ContextManager {
    pub fn new(retry_cap: u32) -> Self {
        Self { retry_cap }
    }

    /// Runs the three pre-step duties in order: compaction, checkpoint,
    /// hook injection.
    pub async fn prepare_step(
        &self,
        context: &mut Context,
        client: &dyn ChatClient,
        wire: &Wire,
        compaction_strategy: &dyn CompactionStrategy,
        compaction_policy: CompactionPolicy,
        hooks: &[Box<dyn ContextHook>],
    ) -> Result<PreparedStep, CompactionError> {
        let compaction_checkpoint = compaction::compact_if_needed(
            context,
            client,
            wire,
            compaction_strategy,
            compaction_policy,
            self.retry_cap,
        )
        .await?;

        context.checkpoint(false);

        let ephemeral_system_messages = hooks
            .iter()
            .filter_map(|hook| hook.before_step(context))
            .map(Message::system)
            .collect();

        Ok(PreparedStep {
            compaction_checkpoint,
            ephemeral_system_messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::SimpleCompactionStrategy;
    use jimi_protocol::FinishReason;
    use jimi_protocol::LlmStreamError;
    use jimi_protocol::ModelCapacity;
    use jimi_protocol::StreamChunk;
    use tempfile::tempdir;

    struct StubHook(Option<&'static str>);
    impl ContextHook for StubHook {
        fn before_step(&self, _context: &Context) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    struct StubStream {
        chunks: Vec<StreamChunk>,
    }
    #[async_trait::async_trait]
    impl jimi_protocol::ChatStream for StubStream {
        async fn next_chunk(&mut self) -> Result<Option<StreamChunk>, LlmStreamError> {
            Ok(self.chunks.pop())
        }
    }

    struct StubClient {
        capacity: ModelCapacity,
    }
    #[async_trait::async_trait]
    impl ChatClient for StubClient {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn capacity(&self) -> ModelCapacity {
            self.capacity
        }
        async fn stream(
            &self,
            _system_prompt: &str,
            _history: &[Message],
            _tool_schemas: &[serde_json::Value],
        ) -> Result<Box<dyn jimi_protocol::ChatStream>, LlmStreamError> {
            Ok(Box::new(StubStream {
                chunks: vec![
                    StreamChunk::Finish {
                        reason: FinishReason::Stop,
                        usage: None,
                    },
                    StreamChunk::ContentDelta("a summary".to_string()),
                ],
            }))
        }
    }

    #[tokio::test]
    async fn injects_hook_content_without_persisting_it() {
        let dir = tempdir().unwrap();
        let mut context = Context::create(dir.path().join("h.jsonl")).await.unwrap();
        context.append_message(Message::user("hi")).await.unwrap();

        let manager = ContextManager::new(1);
        let client = StubClient {
            capacity: ModelCapacity {
                context_window_tokens: 1_000_000,
                reserved_response_tokens: 1000,
            },
        };
        let wire = Wire::new();
        let strategy = SimpleCompactionStrategy;
        let hooks: Vec<Box<dyn ContextHook>> = vec![Box::new(StubHook(Some("extra guidance")))];

        let prepared = manager
            .prepare_step(
                &mut context,
                &client,
                &wire,
                &strategy,
                CompactionPolicy { trigger_fraction: 0.75 },
                &hooks,
            )
            .await
            .unwrap();

        assert_eq!(prepared.ephemeral_system_messages.len(), 1);
        assert_eq!(prepared.ephemeral_system_messages[0].text(), "extra guidance");
        // Never written to the durable context.
        assert_eq!(context.message_count(), 1);
    }

    #[tokio::test]
    async fn records_a_checkpoint_every_call() {
        let dir = tempdir().unwrap();
        let mut context = Context::create(dir.path().join("h.jsonl")).await.unwrap();
        context.append_message(Message::user("hi")).await.unwrap();

        let manager = ContextManager::new(1);
        let client = StubClient {
            capacity: ModelCapacity {
                context_window_tokens: 1_000_000,
                reserved_response_tokens: 1000,
            },
        };
        let wire = Wire::new();
        let strategy = SimpleCompactionStrategy;
        let hooks: Vec<Box<dyn ContextHook>> = Vec::new();

        assert_eq!(context.checkpoint_count(), 0);
        manager
            .prepare_step(
                &mut context,
                &client,
                &wire,
                &strategy,
                CompactionPolicy { trigger_fraction: 0.75 },
                &hooks,
            )
            .await
            .unwrap();
        assert_eq!(context.checkpoint_count(), 1);
    }
}
