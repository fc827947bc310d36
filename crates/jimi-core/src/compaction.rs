//! Compaction Strategy: summarizes the older portion of the context when
//! the token budget is exceeded, replacing it with a summary message while
//! retaining the active tail intact.

use jimi_protocol::ChatClient;
use jimi_protocol::CompactionPolicy;
use jimi_protocol::Message;
use jimi_protocol::ModelCapacity;
use jimi_protocol::Role;
use jimi_protocol::WireMessage;

use crate::context::CheckpointId;
use crate::context::Context;
use crate::error::CompactionError;
use crate::stream::run_stream_to_completion;
use crate::wire::Wire;

pub const SUMMARIZATION_PROMPT: &str = "\
Summarize the conversation so far for the purpose of continuing the task \
with a fresh, shorter context. Preserve concrete file paths, decisions \
made, and any unresolved tool results. Be concise but complete.";

/// Whether the context's current token count warrants compaction given the
/// model's capacity and the configured trigger fraction.
pub fn should_compact(token_count: u64, capacity: ModelCapacity, policy: CompactionPolicy) -> bool {
    let budget = capacity
        .context_window_tokens
        .saturating_sub(capacity.reserved_response_tokens);
    let threshold = (budget as f64 * policy.trigger_fraction as f64) as u64;
    token_count > threshold
}

/// Index of the first message in the "active tail": the latest user turn
/// and everything after it. Returns 0 (summarize nothing) if there is no
/// user message at all.
fn tail_boundary(messages: &[Message]) -> usize {
    messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .unwrap_or(0)
}

/// For every assistant tool-call before `boundary` whose matching tool
/// result message lies at or after `boundary`, produce a short restatement
/// line so the pairing survives the summary boundary without moving either
/// message.
fn restate_crossing_tool_calls(messages: &[Message], boundary: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for msg in &messages[..boundary] {
        let Some(calls) = &msg.tool_calls else { continue };
        for call in calls {
            let crossing_result = messages[boundary..]
                .iter()
                .find(|m| m.tool_call_id.as_deref() == Some(call.id.as_str()));
            if let Some(result) = crossing_result {
                lines.push(format!(
                    "- tool `{}` (id {}) previously returned: {}",
                    call.name,
                    call.id,
                    result.text()
                ));
            }
        }
    }
    lines
}

pub trait CompactionStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn generate_prompt(&self) -> &str {
        SUMMARIZATION_PROMPT
    }

    /// Builds the replacement message list given the full history and the
    /// LLM-generated summary text.
    fn build_compacted_history(&self, messages: &[Message], summary_text: &str) -> Vec<Message>;
}

/// The default strategy: keeps the latest user turn onward verbatim and
/// replaces everything before it with one summary message, restating any
/// tool-call/result pair that would otherwise be split by the boundary.
pub struct SimpleCompactionStrategy;

impl CompactionStrategy for SimpleCompactionStrategy {
    fn name(&self) -> &str {
        "simple"
    }

    fn build_compacted_history(&self, messages: &[Message], summary_text: &str) -> Vec<Message> {
        let boundary = tail_boundary(messages);
        let restated = restate_crossing_tool_calls(messages, boundary);

        let mut summary_text = summary_text.to_string();
        if !restated.is_empty() {
            summary_text.push_str("\n\nRestated tool calls:\n");
            summary_text.push_str(&restated.join("\n"));
        }

        let mut new_messages = vec![Message::system(format!(
            "[conversation summary]\n{summary_text}"
        ))];
        new_messages.extend_from_slice(&messages[boundary..]);
        new_messages
    }
}

/// Runs compaction if, and only if, the context is currently over budget.
/// Returns the checkpoint created at the summary boundary, or `None` if
/// compaction was a no-op.
pub async fn compact_if_needed(
    context: &mut Context,
    client: &dyn ChatClient,
    wire: &Wire,
    strategy: &dyn CompactionStrategy,
    policy: CompactionPolicy,
    retry_cap: u32,
) -> Result<Option<CheckpointId>, CompactionError> {
    let capacity = client.capacity();
    if !should_compact(context.token_count(), capacity, policy) {
        return Ok(None);
    }

    wire.send(WireMessage::CompactionBegin {
        token_count_before: context.token_count(),
        timestamp: chrono::Utc::now(),
    });

    let summary_message = run_stream_to_completion(
        client,
        strategy.generate_prompt(),
        context.messages(),
        &[],
        wire,
        retry_cap,
    )
    .await
    .map_err(|e| CompactionError::Summarization(e.to_string()))?;

    let new_messages = strategy.build_compacted_history(context.messages(), &summary_message.text());
    let new_token_count: u64 = new_messages.iter().map(Message::estimated_tokens).sum();

    context
        .replace_messages(new_messages, new_token_count)
        .await
        .map_err(CompactionError::Context)?;
    let checkpoint_id = context.checkpoint(true);

    wire.send(WireMessage::CompactionEnd {
        token_count_after: context.token_count(),
        checkpoint_id,
        timestamp: chrono::Utc::now(),
    });

    Ok(Some(checkpoint_id))
}
