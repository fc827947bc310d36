//! Response Stream Processor: reduces an incremental LLM stream into one
//! completed assistant [`Message`], republishing deltas on the Wire as they
//! arrive and retrying transient transport errors with exponential backoff.

use std::collections::BTreeMap;
use std::time::Duration;

use jimi_protocol::ChatClient;
use jimi_protocol::ChatStream;
use jimi_protocol::FinishReason;
use jimi_protocol::LlmStreamError;
use jimi_protocol::Message;
use jimi_protocol::ToolCall;
use jimi_protocol::Usage;
use jimi_protocol::WireMessage;

use crate::wire::Wire;

/// In-progress tool-call accumulation keyed by id; `name` is first-delta-wins,
/// `arguments_json` deltas concatenate.
#[derive(Debug, Default, Clone)]
struct PendingToolCall {
    name: String,
    arguments_json: String,
    /// Order in which this id was first seen, so finish() emits tool calls
    /// in the order the model introduced them.
    first_seen_order: usize,
}

#[derive(Default)]
pub struct StreamAccumulator {
    content: String,
    reasoning: String,
    tool_calls: BTreeMap<String, PendingToolCall>,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one chunk into the accumulator, publishing the corresponding
    /// delta event on `wire` for content/reasoning deltas.
    pub fn accept(&mut self, chunk: jimi_protocol::StreamChunk, wire: &Wire) {
        use jimi_protocol::StreamChunk as C;
        match chunk {
            C::ContentDelta(text) => {
                wire.send(WireMessage::ContentPartDelta {
                    text: text.clone(),
                    timestamp: chrono::Utc::now(),
                });
                self.content.push_str(&text);
            }
            C::ReasoningDelta(text) => {
                wire.send(WireMessage::ReasoningPartDelta {
                    text: text.clone(),
                    timestamp: chrono::Utc::now(),
                });
                self.reasoning.push_str(&text);
            }
            C::ToolCallDelta {
                id,
                name_delta,
                args_delta,
            } => {
                let next_order = self.tool_calls.len();
                let entry = self.tool_calls.entry(id).or_insert_with(|| PendingToolCall {
                    name: String::new(),
                    arguments_json: String::new(),
                    first_seen_order: next_order,
                });
                if entry.name.is_empty() {
                    if let Some(name) = name_delta {
                        entry.name = name;
                    }
                }
                entry.arguments_json.push_str(&args_delta);
            }
            C::Finish { reason, usage } => {
                self.finish_reason = Some(reason);
                self.usage = usage;
            }
        }
    }

    /// Produces the final assistant Message once the stream has finished.
    pub fn finish(&self) -> Message {
        let mut ordered: Vec<(&String, &PendingToolCall)> = self.tool_calls.iter().collect();
        ordered.sort_by_key(|(_, call)| call.first_seen_order);
        let tool_calls: Vec<ToolCall> = ordered
            .into_iter()
            .map(|(id, call)| ToolCall {
                id: id.clone(),
                name: call.name.clone(),
                arguments_json: call.arguments_json.clone(),
            })
            .collect();

        if tool_calls.is_empty() {
            Message::assistant(self.content.clone())
        } else {
            let mut msg = Message::assistant_with_tool_calls(self.content.clone(), tool_calls);
            if !self.reasoning.is_empty() {
                msg.reasoning = Some(self.reasoning.clone());
            }
            msg
        }
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }
}

/// Drives one LLM stream to completion, retrying transport errors with
/// exponential backoff up to `retry_cap` attempts. A recoverable reset
/// restarts only the in-progress stream via `open_stream`, not the caller's
/// broader task.
pub async fn run_stream_to_completion(
    client: &dyn ChatClient,
    system_prompt: &str,
    history: &[Message],
    tool_schemas: &[serde_json::Value],
    wire: &Wire,
    retry_cap: u32,
) -> Result<Message, LlmStreamError> {
    let mut attempt = 0u32;
    loop {
        match try_stream_once(client, system_prompt, history, tool_schemas, wire).await {
            Ok(message) => return Ok(message),
            Err(err) => {
                attempt += 1;
                if attempt > retry_cap {
                    return Err(err);
                }
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt.min(10)));
                tracing::warn!(attempt, ?backoff, "retrying LLM stream after transport error");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn try_stream_once(
    client: &dyn ChatClient,
    system_prompt: &str,
    history: &[Message],
    tool_schemas: &[serde_json::Value],
    wire: &Wire,
) -> Result<Message, LlmStreamError> {
    let mut stream: Box<dyn ChatStream> = client.stream(system_prompt, history, tool_schemas).await?;
    let mut accumulator = StreamAccumulator::new();
    loop {
        match stream.next_chunk().await? {
            Some(chunk) => {
                let is_finish = matches!(chunk, jimi_protocol::StreamChunk::Finish { .. });
                accumulator.accept(chunk, wire);
                if is_finish {
                    return Ok(accumulator.finish());
                }
            }
            None => return Ok(accumulator.finish()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jimi_protocol::StreamChunk;

    #[test]
    fn text_deltas_concatenate() {
        let wire = Wire::new();
        let mut acc = StreamAccumulator::new();
        acc.accept(StreamChunk::ContentDelta("Hel".to_string()), &wire);
        acc.accept(StreamChunk::ContentDelta("lo".to_string()), &wire);
        assert_eq!(acc.finish().text(), "Hello");
    }

    #[test]
    fn tool_call_deltas_merge_by_id_name_first_delta_wins() {
        let wire = Wire::new();
        let mut acc = StreamAccumulator::new();
        acc.accept(
            StreamChunk::ToolCallDelta {
                id: "call-1".to_string(),
                name_delta: Some("read_file".to_string()),
                args_delta: "{\"path\":".to_string(),
            },
            &wire,
        );
        acc.accept(
            StreamChunk::ToolCallDelta {
                id: "call-1".to_string(),
                name_delta: Some("ignored_second_name".to_string()),
                args_delta: "\"/tmp/a\"}".to_string(),
            },
            &wire,
        );
        let msg = acc.finish();
        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments_json, "{\"path\":\"/tmp/a\"}");
    }

    #[test]
    fn tool_calls_ordered_by_first_appearance() {
        let wire = Wire::new();
        let mut acc = StreamAccumulator::new();
        acc.accept(
            StreamChunk::ToolCallDelta {
                id: "b".to_string(),
                name_delta: Some("second".to_string()),
                args_delta: "{}".to_string(),
            },
            &wire,
        );
        acc.accept(
            StreamChunk::ToolCallDelta {
                id: "a".to_string(),
                name_delta: Some("first".to_string()),
                args_delta: "{}".to_string(),
            },
            &wire,
        );
        let calls = acc.finish().tool_calls.unwrap();
        assert_eq!(calls[0].id, "b");
        assert_eq!(calls[1].id, "a");
    }

    #[tokio::test]
    async fn content_delta_publishes_on_wire() {
        let wire = Wire::new();
        let mut sub = wire.subscribe();
        let mut acc = StreamAccumulator::new();
        acc.accept(StreamChunk::ContentDelta("hi".to_string()), &wire);
        let ev = sub.recv().await;
        assert_matches::assert_matches!(ev, Some(WireMessage::ContentPartDelta { .. }));
    }
}
