//! Conversation Context: the durable, ordered, checkpointed message log.
//!
//! Exactly one Executor owns each Context instance. The backing file is
//! opened append-only for the Context's lifetime (single-writer), matching
//! the "unchecked concurrent writers" design note: restore reads lines
//! defensively, ignoring a trailing partial line left by a prior crash.

mod checkpoint;

pub use checkpoint::CheckpointId;

use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;

use jimi_protocol::Message;
use tokio::fs::File;
use tokio::fs::OpenOptions;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;

use crate::error::ContextError;

/// Maximum number of key insights retained; oldest is evicted first.
const MAX_KEY_INSIGHTS: usize = 20;

pub struct Context {
    messages: Vec<Message>,
    token_count: u64,
    /// Message-count position recorded at each checkpoint; index is the id.
    checkpoints: Vec<usize>,
    high_level_intent: Option<String>,
    key_insights: VecDeque<String>,
    backing_file: File,
    backing_path: PathBuf,
}

impl Context {
    /// Creates a fresh, empty Context backed by a new append-only file at
    /// `path`. Fails if a file already exists there; use [`Context::restore`]
    /// to reopen an existing history.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, ContextError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;
        Ok(Self {
            messages: Vec::new(),
            token_count: 0,
            checkpoints: Vec::new(),
            high_level_intent: None,
            key_insights: VecDeque::new(),
            backing_file: file,
            backing_path: path,
        })
    }

    /// Rebuilds in-memory state from the backing file, yielding the longest
    /// durably persisted prefix. A trailing partial line (a prior crash
    /// mid-write) is dropped rather than failing the restore.
    pub async fn restore(path: impl AsRef<Path>) -> Result<Self, ContextError> {
        let path = path.as_ref().to_path_buf();
        let read_handle = OpenOptions::new().read(true).create(true).open(&path).await?;
        let mut reader = BufReader::new(read_handle);
        let mut messages = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                break;
            }
            let ends_with_newline = line.ends_with('\n');
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(trimmed) {
                Ok(msg) => messages.push(msg),
                Err(err) if !ends_with_newline => {
                    // Trailing partial line from a crash mid-write; drop it.
                    tracing::warn!(error = %err, "dropping trailing partial history line on restore");
                    break;
                }
                Err(err) => return Err(ContextError::MalformedLine(err.to_string())),
            }
        }

        let token_count = messages.iter().map(Message::estimated_tokens).sum();
        let file = OpenOptions::new().append(true).create(true).open(&path).await?;

        Ok(Self {
            messages,
            token_count,
            checkpoints: Vec::new(),
            high_level_intent: None,
            key_insights: VecDeque::new(),
            backing_file: file,
            backing_path: path,
        })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// Appends `message`, serializing it as one JSON line to the backing
    /// file and incrementally updating the token estimate.
    pub async fn append_message(&mut self, message: Message) -> Result<(), ContextError> {
        let mut line = serde_json::to_string(&message).map_err(|e| ContextError::MalformedLine(e.to_string()))?;
        line.push('\n');
        self.backing_file.write_all(line.as_bytes()).await?;
        self.backing_file.flush().await?;
        self.token_count += message.estimated_tokens();
        self.messages.push(message);
        Ok(())
    }

    /// Authoritative override from the LLM's reported usage.
    pub fn update_token_count(&mut self, n: u64) {
        self.token_count = n;
    }

    /// Records the current length as a checkpoint. If `force` is false and
    /// the previous checkpoint already marks the same length, returns the
    /// prior id instead of creating a new one.
    pub fn checkpoint(&mut self, force: bool) -> CheckpointId {
        let current_len = self.messages.len();
        if !force {
            if let Some(&last_len) = self.checkpoints.last() {
                if last_len == current_len {
                    return (self.checkpoints.len() - 1) as CheckpointId;
                }
            }
        }
        self.checkpoints.push(current_len);
        (self.checkpoints.len() - 1) as CheckpointId
    }

    /// Truncates the message sequence (and backing file) back to the
    /// position recorded at `id`, atomically, discarding later checkpoints.
    /// High-level-intent and key-insights are preserved.
    pub async fn revert_to(&mut self, id: CheckpointId) -> Result<(), ContextError> {
        let idx = usize::try_from(id).map_err(|_| ContextError::UnknownCheckpoint(id))?;
        let target_len = *self
            .checkpoints
            .get(idx)
            .ok_or(ContextError::UnknownCheckpoint(id))?;

        self.messages.truncate(target_len);
        self.token_count = self.messages.iter().map(Message::estimated_tokens).sum();
        self.checkpoints.truncate(idx + 1);
        self.rewrite_backing_file().await
    }

    /// Atomically rewrites the backing file to match the in-memory message
    /// sequence: write a sibling temp file, then rename it into place.
    async fn rewrite_backing_file(&mut self) -> Result<(), ContextError> {
        let tmp_path = self.backing_path.with_extension("tmp-rewrite");
        {
            let mut tmp_file = File::create(&tmp_path).await?;
            for message in &self.messages {
                let mut line =
                    serde_json::to_string(message).map_err(|e| ContextError::MalformedLine(e.to_string()))?;
                line.push('\n');
                tmp_file.write_all(line.as_bytes()).await?;
            }
            tmp_file.flush().await?;
        }
        tokio::fs::rename(&tmp_path, &self.backing_path).await?;
        self.backing_file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.backing_path)
            .await?;
        Ok(())
    }

    /// Replaces the entire message sequence (e.g. after compaction),
    /// atomically rewriting the backing file and resetting checkpoints
    /// since prior positions no longer correspond to valid offsets.
    pub async fn replace_messages(&mut self, messages: Vec<Message>, token_count: u64) -> Result<(), ContextError> {
        self.messages = messages;
        self.token_count = token_count;
        self.checkpoints.clear();
        self.rewrite_backing_file().await
    }

    pub fn add_key_insight(&mut self, insight: impl Into<String>) {
        if self.key_insights.len() >= MAX_KEY_INSIGHTS {
            self.key_insights.pop_front();
        }
        self.key_insights.push_back(insight.into());
    }

    pub fn recent_insights(&self, n: usize) -> Vec<String> {
        let skip = self.key_insights.len().saturating_sub(n);
        self.key_insights.iter().skip(skip).cloned().collect()
    }

    pub fn set_high_level_intent(&mut self, intent: impl Into<String>) {
        self.high_level_intent = Some(intent.into());
    }

    pub fn high_level_intent(&self) -> Option<&str> {
        self.high_level_intent.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jimi_protocol::ToolCall;
    use tempfile::tempdir;

    #[tokio::test]
    async fn durability_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.jsonl");

        let mut ctx = Context::create(&path).await.unwrap();
        ctx.append_message(Message::user("hello")).await.unwrap();
        ctx.append_message(Message::assistant("hi there")).await.unwrap();
        ctx.update_token_count(42);

        let restored = Context::restore(&path).await.unwrap();
        assert_eq!(restored.messages(), ctx.messages());
        // update_token_count is an in-session override, not persisted to the
        // file; restore recomputes from the estimate, matching the contract
        // that durability covers the message sequence written via append.
        assert_eq!(restored.message_count(), 2);
    }

    #[tokio::test]
    async fn checkpoint_ids_are_monotonic_and_force_false_dedupes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut ctx = Context::create(&path).await.unwrap();

        ctx.append_message(Message::user("hi")).await.unwrap();
        let id0 = ctx.checkpoint(false);
        let id0_again = ctx.checkpoint(false);
        assert_eq!(id0, 0);
        assert_eq!(id0_again, 0, "no new messages since last checkpoint: id reused");

        ctx.append_message(Message::assistant("hello")).await.unwrap();
        let id1 = ctx.checkpoint(false);
        assert_eq!(id1, 1);
        assert!(id1 > id0);
    }

    #[tokio::test]
    async fn force_checkpoint_always_creates_a_new_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut ctx = Context::create(&path).await.unwrap();
        ctx.append_message(Message::user("hi")).await.unwrap();
        let id0 = ctx.checkpoint(true);
        let id1 = ctx.checkpoint(true);
        assert_ne!(id0, id1);
    }

    #[tokio::test]
    async fn revert_to_restores_exact_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut ctx = Context::create(&path).await.unwrap();

        ctx.append_message(Message::user("hi")).await.unwrap();
        let checkpoint0 = ctx.checkpoint(true);

        ctx.append_message(Message::assistant("working on it")).await.unwrap();
        ctx.append_message(Message::user("more context")).await.unwrap();
        assert_eq!(ctx.message_count(), 3);

        ctx.revert_to(checkpoint0).await.unwrap();
        assert_eq!(ctx.message_count(), 1);
        assert_eq!(ctx.messages()[0].text(), "hi");

        let restored = Context::restore(&path).await.unwrap();
        assert_eq!(restored.message_count(), 1);
    }

    #[tokio::test]
    async fn revert_discards_later_checkpoints() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut ctx = Context::create(&path).await.unwrap();
        ctx.append_message(Message::user("a")).await.unwrap();
        let cp0 = ctx.checkpoint(true);
        ctx.append_message(Message::user("b")).await.unwrap();
        ctx.checkpoint(true);
        ctx.append_message(Message::user("c")).await.unwrap();
        ctx.checkpoint(true);
        assert_eq!(ctx.checkpoint_count(), 3);

        ctx.revert_to(cp0).await.unwrap();
        assert_eq!(ctx.checkpoint_count(), 1);
    }

    #[tokio::test]
    async fn tool_pair_invariant_holds_after_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut ctx = Context::create(&path).await.unwrap();

        let call = ToolCall {
            id: "call-1".to_string(),
            name: "read_file".to_string(),
            arguments_json: "{}".to_string(),
        };
        ctx.append_message(Message::assistant_with_tool_calls(String::new(), vec![call.clone()]))
            .await
            .unwrap();
        ctx.append_message(Message::tool_result(&call.id, "ok")).await.unwrap();

        let tool_call_ids: Vec<&str> = ctx
            .messages()
            .iter()
            .filter_map(|m| m.tool_calls.as_ref())
            .flatten()
            .map(|c| c.id.as_str())
            .collect();
        for msg in ctx.messages() {
            if let Some(id) = &msg.tool_call_id {
                assert!(tool_call_ids.contains(&id.as_str()));
            }
        }
    }

    #[tokio::test]
    async fn key_insights_are_fifo_capped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut ctx = Context::create(&path).await.unwrap();

        for i in 0..25 {
            ctx.add_key_insight(format!("insight-{i}"));
        }
        let recent = ctx.recent_insights(3);
        assert_eq!(recent, vec!["insight-22", "insight-23", "insight-24"]);
    }

    #[tokio::test]
    async fn restore_drops_trailing_partial_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut ctx = Context::create(&path).await.unwrap();
        ctx.append_message(Message::user("good line")).await.unwrap();
        drop(ctx);

        // Simulate a crash mid-write: append a truncated JSON line with no trailing newline.
        {
            let mut file = OpenOptions::new().append(true).open(&path).await.unwrap();
            file.write_all(b"{\"role\":\"user\",\"conte").await.unwrap();
        }

        let restored = Context::restore(&path).await.unwrap();
        assert_eq!(restored.message_count(), 1);
    }
}
