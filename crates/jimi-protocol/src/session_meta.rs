//! Record shape for `~/.jimi/sessions.json`. The core only reads this file
//! when explicitly asked to restore a session; enumerating and presenting
//! restorable sessions is a front-end concern.

use serde::Deserialize;
use serde::Serialize;

/// Maximum number of sessions retained in the metadata file.
pub const MAX_SESSIONS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    pub id: String,
    pub work_dir: String,
    pub history_file: String,
    pub agent_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
}

/// Inserts or updates `entry` by id, keeping the list sorted newest-first by
/// `accessed_at` and capped at [`MAX_SESSIONS`].
pub fn upsert_session(mut sessions: Vec<SessionMetadata>, entry: SessionMetadata) -> Vec<SessionMetadata> {
    sessions.retain(|s| s.id != entry.id);
    sessions.push(entry);
    sessions.sort_by(|a, b| b.accessed_at.cmp(&a.accessed_at));
    sessions.truncate(MAX_SESSIONS);
    sessions
}
