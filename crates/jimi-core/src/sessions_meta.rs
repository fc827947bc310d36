//! Read/write helpers for the sessions metadata file. Front-ends enumerate
//! it to offer restorable sessions; the core
//! itself only touches it when a host explicitly asks to record or look up
//! a session.

use std::path::Path;
use std::path::PathBuf;

use jimi_protocol::session_meta::upsert_session;
use jimi_protocol::SessionMetadata;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum SessionsMetaError {
    #[error("could not resolve a home directory")]
    NoHomeDir,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed sessions file: {0}")]
    Malformed(String),
}

/// Default location, `~/.jimi/sessions.json`. A host may pass any other
/// path to the functions below; this is only the fallback default.
pub fn default_sessions_path() -> Result<PathBuf, SessionsMetaError> {
    let home = dirs::home_dir().ok_or(SessionsMetaError::NoHomeDir)?;
    Ok(home.join(".jimi").join("sessions.json"))
}

/// Loads the session list from `path`, treating a missing file as empty
/// rather than an error (no session has ever been recorded yet).
pub async fn load_sessions(path: &Path) -> Result<Vec<SessionMetadata>, SessionsMetaError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) if contents.trim().is_empty() => Ok(Vec::new()),
        Ok(contents) => serde_json::from_str(&contents).map_err(|e| SessionsMetaError::Malformed(e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Upserts `entry` into the sessions file at `path`, creating the parent
/// directory if needed and rewriting the whole file via a sibling temp file
/// plus rename, the same crash-safe pattern the conversation history file
/// uses for its own full rewrites.
pub async fn record_session(path: &Path, entry: SessionMetadata) -> Result<(), SessionsMetaError> {
    let sessions = load_sessions(path).await?;
    let updated = upsert_session(sessions, entry);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(&updated).map_err(|e| SessionsMetaError::Malformed(e.to_string()))?;
    let tmp_path = path.with_extension("tmp-rewrite");
    {
        let mut tmp_file = File::create(&tmp_path).await?;
        tmp_file.write_all(json.as_bytes()).await?;
        tmp_file.flush().await?;
    }
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
