//! In-process built-in tools: no external subprocess dependency beyond the
//! shell tool's own spawned command.

mod apply_patch;
mod read_file;
mod shell;
mod think;
mod todo_write;
mod web_fetch;
pub mod web_search;
mod write_file;

pub use apply_patch::ApplyPatchTool;
pub use read_file::ReadFileTool;
pub use shell::ShellTool;
pub use think::ThinkTool;
pub use todo_write::TodoWriteTool;
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;
pub use write_file::WriteFileTool;

use std::path::Path;
use std::path::PathBuf;

/// Resolves a tool-supplied path against the session working directory.
/// Absolute paths pass through unchanged; the Sandbox Validator is what
/// decides whether they're actually permitted.
pub(crate) fn resolve_path(work_dir: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        work_dir.join(candidate)
    }
}
