//! Agent spec record: the already-parsed form of the YAML agent spec file
//! described in the external-interfaces section, plus [`AgentSpecFile`], the
//! raw on-disk shape a host deserializes YAML into before resolving it.
//! Reading the file system, custom commands, hooks and skills are external
//! consumers; this module only defines the validated record the core
//! accepts plus the placeholder-substitution helper for system prompts.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// A tool whitelist: either every registered tool, or an explicit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAccess {
    All,
    List(Vec<String>),
}

impl Default for ToolAccess {
    fn default() -> Self {
        ToolAccess::All
    }
}

impl ToolAccess {
    pub fn allows(&self, tool_name: &str) -> bool {
        match self {
            ToolAccess::All => true,
            ToolAccess::List(names) => names.iter().any(|n| n == tool_name),
        }
    }
}

/// Reference to a sub-agent spec reachable from a parent agent's `Task` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentRef {
    pub path: String,
    pub description: String,
}

/// A resolved agent definition: the in-core counterpart of the on-disk YAML
/// agent spec file. `system_prompt` here is already the file's contents
/// after the loader has read `system_prompt_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    #[serde(default)]
    pub tools: ToolAccess,
    #[serde(default)]
    pub subagents: HashMap<String, SubagentRef>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
}

impl AgentDefinition {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("agent name cannot be empty".to_string());
        }
        if self.system_prompt.is_empty() {
            return Err("agent system_prompt cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        if self.disallowed_tools.iter().any(|t| t == tool_name) {
            return false;
        }
        self.tools.allows(tool_name)
    }
}

/// The on-disk YAML shape of an agent spec file:
/// `system_prompt_path` names a sibling file to be read by the loader, not
/// the prompt text itself. Reading that file and parsing the YAML are a
/// host's job (config loading is a non-goal); this struct only gives the
/// host a concrete type to deserialize into and a single place to turn the
/// result into an [`AgentDefinition`] once the prompt text is in hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpecFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt_path: String,
    #[serde(default)]
    pub tools: ToolAccess,
    #[serde(default)]
    pub subagents: HashMap<String, SubagentRef>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
}

impl AgentSpecFile {
    /// Combines this record with the already-read contents of
    /// `system_prompt_path` into a resolved [`AgentDefinition`]. Placeholder
    /// substitution on `system_prompt_text` is the caller's job, via
    /// [`substitute_placeholders`], before or after calling this.
    pub fn into_definition(self, system_prompt_text: impl Into<String>) -> AgentDefinition {
        AgentDefinition {
            name: self.name,
            description: self.description,
            system_prompt: system_prompt_text.into(),
            tools: self.tools,
            subagents: self.subagents,
            model: self.model,
            disallowed_tools: self.disallowed_tools,
        }
    }
}

/// Substitutes the fixed placeholder set in a system prompt template.
/// Unknown `{{...}}` placeholders are left untouched.
pub fn substitute_placeholders(
    template: &str,
    now: &str,
    work_dir: &str,
    work_dir_ls: &str,
    agents_md: &str,
) -> String {
    template
        .replace("{{JIMI_NOW}}", now)
        .replace("{{JIMI_WORK_DIR_LS}}", work_dir_ls)
        .replace("{{JIMI_WORK_DIR}}", work_dir)
        .replace("{{JIMI_AGENTS_MD}}", agents_md)
}
