//! Sandbox Validator: a pure function from (operation, operand, policy) to
//! a verdict. No state, no I/O — callers pass in the policy each time.

use jimi_protocol::SandboxPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    DeniedPath,
    OutsideWorkspace,
    FileSizeExceeded,
    DangerousCommand,
    NotInWhitelist,
    DangerousRedirect,
    NetworkAccess,
    DeniedDomain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    RequiresApproval { reason: String, violation_kind: ViolationKind },
    Denied { reason: String, violation_kind: ViolationKind },
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Verdict::Denied { .. })
    }

    pub fn requires_approval(&self) -> bool {
        matches!(self, Verdict::RequiresApproval { .. })
    }
}

fn glob_matches(pattern: &str, candidate: &str) -> bool {
    // Minimal glob: '*' matches any run of characters, everything else literal.
    // Sufficient for the deny-list use case (e.g. "**/.env", "/etc/**").
    let regex_str = format!(
        "^{}$",
        regex::escape(pattern).replace(r"\*\*", ".*").replace(r"\*", "[^/]*")
    );
    regex::Regex::new(&regex_str)
        .map(|re| re.is_match(candidate))
        .unwrap_or(false)
}

const REDIRECT_DENY_PREFIXES: &[&str] = &["/dev/", "/etc/", "/usr/", "/System/"];

pub struct SandboxValidator;

impl SandboxValidator {
    /// Evaluates a filesystem path operation.
    pub fn check_path(policy: &SandboxPolicy, path: &str, op: FileOp, write_size_bytes: Option<u64>) -> Verdict {
        if policy.disabled {
            return Verdict::Allowed;
        }

        for glob in &policy.denied_path_globs {
            if glob_matches(glob, path) {
                return Verdict::Denied {
                    reason: format!("path matches denied pattern {glob}"),
                    violation_kind: ViolationKind::DeniedPath,
                };
            }
        }

        if op == FileOp::Read {
            return Verdict::Allowed;
        }

        let is_absolute = path.starts_with('/');
        let inside_workspace = match &policy.workspace_root {
            Some(root) => !is_absolute || path.starts_with(root.as_str()),
            None => !is_absolute,
        };
        let allow_listed = policy.write_allow_list.iter().any(|p| glob_matches(p, path));

        if !inside_workspace && !allow_listed {
            return Verdict::RequiresApproval {
                reason: format!("{path} is outside the workspace root"),
                violation_kind: ViolationKind::OutsideWorkspace,
            };
        }

        if op == FileOp::Write {
            if let (Some(max), Some(size)) = (policy.max_write_file_size_bytes, write_size_bytes) {
                if size > max {
                    return Verdict::Denied {
                        reason: format!("file size {size} exceeds max {max}"),
                        violation_kind: ViolationKind::FileSizeExceeded,
                    };
                }
            }
        }

        Verdict::Allowed
    }

    /// Evaluates a shell command string.
    pub fn check_command(policy: &SandboxPolicy, command: &str) -> Verdict {
        if policy.disabled {
            return Verdict::Allowed;
        }

        if !policy.dangerous_commands_allowed {
            for pattern in &policy.dangerous_command_patterns {
                if let Ok(re) = regex::Regex::new(pattern) {
                    if re.is_match(command) {
                        return Verdict::Denied {
                            reason: format!("command matches dangerous pattern {pattern}"),
                            violation_kind: ViolationKind::DangerousCommand,
                        };
                    }
                }
            }
        }

        for prefix in REDIRECT_DENY_PREFIXES {
            if command.contains(&format!("> {prefix}")) || command.contains(&format!(">{prefix}")) {
                return Verdict::Denied {
                    reason: format!("redirect into {prefix} is not permitted"),
                    violation_kind: ViolationKind::DangerousRedirect,
                };
            }
        }

        if !policy.command_whitelist.is_empty() {
            let first_token = command.split_whitespace().next().unwrap_or("");
            if !policy.command_whitelist.iter().any(|c| c == first_token) {
                return Verdict::RequiresApproval {
                    reason: format!("{first_token} is not in the command whitelist"),
                    violation_kind: ViolationKind::NotInWhitelist,
                };
            }
        }

        Verdict::Allowed
    }

    /// Evaluates a network destination URL.
    pub fn check_url(policy: &SandboxPolicy, url: &str) -> Verdict {
        if policy.disabled {
            return Verdict::Allowed;
        }

        let host = url
            .split("://")
            .nth(1)
            .unwrap_or(url)
            .split(['/', ':'])
            .next()
            .unwrap_or("");

        if policy.denied_domains.iter().any(|d| d == host || host.ends_with(&format!(".{d}"))) {
            return Verdict::Denied {
                reason: format!("{host} is a denied domain"),
                violation_kind: ViolationKind::DeniedDomain,
            };
        }

        if policy.network_disabled {
            return Verdict::RequiresApproval {
                reason: "external network access requires approval".to_string(),
                violation_kind: ViolationKind::NetworkAccess,
            };
        }

        Verdict::Allowed
    }
}
