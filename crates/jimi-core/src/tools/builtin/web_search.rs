//! Web search tool behind a provider seam. Concrete search providers (a real
//! search API) are an external collaborator; this module defines only the
//! trait and a deterministic stub used by default and by tests.

use async_trait::async_trait;
use serde::Deserialize;

use crate::approval::ApprovalDecision;
use crate::sandbox::SandboxValidator;
use crate::sandbox::Verdict;
use crate::tools::truncate_output;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolOutcome;
use crate::tools::ToolResult;

/// One search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A pluggable search backend. The core ships no real implementation; a host
/// binary wires in whichever search API it has credentials for.
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String>;
}

/// Deterministic provider used when no real backend is configured, and in
/// tests: echoes the query back as a single, clearly-labeled hit.
pub struct StubWebSearchProvider;

#[async_trait]
impl WebSearchProvider for StubWebSearchProvider {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String> {
        Ok(vec![SearchHit {
            title: format!("(stub result for: {query})"),
            url: "about:blank".to_string(),
            snippet: "No live search provider is configured for this session.".to_string(),
        }])
    }
}

pub struct WebSearchTool {
    provider: Box<dyn WebSearchProvider>,
}

impl WebSearchTool {
    pub fn new(provider: Box<dyn WebSearchProvider>) -> Self {
        Self { provider }
    }
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Searches the web for a query and returns the top results as title/url/snippet entries."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The search query." },
            },
            "required": ["query"],
            "additionalProperties": false,
        })
    }

    async fn execute(&self, args_json: &str, ctx: &ToolContext<'_>) -> ToolOutcome {
        let args: WebSearchArgs = match serde_json::from_str(args_json) {
            Ok(a) => a,
            Err(_) => {
                return ToolOutcome::new(ToolResult::error(
                    "failed to parse arguments",
                    "invalid arguments",
                ))
            }
        };

        // A search query implies an outbound network request to whatever
        // backend is configured; it goes through the same network gate as
        // an explicit URL fetch would.
        match SandboxValidator::check_url(ctx.sandbox_policy, "https://search-provider.invalid/") {
            Verdict::Denied { reason, .. } => {
                return ToolOutcome::new(ToolResult::error(reason, "sandbox denied"))
            }
            Verdict::RequiresApproval { reason, .. } => {
                let decision = ctx
                    .approval
                    .request(ctx.wire, "web_search", &args.query, &reason)
                    .await;
                if decision == ApprovalDecision::Reject {
                    return ToolOutcome::new(ToolResult::Rejected);
                }
            }
            Verdict::Allowed => {}
        }

        match self.provider.search(&args.query).await {
            Ok(hits) => {
                let rendered = hits
                    .iter()
                    .map(|h| format!("- {}\n  {}\n  {}", h.title, h.url, h.snippet))
                    .collect::<Vec<_>>()
                    .join("\n");
                let (text, brief) = truncate_output(&rendered, ctx.output_budget, "search results");
                ToolOutcome::new(ToolResult::ok(text, brief))
            }
            Err(err) => ToolOutcome::new(ToolResult::error(
                format!("search failed: {err}"),
                "external process error",
            )),
        }
    }
}
