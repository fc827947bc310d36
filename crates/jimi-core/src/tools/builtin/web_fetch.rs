//! Fetches a single URL and returns its text content, converting HTML to
//! plain text. A single-URL-per-call contract rather than scanning a
//! free-form prompt for URLs.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::approval::ApprovalDecision;
use crate::sandbox::SandboxValidator;
use crate::sandbox::Verdict;
use crate::tools::Tool;
use crate::tools::ToolContext;
use crate::tools::ToolOutcome;
use crate::tools::ToolResult;

const FETCH_TIMEOUT_SECS: u64 = 20;
const USER_AGENT: &str = "jimi-agent/0.1";

pub struct WebFetchTool;

#[derive(Deserialize)]
struct WebFetchArgs {
    url: String,
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetches a URL and returns its content as plain text, converting HTML bodies via text extraction."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "An http:// or https:// URL to fetch." },
            },
            "required": ["url"],
            "additionalProperties": false,
        })
    }

    async fn execute(&self, args_json: &str, ctx: &ToolContext<'_>) -> ToolOutcome {
        let args: WebFetchArgs = match serde_json::from_str(args_json) {
            Ok(a) => a,
            Err(_) => {
                return ToolOutcome::new(ToolResult::error(
                    "failed to parse arguments",
                    "invalid arguments",
                ))
            }
        };

        if !args.url.starts_with("http://") && !args.url.starts_with("https://") {
            return ToolOutcome::new(ToolResult::error(
                "only http:// and https:// URLs are supported",
                "invalid arguments",
            ));
        }

        match SandboxValidator::check_url(ctx.sandbox_policy, &args.url) {
            Verdict::Denied { reason, .. } => {
                return ToolOutcome::new(ToolResult::error(reason, "sandbox denied"))
            }
            Verdict::RequiresApproval { reason, .. } => {
                let decision = ctx
                    .approval
                    .request(ctx.wire, "web_fetch", &args.url, &reason)
                    .await;
                if decision == ApprovalDecision::Reject {
                    return ToolOutcome::new(ToolResult::Rejected);
                }
            }
            Verdict::Allowed => {}
        }

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                return ToolOutcome::new(ToolResult::error(
                    format!("failed to build http client: {err}"),
                    "external process error",
                ))
            }
        };

        let response = match client.get(&args.url).send().await {
            Ok(response) => response,
            Err(err) => {
                return ToolOutcome::new(ToolResult::error(
                    format!("failed to fetch {}: {err}", args.url),
                    "fetch failed",
                ))
            }
        };

        if !response.status().is_success() {
            return ToolOutcome::new(ToolResult::error(
                format!("http error {} fetching {}", response.status(), args.url),
                "fetch failed",
            ));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return ToolOutcome::new(ToolResult::error(
                    format!("failed to read response body: {err}"),
                    "fetch failed",
                ))
            }
        };

        let text = if content_type.contains("text/html") {
            html2text::from_read(body.as_bytes(), usize::MAX)
        } else {
            body
        };

        let (truncated, brief) = crate::tools::truncate_output(&text, ctx.output_budget, "fetched");
        ToolOutcome::new(ToolResult::ok(truncated, brief))
    }
}
