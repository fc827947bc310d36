//! Agent Executor: the main step loop. Drives one task from the initial
//! user input to completion (or failure/cancellation), dispatching tool
//! calls and the `task` sub-agent call in between LLM calls.
//!
//! State machine: Idle -> Preparing -> AwaitingLLM ->
//! ProcessingResponse -> (DispatchingTools | Finished), with Cancelled and
//! Failed reachable from every state. The loop body below is that machine
//! unrolled; there is no separate enum, since every state transitions
//! unconditionally into the next except at the two branch points (tool
//! calls present, or not; force-finish reached, or not).

use std::path::PathBuf;
use std::sync::Arc;

use jimi_protocol::AgentDefinition;
use jimi_protocol::ChatClient;
use jimi_protocol::CompactionPolicy;
use jimi_protocol::Limits;
use jimi_protocol::Message;
use jimi_protocol::Role;
use jimi_protocol::SandboxPolicy;
use jimi_protocol::ToolCall;
use jimi_protocol::ToolOutputBudget;
use jimi_protocol::WireMessage;
use tokio_util::sync::CancellationToken;

use crate::compaction::CompactionStrategy;
use crate::context::Context;
use crate::context_manager::ContextHook;
use crate::context_manager::ContextManager;
use crate::error::ExecutorError;
use crate::state::ExecutionState;
use crate::state::ParentContext;
use crate::state::TaskOutcome;
use crate::stream;
use crate::subagent::build_recap_message;
use crate::subagent::SubagentLaunchRequest;
use crate::subagent::SubagentLauncher;
use crate::subagent::SubagentTaskArgs;
use crate::subagent::TASK_TOOL_NAME;
use crate::tools::ToolContext;
use crate::tools::ToolRegistry;
use crate::tools::ToolResult;
use crate::wire::Wire;

/// The high-level intent recorded for a task is truncated to this many
/// characters; it's a label for humans skimming history, not the full query.
const INTENT_SNIPPET_MAX_CHARS: usize = 200;

/// What a completed `run()` returns on success: the final assistant text.
pub struct RunOutcome {
    pub final_text: String,
}

pub struct AgentExecutor {
    agent: AgentDefinition,
    client: Arc<dyn ChatClient>,
    tools: ToolRegistry,
    approval: Arc<crate::approval::ApprovalGate>,
    wire: Arc<Wire>,
    compaction_strategy: Box<dyn CompactionStrategy>,
    context_manager: ContextManager,
    hooks: Vec<Box<dyn ContextHook>>,
    limits: Limits,
    compaction_policy: CompactionPolicy,
    sandbox_policy: SandboxPolicy,
    tool_output_budget: ToolOutputBudget,
    cancellation: CancellationToken,
    work_dir: PathBuf,
    is_subagent: bool,
    subagent_launcher: Option<Arc<dyn SubagentLauncher>>,
    pub context: Context,
    pub state: ExecutionState,
}

/// Everything [`AgentExecutor::new`] needs beyond the Context/ExecutionState
/// it owns from then on. Grouped into one struct since most fields are
/// cross-cutting collaborators rather than step-local data.
pub struct AgentExecutorConfig {
    pub agent: AgentDefinition,
    pub client: Arc<dyn ChatClient>,
    pub tools: ToolRegistry,
    pub approval: Arc<crate::approval::ApprovalGate>,
    pub wire: Arc<Wire>,
    pub compaction_strategy: Box<dyn CompactionStrategy>,
    pub hooks: Vec<Box<dyn ContextHook>>,
    pub limits: Limits,
    pub compaction_policy: CompactionPolicy,
    pub sandbox_policy: SandboxPolicy,
    pub tool_output_budget: ToolOutputBudget,
    pub cancellation: CancellationToken,
    pub work_dir: PathBuf,
    pub is_subagent: bool,
    pub subagent_launcher: Option<Arc<dyn SubagentLauncher>>,
}

impl AgentExecutor {
    /// The selected model's context window, for a host computing a usage
    /// percentage from `context.token_count()` without reaching into the
    /// client directly.
    pub fn model_capacity(&self) -> jimi_protocol::ModelCapacity {
        self.client.capacity()
    }

    pub fn new(config: AgentExecutorConfig, context: Context, state: ExecutionState) -> Self {
        Self {
            agent: config.agent,
            client: config.client,
            tools: config.tools,
            approval: config.approval,
            wire: config.wire,
            compaction_strategy: config.compaction_strategy,
            context_manager: ContextManager::new(config.limits.stream_retry_cap),
            hooks: config.hooks,
            limits: config.limits,
            compaction_policy: config.compaction_policy,
            sandbox_policy: config.sandbox_policy,
            tool_output_budget: config.tool_output_budget,
            cancellation: config.cancellation,
            work_dir: config.work_dir,
            is_subagent: config.is_subagent,
            subagent_launcher: config.subagent_launcher,
            context,
            state,
        }
    }

    /// Tool names this agent may call: the registry's capability set,
    /// narrowed by the agent's whitelist/disallow list, plus `task` when the
    /// agent declares any sub-agents and a launcher is actually wired in.
    fn allowed_tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .all_names()
            .into_iter()
            .filter(|name| self.agent.is_tool_allowed(name))
            .collect();
        names.sort();
        if !self.agent.subagents.is_empty() && self.subagent_launcher.is_some() {
            names.push(TASK_TOOL_NAME.to_string());
        }
        names
    }

    fn tool_ctx(&self) -> ToolContext<'_> {
        ToolContext {
            work_dir: &self.work_dir,
            sandbox_policy: &self.sandbox_policy,
            approval: &self.approval,
            wire: &self.wire,
            output_budget: self.tool_output_budget,
            tool_timeout_secs: self.limits.tool_timeout_secs,
        }
    }

    fn check_cancelled(&mut self) -> Result<(), ExecutorError> {
        if self.cancellation.is_cancelled() {
            self.wire.send(WireMessage::StepInterrupted {
                reason: "cancelled".to_string(),
                timestamp: chrono::Utc::now(),
            });
            self.state.record_task_finished(TaskOutcome::Failed);
            return Err(ExecutorError::RunCancelled);
        }
        Ok(())
    }

    /// Runs one task to completion: appends `user_input`, then loops
    /// Preparing -> AwaitingLLM -> ProcessingResponse -> DispatchingTools
    /// until the model stops calling tools (Finished) or a limit/cancellation
    /// ends the run early (Failed).
    pub async fn run(&mut self, user_input: &str) -> Result<RunOutcome, ExecutorError> {
        self.state.initialize_task(user_input);
        let intent: String = user_input.chars().take(INTENT_SNIPPET_MAX_CHARS).collect();
        self.context.set_high_level_intent(intent);
        self.context
            .append_message(Message::user(user_input))
            .await
            .map_err(|e| ExecutorError::InternalError(e.to_string()))?;

        loop {
            self.check_cancelled()?;

            let global_step = self.state.increment_step();
            if global_step > self.limits.max_steps_per_run {
                self.state.record_task_finished(TaskOutcome::Failed);
                return Err(ExecutorError::MaxStepsReached);
            }

            self.wire.send(WireMessage::StepBegin {
                global_step,
                is_subagent: self.is_subagent,
                agent_name: self.agent.name.clone(),
                timestamp: chrono::Utc::now(),
            });

            let prepared = self
                .context_manager
                .prepare_step(
                    &mut self.context,
                    self.client.as_ref(),
                    &self.wire,
                    self.compaction_strategy.as_ref(),
                    self.compaction_policy,
                    &self.hooks,
                )
                .await?;

            let allowed = self.allowed_tool_names();
            let tool_schemas = self.tools.schemas_for(&allowed);

            let mut call_history = prepared.ephemeral_system_messages;
            call_history.extend(self.context.messages().iter().cloned());

            let assistant_msg = stream::run_stream_to_completion(
                self.client.as_ref(),
                &self.agent.system_prompt,
                &call_history,
                &tool_schemas,
                &self.wire,
                self.limits.stream_retry_cap,
            )
            .await
            .map_err(|e| {
                self.wire.send(WireMessage::StepInterrupted {
                    reason: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                ExecutorError::InternalError(format!("LLM stream failed: {e}"))
            })?;

            self.context
                .append_message(assistant_msg.clone())
                .await
                .map_err(|e| ExecutorError::InternalError(e.to_string()))?;

            match assistant_msg.tool_calls.clone() {
                None => {
                    if self.finish_if_done(&assistant_msg) {
                        return Ok(RunOutcome {
                            final_text: assistant_msg.text(),
                        });
                    }
                    continue;
                }
                Some(calls) if calls.is_empty() => {
                    if self.finish_if_done(&assistant_msg) {
                        return Ok(RunOutcome {
                            final_text: assistant_msg.text(),
                        });
                    }
                    continue;
                }
                Some(calls) => {
                    self.state.reset_no_tool_call_counter();
                    for call in &calls {
                        self.check_cancelled()?;
                        self.wire.send(WireMessage::ToolCallAnnounced {
                            tool_call: call.clone(),
                            timestamp: chrono::Utc::now(),
                        });
                        if call.name == TASK_TOOL_NAME {
                            self.dispatch_subagent_call(call).await?;
                        } else {
                            self.dispatch_tool_call(call, &allowed).await?;
                        }
                    }
                }
            }
        }
    }

    /// Applies the no-tool-call / force-finish rule: returns
    /// `true` when the run should end now, having bumped the consecutive
    /// counter either way.
    fn finish_if_done(&mut self, assistant_msg: &Message) -> bool {
        let count = self.state.increment_no_tool_call_counter();
        let forced = count >= self.limits.max_thinking_steps;
        if forced || !assistant_msg.text().is_empty() {
            self.state.record_task_finished(TaskOutcome::Success);
            true
        } else {
            false
        }
    }

    async fn dispatch_tool_call(&mut self, call: &ToolCall, allowed: &[String]) -> Result<(), ExecutorError> {
        let ctx = self.tool_ctx();
        let outcome = self.tools.execute(&call.name, &call.arguments_json, &ctx, allowed).await;

        let result = outcome.result.unwrap_or(ToolResult::error("tool produced no result", "internal error"));
        self.wire.send(WireMessage::ToolResult {
            tool_call_id: call.id.clone(),
            brief: match &result {
                ToolResult::Ok { brief, .. } | ToolResult::Error { brief, .. } => brief.clone(),
                ToolResult::Rejected => "rejected".to_string(),
            },
            is_error: result.is_error(),
            timestamp: chrono::Utc::now(),
        });

        self.context
            .append_message(Message::tool_result(&call.id, result.as_message_text()))
            .await
            .map_err(|e| ExecutorError::InternalError(e.to_string()))?;

        self.state.record_tool_used(&call.name);
        for path in outcome.modified_files {
            self.state.record_modified_file(path);
        }
        Ok(())
    }

    /// The ReCAP path: push a frame, run the child, pop it, revert
    /// the parent context to the checkpoint recorded before the child
    /// started, and replace whatever would otherwise have been a normal
    /// tool-result message with one recap message. The assistant's tool-call
    /// message stays; it is simply never paired with a tool-role reply, by
    /// design, so the recap fully stands in for it.
    async fn dispatch_subagent_call(&mut self, call: &ToolCall) -> Result<(), ExecutorError> {
        let args: SubagentTaskArgs = match serde_json::from_str(&call.arguments_json) {
            Ok(a) => a,
            Err(_) => {
                self.context
                    .append_message(Message::tool_result(&call.id, "invalid arguments for task tool"))
                    .await
                    .map_err(|e| ExecutorError::InternalError(e.to_string()))?;
                return Ok(());
            }
        };

        let Some(launcher) = self.subagent_launcher.clone() else {
            self.context
                .append_message(Message::tool_result(&call.id, "sub-agent execution is not configured"))
                .await
                .map_err(|e| ExecutorError::InternalError(e.to_string()))?;
            return Ok(());
        };

        if !self.agent.subagents.contains_key(&args.subagent_name) {
            self.context
                .append_message(Message::tool_result(
                    &call.id,
                    format!("unknown sub-agent: {}", args.subagent_name),
                ))
                .await
                .map_err(|e| ExecutorError::InternalError(e.to_string()))?;
            return Ok(());
        }

        let last_thought = self
            .context
            .messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(Message::text)
            .unwrap_or_default();

        let checkpoint_id = self.context.checkpoint(true);
        let depth_before_push = self.state.current_depth();
        let frame = ParentContext::new(checkpoint_id, &last_thought, depth_before_push, args.description.clone());

        if self.state.push_parent_context(frame, self.limits.max_recursion_depth).is_err() {
            self.context
                .append_message(Message::tool_result(&call.id, "sub-agent recursion depth exceeded"))
                .await
                .map_err(|e| ExecutorError::InternalError(e.to_string()))?;
            return Ok(());
        }

        let depth = self.state.current_depth();
        self.wire.send(WireMessage::SubagentStarting {
            subagent_name: args.subagent_name.clone(),
            prompt: args.prompt.clone(),
            depth,
            timestamp: chrono::Utc::now(),
        });

        let launch_result = launcher
            .launch(
                SubagentLaunchRequest {
                    subagent_name: args.subagent_name.clone(),
                    prompt: args.prompt.clone(),
                    depth,
                    parent_cancellation: self.cancellation.clone(),
                },
                self.wire.clone(),
            )
            .await;

        let summary = match launch_result {
            Ok(r) => r.summary,
            Err(err) => format!("sub-agent failed: {err}"),
        };

        self.wire.send(WireMessage::SubagentCompleted {
            subagent_name: args.subagent_name,
            summary: summary.clone(),
            depth,
            timestamp: chrono::Utc::now(),
        });

        let popped = self.state.pop_parent_context().expect("frame was just pushed");
        self.context
            .revert_to(popped.checkpoint_id)
            .await
            .map_err(|e| ExecutorError::InternalError(e.to_string()))?;
        self.context
            .append_message(build_recap_message(&popped, &summary))
            .await
            .map_err(|e| ExecutorError::InternalError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::AlwaysRejectResponder;
    use crate::approval::ApprovalGate;
    use crate::compaction::SimpleCompactionStrategy;
    use crate::subagent::SubagentError;
    use crate::subagent::SubagentLaunchResult;
    use async_trait::async_trait;
    use jimi_protocol::ApprovalPolicy;
    use jimi_protocol::FinishReason;
    use jimi_protocol::LlmStreamError;
    use jimi_protocol::ModelCapacity;
    use jimi_protocol::StreamChunk;
    use jimi_protocol::ToolAccess;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    struct ScriptedStream {
        chunks: Vec<StreamChunk>,
    }
    #[async_trait]
    impl jimi_protocol::ChatStream for ScriptedStream {
        async fn next_chunk(&mut self) -> Result<Option<StreamChunk>, LlmStreamError> {
            Ok(self.chunks.pop())
        }
    }

    /// Replays one scripted response per call, cycling to the last entry once
    /// exhausted so tests that run long loops don't need one entry per step.
    struct ScriptedClient {
        responses: Vec<Vec<StreamChunk>>,
        call_count: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Vec<StreamChunk>>) -> Self {
            Self {
                responses,
                call_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        fn model_name(&self) -> &str {
            "scripted"
        }
        fn capacity(&self) -> ModelCapacity {
            ModelCapacity {
                context_window_tokens: 1_000_000,
                reserved_response_tokens: 1000,
            }
        }
        async fn stream(
            &self,
            _system_prompt: &str,
            _history: &[Message],
            _tool_schemas: &[serde_json::Value],
        ) -> Result<Box<dyn jimi_protocol::ChatStream>, LlmStreamError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            let idx = idx.min(self.responses.len() - 1);
            let mut chunks = self.responses[idx].clone();
            chunks.reverse();
            Ok(Box::new(ScriptedStream { chunks }))
        }
    }

    fn text_response(text: &str) -> Vec<StreamChunk> {
        vec![
            StreamChunk::Finish {
                reason: FinishReason::Stop,
                usage: None,
            },
            StreamChunk::ContentDelta(text.to_string()),
        ]
    }

    fn tool_call_response(id: &str, name: &str, args: &str) -> Vec<StreamChunk> {
        vec![
            StreamChunk::Finish {
                reason: FinishReason::ToolCalls,
                usage: None,
            },
            StreamChunk::ToolCallDelta {
                id: id.to_string(),
                name_delta: Some(name.to_string()),
                args_delta: args.to_string(),
            },
        ]
    }

    async fn build_executor(client: Arc<dyn ChatClient>, agent: AgentDefinition) -> (AgentExecutor, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let context = Context::create(dir.path().join("h.jsonl")).await.unwrap();
        let wire = Arc::new(Wire::new());
        let approval = Arc::new(ApprovalGate::new(
            ApprovalPolicy { yolo: true },
            Box::new(AlwaysRejectResponder),
            CancellationToken::new(),
        ));
        let config = AgentExecutorConfig {
            agent,
            client,
            tools: ToolRegistry::with_builtin_tools(),
            approval,
            wire,
            compaction_strategy: Box::new(SimpleCompactionStrategy),
            hooks: Vec::new(),
            limits: Limits::default(),
            compaction_policy: CompactionPolicy::default(),
            sandbox_policy: SandboxPolicy::default(),
            tool_output_budget: ToolOutputBudget::default(),
            cancellation: CancellationToken::new(),
            work_dir: dir.path().to_path_buf(),
            is_subagent: false,
            subagent_launcher: None,
        };
        (AgentExecutor::new(config, context, ExecutionState::new()), dir)
    }

    fn basic_agent() -> AgentDefinition {
        AgentDefinition {
            name: "main".to_string(),
            description: String::new(),
            system_prompt: "be helpful".to_string(),
            tools: ToolAccess::All,
            subagents: HashMap::new(),
            model: None,
            disallowed_tools: vec![],
        }
    }

    #[tokio::test]
    async fn single_shot_reply_with_no_tool_calls_finishes_immediately() {
        let client: Arc<dyn ChatClient> = Arc::new(ScriptedClient::new(vec![text_response("hello there")]));
        let (mut executor, _dir) = build_executor(client, basic_agent()).await;

        let outcome = executor.run("hi").await.unwrap();
        assert_eq!(outcome.final_text, "hello there");
        assert_eq!(executor.state.task.step_count, 1);
        assert_eq!(executor.state.session.tasks_completed, 1);
    }

    #[tokio::test]
    async fn one_tool_call_then_final_reply() {
        let client: Arc<dyn ChatClient> = Arc::new(ScriptedClient::new(vec![
            tool_call_response("call-1", "think", r#"{"thought":"let's go"}"#),
            text_response("done"),
        ]));
        let (mut executor, _dir) = build_executor(client, basic_agent()).await;

        let outcome = executor.run("do something").await.unwrap();
        assert_eq!(outcome.final_text, "done");
        assert_eq!(executor.state.task.step_count, 2);
        assert_eq!(executor.state.task.tools_used, vec!["think".to_string()]);
        // user input, assistant tool-call, tool result, final assistant reply.
        assert_eq!(executor.context.message_count(), 4);
    }

    #[tokio::test]
    async fn max_steps_reached_fails_the_run() {
        let client: Arc<dyn ChatClient> = Arc::new(ScriptedClient::new(vec![tool_call_response(
            "call-1",
            "think",
            r#"{"thought":"loop"}"#,
        )]));
        let (mut executor, _dir) = build_executor(client, basic_agent()).await;
        executor.limits.max_steps_per_run = 2;

        let err = executor.run("loop forever").await.unwrap_err();
        assert!(matches!(err, ExecutorError::MaxStepsReached));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_reported_as_a_tool_error_without_failing_the_run() {
        let client: Arc<dyn ChatClient> = Arc::new(ScriptedClient::new(vec![
            tool_call_response("call-1", "not_a_real_tool", "{}"),
            text_response("recovered"),
        ]));
        let (mut executor, _dir) = build_executor(client, basic_agent()).await;

        let outcome = executor.run("go").await.unwrap();
        assert_eq!(outcome.final_text, "recovered");
        let tool_msg = &executor.context.messages()[2];
        assert!(tool_msg.text().contains("unknown tool"));
    }

    struct StubLauncher;
    #[async_trait]
    impl SubagentLauncher for StubLauncher {
        async fn launch(
            &self,
            req: SubagentLaunchRequest,
            _parent_wire: Arc<Wire>,
        ) -> Result<SubagentLaunchResult, SubagentError> {
            Ok(SubagentLaunchResult {
                summary: format!("child for '{}' done at depth {}", req.prompt, req.depth),
            })
        }
    }

    #[tokio::test]
    async fn subagent_call_reverts_to_checkpoint_and_appends_one_recap_message() {
        let client: Arc<dyn ChatClient> = Arc::new(ScriptedClient::new(vec![
            tool_call_response(
                "call-1",
                "task",
                r#"{"description":"fix bug","subagent_name":"fixer","prompt":"fix it"}"#,
            ),
            text_response("the sub-agent is done, wrapping up"),
        ]));
        let mut agent = basic_agent();
        agent.subagents.insert(
            "fixer".to_string(),
            jimi_protocol::agent_spec::SubagentRef {
                path: "fixer.yaml".to_string(),
                description: "fixes bugs".to_string(),
            },
        );
        let (mut executor, _dir) = build_executor(client, agent).await;
        executor.subagent_launcher = Some(Arc::new(StubLauncher));

        let outcome = executor.run("please fix the bug").await.unwrap();
        assert_eq!(outcome.final_text, "the sub-agent is done, wrapping up");

        // user input, assistant tool-call (kept), recap message, final assistant reply.
        // No separate tool-role message exists for the task call.
        assert_eq!(executor.context.message_count(), 4);
        assert!(executor.context.messages()[2].text().contains("child for 'fix it' done at depth 1"));
        assert_eq!(executor.state.current_depth(), 0);
    }

    #[tokio::test]
    async fn recursion_cap_rejects_without_launching_a_child() {
        let client: Arc<dyn ChatClient> = Arc::new(ScriptedClient::new(vec![
            tool_call_response(
                "call-1",
                "task",
                r#"{"description":"d","subagent_name":"fixer","prompt":"p"}"#,
            ),
            text_response("gave up"),
        ]));
        let mut agent = basic_agent();
        agent.subagents.insert(
            "fixer".to_string(),
            jimi_protocol::agent_spec::SubagentRef {
                path: "fixer.yaml".to_string(),
                description: "fixes bugs".to_string(),
            },
        );
        let (mut executor, _dir) = build_executor(client, agent).await;
        executor.limits.max_recursion_depth = 0;
        executor.subagent_launcher = Some(Arc::new(StubLauncher));

        let outcome = executor.run("please fix the bug").await.unwrap();
        assert_eq!(outcome.final_text, "gave up");
        assert!(executor.context.messages()[2].text().contains("recursion depth exceeded"));
    }

    #[tokio::test]
    async fn cancellation_before_a_step_fails_the_run() {
        let client: Arc<dyn ChatClient> = Arc::new(ScriptedClient::new(vec![text_response("unreachable")]));
        let (mut executor, _dir) = build_executor(client, basic_agent()).await;
        executor.cancellation.cancel();

        let err = executor.run("hi").await.unwrap_err();
        assert!(matches!(err, ExecutorError::RunCancelled));
    }
}
