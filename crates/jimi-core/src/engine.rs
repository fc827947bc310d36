//! Engine Façade: the single entry point a host binds against. Owns the
//! durable Context, the Wire, the Approval Gate, and the main-agent Executor;
//! resolves `task` tool calls into recursively-constructed child Engines.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use jimi_protocol::AgentDefinition;
use jimi_protocol::ApprovalPolicy;
use jimi_protocol::ChatClient;
use jimi_protocol::CompactionPolicy;
use jimi_protocol::Limits;
use jimi_protocol::SandboxPolicy;
use jimi_protocol::ToolOutputBudget;
use tokio_util::sync::CancellationToken;

use crate::approval::ApprovalGate;
use crate::approval::ApprovalResponder;
use crate::compaction::SimpleCompactionStrategy;
use crate::context::Context;
use crate::context_manager::ContextHook;
use crate::error::EngineError;
use crate::executor::AgentExecutor;
use crate::executor::AgentExecutorConfig;
use crate::executor::RunOutcome;
use crate::state::ExecutionState;
use crate::subagent::SubagentError;
use crate::subagent::SubagentLaunchRequest;
use crate::subagent::SubagentLaunchResult;
use crate::subagent::SubagentLauncher;
use crate::tools::ToolRegistry;
use crate::wire::Wire;

/// Host-supplied configuration for the top-level Engine. Sub-agents are
/// constructed internally from `subagent_catalog` rather than re-parsed from
/// YAML on every `task` call; loading the catalog from disk is the host's
/// job (agent spec YAML is an external interface).
pub struct EngineConfig {
    pub agent: AgentDefinition,
    pub client: Arc<dyn ChatClient>,
    pub subagent_catalog: HashMap<String, AgentDefinition>,
    pub limits: Limits,
    pub compaction_policy: CompactionPolicy,
    pub approval_policy: ApprovalPolicy,
    pub approval_responder: Box<dyn ApprovalResponder>,
    pub sandbox_policy: SandboxPolicy,
    pub tool_output_budget: ToolOutputBudget,
    pub work_dir: PathBuf,
    pub history_path: PathBuf,
    pub hooks: Vec<Box<dyn ContextHook>>,
}

/// Immutable, shareable slice of an Engine's configuration a
/// [`SubagentLauncher`] needs to spin up children. Deliberately excludes the
/// parent's own Context/ExecutionState/Executor — a child gets its own.
struct EngineSpawner {
    subagent_catalog: Arc<HashMap<String, AgentDefinition>>,
    client: Arc<dyn ChatClient>,
    approval: Arc<ApprovalGate>,
    limits: Limits,
    compaction_policy: CompactionPolicy,
    sandbox_policy: SandboxPolicy,
    tool_output_budget: ToolOutputBudget,
    work_dir: PathBuf,
    history_dir: PathBuf,
}

impl EngineSpawner {
    fn child_launcher(&self) -> Arc<dyn SubagentLauncher> {
        Arc::new(EngineSpawner {
            subagent_catalog: self.subagent_catalog.clone(),
            client: self.client.clone(),
            approval: self.approval.clone(),
            limits: self.limits,
            compaction_policy: self.compaction_policy,
            sandbox_policy: self.sandbox_policy.clone(),
            tool_output_budget: self.tool_output_budget,
            work_dir: self.work_dir.clone(),
            history_dir: self.history_dir.clone(),
        })
    }
}

/// Derives a history file path for a child run, distinct from the parent's
/// and from any sibling at the same depth.
fn derive_child_history_path(history_dir: &Path, subagent_name: &str, depth: u32) -> PathBuf {
    let id = uuid::Uuid::new_v4();
    history_dir.join(format!("sub-{subagent_name}-d{depth}-{id}.jsonl"))
}

/// Forwards every event from `child_wire` onto `parent_wire` until the child
/// completes. The child's own `StepBegin`/`SubagentStarting` events already
/// carry `is_subagent`/`agent_name`/`depth`, so no rewriting is needed here.
fn bridge_child_wire(child_wire: Arc<Wire>, parent_wire: Arc<Wire>) {
    tokio::spawn(async move {
        let mut sub = child_wire.subscribe();
        while let Some(msg) = sub.recv().await {
            parent_wire.send(msg);
        }
    });
}

/// Minimum length (in characters) a sub-agent's final reply must reach to be
/// used as-is for the ReCAP summary; shorter replies get one continuation
/// turn asking the child to elaborate.
const MIN_SUMMARY_CHARS: usize = 200;
const SUMMARY_CONTINUATION_PROMPT: &str =
    "Your previous reply was very short. Provide a complete summary of what you did and what the caller should know, in a few sentences.";

#[async_trait]
impl SubagentLauncher for EngineSpawner {
    async fn launch(&self, req: SubagentLaunchRequest, parent_wire: Arc<Wire>) -> Result<SubagentLaunchResult, SubagentError> {
        let agent = self
            .subagent_catalog
            .get(&req.subagent_name)
            .cloned()
            .ok_or_else(|| SubagentError::UnknownSubagent(req.subagent_name.clone()))?;

        let history_path = derive_child_history_path(&self.history_dir, &req.subagent_name, req.depth);
        let context = Context::create(&history_path)
            .await
            .map_err(|e| SubagentError::ChildFailed(e.to_string()))?;

        let child_wire = Arc::new(Wire::new());
        bridge_child_wire(child_wire.clone(), parent_wire);

        // Seeded at the parent's depth, not 0: the cap the child's own
        // `push_parent_context` enforces must bound the whole sub-agent
        // tree, not reset per Engine.
        let mut state = ExecutionState::new_with_depth(req.depth);
        state.initialize_session();

        let config = AgentExecutorConfig {
            agent,
            client: self.client.clone(),
            tools: ToolRegistry::with_builtin_tools(),
            approval: self.approval.clone(),
            wire: child_wire,
            compaction_strategy: Box::new(SimpleCompactionStrategy),
            hooks: Vec::new(),
            limits: self.limits,
            compaction_policy: self.compaction_policy,
            sandbox_policy: self.sandbox_policy.clone(),
            tool_output_budget: self.tool_output_budget,
            cancellation: req.parent_cancellation,
            work_dir: self.work_dir.clone(),
            is_subagent: true,
            subagent_launcher: Some(self.child_launcher()),
        };
        let mut executor = AgentExecutor::new(config, context, state);

        let mut outcome = executor
            .run(&req.prompt)
            .await
            .map_err(|e| SubagentError::ChildFailed(e.to_string()))?;

        if outcome.final_text.chars().count() < MIN_SUMMARY_CHARS {
            outcome = executor
                .run(SUMMARY_CONTINUATION_PROMPT)
                .await
                .map_err(|e| SubagentError::ChildFailed(e.to_string()))?;
        }

        Ok(SubagentLaunchResult { summary: outcome.final_text })
    }
}

/// Current run status, for a host polling [`Engine::status`] from another
/// task while a run is in flight.
pub struct EngineStatus {
    pub message_count: usize,
    pub token_count: u64,
    pub step_count: u64,
    pub is_subagent: bool,
    /// `token_count` against the selected model's usable context window
    /// (`context_window_tokens - reserved_response_tokens`), as a fraction
    /// in `[0.0, 1.0+]`. A host percentage display multiplies by 100; this
    /// is the same fraction `compaction::should_compact` checks against the
    /// compaction policy's trigger threshold.
    pub context_usage_fraction: f64,
}

pub struct Engine {
    executor: AgentExecutor,
    wire: Arc<Wire>,
    cancellation: CancellationToken,
}

impl Engine {
    /// Constructs a fresh top-level Engine: opens (or creates) the durable
    /// Context at `config.history_path`, builds the Approval Gate and Wire,
    /// and wires an [`EngineSpawner`] into the Executor so `task` calls can
    /// recurse.
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config
            .agent
            .validate()
            .map_err(EngineError::Configuration)?;

        let context = Context::restore(&config.history_path)
            .await
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        let wire = Arc::new(Wire::new());
        let cancellation = CancellationToken::new();
        let approval = Arc::new(ApprovalGate::new(
            config.approval_policy,
            config.approval_responder,
            cancellation.clone(),
        ));

        let history_dir = config
            .history_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let spawner = EngineSpawner {
            subagent_catalog: Arc::new(config.subagent_catalog),
            client: config.client.clone(),
            approval: approval.clone(),
            limits: config.limits,
            compaction_policy: config.compaction_policy,
            sandbox_policy: config.sandbox_policy.clone(),
            tool_output_budget: config.tool_output_budget,
            work_dir: config.work_dir.clone(),
            history_dir,
        };

        let mut state = ExecutionState::new();
        state.initialize_session();

        let executor_config = AgentExecutorConfig {
            agent: config.agent,
            client: config.client,
            tools: ToolRegistry::with_builtin_tools(),
            approval,
            wire: wire.clone(),
            compaction_strategy: Box::new(SimpleCompactionStrategy),
            hooks: config.hooks,
            limits: config.limits,
            compaction_policy: config.compaction_policy,
            sandbox_policy: config.sandbox_policy,
            tool_output_budget: config.tool_output_budget,
            cancellation: cancellation.clone(),
            work_dir: config.work_dir,
            is_subagent: false,
            subagent_launcher: Some(Arc::new(spawner)),
        };

        Ok(Self {
            executor: AgentExecutor::new(executor_config, context, state),
            wire,
            cancellation,
        })
    }

    /// Runs one task to completion. A new `run()` reuses the same durable
    /// Context and session-level ExecutionState; only per-task counters
    /// reset.
    pub async fn run(&mut self, input: &str) -> Result<RunOutcome, EngineError> {
        self.wire.reset();
        Ok(self.executor.run(input).await?)
    }

    pub fn status(&self) -> EngineStatus {
        let token_count = self.executor.context.token_count();
        let capacity = self.executor.model_capacity();
        let budget = capacity
            .context_window_tokens
            .saturating_sub(capacity.reserved_response_tokens)
            .max(1);

        EngineStatus {
            message_count: self.executor.context.message_count(),
            token_count,
            step_count: self.executor.state.task.step_count,
            is_subagent: false,
            context_usage_fraction: token_count as f64 / budget as f64,
        }
    }

    /// Requests cancellation of the in-flight (or next) run. Takes effect at
    /// the next step boundary or approval wait, not mid-tool-call.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn subscribe_wire(&self) -> crate::wire::WireSubscription {
        self.wire.subscribe()
    }
}
