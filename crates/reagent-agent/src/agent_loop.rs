//! Agent loop — the model ↔ tool reasoning cycle for one query.
//!
//! Each run seeds a conversation with the query, then repeatedly renders a
//! prompt, calls the model gateway, parses the reply into protocol segments,
//! and dispatches any actions through the tool registry. A run ends when the
//! model answers, when the iteration budget runs out, or on a terminal
//! failure.
//!
//! The loop holds no per-run state, so one `AgentLoop` can serve many
//! concurrent runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use reagent_core::types::{
    Conversation, ConversationEntry, InvocationOutcome, RunOutcome, RunResult, SegmentKind,
    ToolInvocationRecord,
};
use reagent_providers::ModelGateway;

use crate::error::{AgentError, ProtocolError, RunFailure};
use crate::prompt::PromptBuilder;
use crate::protocol::{self, ParsedSegment};
use crate::tools::ToolRegistry;

/// Default maximum model calls per query.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Best-effort text when a run ends without any assistant content.
pub const NO_RESPONSE: &str = "I've completed processing but have no response to give.";

const PROTOCOL_REMINDER: &str = "Reply using the Thought/Action/Action Input/Answer markers.";

// ─────────────────────────────────────────────
// Request / state
// ─────────────────────────────────────────────

/// One top-level query.
#[derive(Clone, Debug, Default)]
pub struct QueryRequest {
    pub query: String,
    /// Credential override for this run only.
    pub api_key: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            api_key: None,
        }
    }

    /// Use a different API key for this run (builder pattern).
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// Where a run is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoopState {
    Idle,
    Thinking,
    Acting,
    Observing,
    Answered,
    Exhausted,
    Failed,
}

/// Mutable state owned by a single run.
struct Run {
    state: LoopState,
    iterations: usize,
    conversation: Conversation,
    tool_invocations: Vec<ToolInvocationRecord>,
    started_at: DateTime<Utc>,
}

impl Run {
    fn new(query: &str) -> Self {
        Self {
            state: LoopState::Idle,
            iterations: 0,
            conversation: Conversation::seeded(query),
            tool_invocations: Vec::new(),
            started_at: Utc::now(),
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!(from = ?self.state, to = ?next, iteration = self.iterations, "state transition");
        self.state = next;
    }

    fn push(&mut self, entry: ConversationEntry) {
        self.conversation.push(entry);
    }

    fn finish(mut self, outcome: RunOutcome, final_text: String) -> RunResult {
        self.transition(match outcome {
            RunOutcome::Answered => LoopState::Answered,
            RunOutcome::Exhausted => LoopState::Exhausted,
        });
        RunResult {
            final_text,
            outcome,
            iterations: self.iterations,
            conversation: self.conversation.into_entries(),
            tool_invocations: self.tool_invocations,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    fn fail(mut self, error: AgentError) -> RunFailure {
        self.transition(LoopState::Failed);
        RunFailure {
            error,
            iterations: self.iterations,
            conversation: self.conversation.into_entries(),
            tool_invocations: self.tool_invocations,
        }
    }
}

// ─────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────

/// Drives queries through the gateway and tool registry.
pub struct AgentLoop {
    gateway: Arc<dyn ModelGateway>,
    tools: Arc<ToolRegistry>,
    prompt: PromptBuilder,
    /// Max model calls per query.
    max_iterations: usize,
}

impl AgentLoop {
    /// Create a new agent loop. `max_iterations` falls back to
    /// [`DEFAULT_MAX_ITERATIONS`] and is never below one.
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        tools: Arc<ToolRegistry>,
        max_iterations: Option<usize>,
    ) -> Self {
        let max_iterations = max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS).max(1);
        info!(
            model = gateway.model(),
            max_iterations,
            tools = tools.len(),
            "agent loop initialized"
        );
        Self {
            gateway,
            tools,
            prompt: PromptBuilder::new(),
            max_iterations,
        }
    }

    /// Replace the prompt builder (builder pattern).
    pub fn with_prompt_builder(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run a query to completion.
    pub async fn run(&self, request: QueryRequest) -> Result<RunResult, RunFailure> {
        self.run_with_cancel(request, CancellationToken::new()).await
    }

    /// Run a query, stopping early if `cancel` fires.
    ///
    /// Cancellation is checked before every model call and raced against the
    /// call itself. A tool that is already running is allowed to finish.
    pub async fn run_with_cancel(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<RunResult, RunFailure> {
        let mut run = Run::new(&request.query);
        let goal = request.query.trim();
        if goal.is_empty() {
            return Err(run.fail(AgentError::EmptyQuery));
        }

        let gateway = self.gateway_for(&request);
        let catalogue = self.tools.descriptors();
        info!(model = gateway.model(), query_len = goal.len(), "starting run");

        loop {
            if run.iterations >= self.max_iterations {
                let text = run
                    .conversation
                    .last_assistant_content()
                    .unwrap_or(NO_RESPONSE)
                    .to_string();
                warn!(
                    iterations = run.iterations,
                    "iteration budget exhausted without an answer"
                );
                return Ok(run.finish(RunOutcome::Exhausted, text));
            }
            if cancel.is_cancelled() {
                info!(iterations = run.iterations, "run cancelled");
                return Err(run.fail(AgentError::Cancelled));
            }

            run.transition(LoopState::Thinking);
            run.iterations += 1;
            let messages = self
                .prompt
                .build_messages(run.conversation.entries(), &catalogue, goal);
            debug!(iteration = run.iterations, "model call");

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = gateway.generate(&messages) => Some(result),
            };
            let raw = match response {
                None => {
                    info!(iterations = run.iterations, "run cancelled during model call");
                    return Err(run.fail(AgentError::Cancelled));
                }
                Some(Err(e)) => {
                    error!(error = %e, kind = e.kind(), "model gateway failed");
                    return Err(run.fail(e.into()));
                }
                Some(Ok(raw)) => raw,
            };

            let segments = match protocol::parse(&raw) {
                Ok(segments) => segments,
                Err(e) => {
                    warn!(error = %e, iteration = run.iterations, "unparsable model response");
                    run.push(ConversationEntry::assistant(None, raw));
                    run.push(ConversationEntry::tool(
                        SegmentKind::Error,
                        format!("{}: {e}. {PROTOCOL_REMINDER}", e.kind()),
                    ));
                    continue;
                }
            };

            if let Some(answer) = self.apply_segments(&mut run, segments).await {
                info!(
                    iterations = run.iterations,
                    tool_calls = run.tool_invocations.len(),
                    "run answered"
                );
                return Ok(run.finish(RunOutcome::Answered, answer));
            }
        }
    }

    /// The gateway for this run, honoring a per-run credential override.
    fn gateway_for(&self, request: &QueryRequest) -> Arc<dyn ModelGateway> {
        let key = request
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        match key {
            Some(key) => self.gateway.with_api_key(key).unwrap_or_else(|| {
                warn!("gateway does not support per-run API keys; using the shared credentials");
                self.gateway.clone()
            }),
            None => self.gateway.clone(),
        }
    }

    /// Append one response's segments, dispatching actions in order.
    ///
    /// Returns the answer text if the response carried an `Answer:`. A
    /// response that answers is final, so its actions are recorded but not
    /// dispatched.
    async fn apply_segments(&self, run: &mut Run, segments: Vec<ParsedSegment>) -> Option<String> {
        let answers = segments
            .iter()
            .any(|s| matches!(s, ParsedSegment::Answer { .. }));
        let mut after_dispatch = false;

        for segment in segments {
            match segment {
                ParsedSegment::Thought { text } => {
                    debug!(thought = %text, "model thought");
                    run.push(ConversationEntry::assistant(Some(SegmentKind::Thought), text));
                    after_dispatch = false;
                }
                ParsedSegment::Action {
                    tool_name,
                    raw_argument_text,
                } => {
                    let content = match &raw_argument_text {
                        Some(raw) => format!("{tool_name}\nAction Input: {raw}"),
                        None => tool_name.clone(),
                    };
                    run.push(ConversationEntry::assistant(Some(SegmentKind::Action), content));
                    if answers {
                        debug!(tool = %tool_name, "response also answers; action not dispatched");
                        continue;
                    }
                    self.dispatch(run, &tool_name, raw_argument_text.as_deref())
                        .await;
                    after_dispatch = true;
                }
                ParsedSegment::Observation { text } => {
                    if after_dispatch {
                        debug!("discarding model-written observation after dispatched action");
                    } else {
                        run.push(ConversationEntry::assistant(
                            Some(SegmentKind::Observation),
                            text,
                        ));
                    }
                    after_dispatch = false;
                }
                ParsedSegment::Answer { text } => {
                    run.push(ConversationEntry::assistant(
                        Some(SegmentKind::Answer),
                        text.clone(),
                    ));
                    return Some(text);
                }
                ParsedSegment::Error { text } => {
                    warn!(error = %text, "model reported an error");
                    run.push(ConversationEntry::assistant(Some(SegmentKind::Error), text));
                    after_dispatch = false;
                }
            }
        }
        None
    }

    /// Execute one action and record its observation.
    ///
    /// Every outcome lands in the tool log and in the conversation; failures
    /// become `tool failed: <Kind>: <message>` observations.
    async fn dispatch(&self, run: &mut Run, tool_name: &str, raw_arguments: Option<&str>) {
        run.transition(LoopState::Acting);

        let (parameters, result): (Value, Result<Value, String>) = match raw_arguments {
            None => {
                let err = ProtocolError::MissingActionInput {
                    tool: tool_name.to_string(),
                };
                (Value::Null, Err(format!("{}: {err}", err.kind())))
            }
            Some(raw) => match protocol::decode_arguments(tool_name, raw) {
                Err(err) => (
                    Value::String(raw.to_string()),
                    Err(format!("{}: {err}", err.kind())),
                ),
                Ok(args) => {
                    let parameters = Value::Object(args.clone().into_iter().collect());
                    match self.tools.invoke(tool_name, args).await {
                        Ok(output) => (parameters, Ok(output)),
                        Err(err) => (parameters, Err(format!("{}: {err}", err.kind()))),
                    }
                }
            },
        };

        run.transition(LoopState::Observing);
        let (observation, outcome) = match result {
            Ok(output) => (observation_text(&output), InvocationOutcome::Success { output }),
            Err(error) => (
                format!("tool failed: {error}"),
                InvocationOutcome::Failure { error },
            ),
        };
        info!(
            tool = tool_name,
            success = outcome.is_success(),
            "tool call finished"
        );

        run.tool_invocations.push(ToolInvocationRecord {
            tool_name: tool_name.to_string(),
            parameters,
            outcome,
        });
        run.push(ConversationEntry::tool(SegmentKind::Observation, observation));
    }
}

/// Text handed back to the model for a tool result.
fn observation_text(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use reagent_core::types::{ChatMessage, Role};
    use reagent_providers::GatewayError;
    use serde_json::json;

    use crate::tools::{schema, ParameterSchema};

    /// A gateway that replays canned responses and records every prompt.
    struct ScriptedGateway {
        responses: Mutex<VecDeque<Result<String, GatewayError>>>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedGateway {
        fn new(responses: Vec<Result<String, GatewayError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn texts(responses: &[&str]) -> Arc<Self> {
            Self::new(responses.iter().map(|r| Ok(r.to_string())).collect())
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn prompt(&self, call: usize) -> String {
            self.prompts.lock().unwrap()[call][1].content().to_string()
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _max_tokens: u32,
            _temperature: f64,
        ) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("Thought: still thinking".into()))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    /// Answers with the goal found in the prompt.
    struct EchoGateway;

    #[async_trait]
    impl ModelGateway for EchoGateway {
        async fn chat(
            &self,
            messages: &[ChatMessage],
            _max_tokens: u32,
            _temperature: f64,
        ) -> Result<String, GatewayError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let prompt = messages[1].content();
            let goal = prompt
                .split("## Goal\n\n")
                .nth(1)
                .and_then(|rest| rest.split("\n\n").next())
                .unwrap_or("");
            Ok(format!("Answer: {goal}"))
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    /// Never returns within a test's lifetime.
    struct StalledGateway;

    #[async_trait]
    impl ModelGateway for StalledGateway {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _max_tokens: u32,
            _temperature: f64,
        ) -> Result<String, GatewayError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("Answer: too late".into())
        }

        fn model(&self) -> &str {
            "stalled"
        }
    }

    fn registry_with_search() -> (Arc<ToolRegistry>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            "search_files",
            "Find files",
            schema(&[("pattern", "glob")]),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!(["a.md", "b.md"])) }
            },
        );
        registry.register_fn("explode", "Always fails", ParameterSchema::new(), |_| async {
            anyhow::bail!("disk on fire")
        });
        (Arc::new(registry), calls)
    }

    fn agent(gateway: Arc<dyn ModelGateway>, max_iterations: Option<usize>) -> (AgentLoop, Arc<AtomicUsize>) {
        let (tools, calls) = registry_with_search();
        (AgentLoop::new(gateway, tools, max_iterations), calls)
    }

    const SEARCH_TURN: &str =
        "Thought: need file search\nAction: search_files\nAction Input: {\"pattern\": \"*.md\"}";

    #[tokio::test]
    async fn test_search_then_answer() {
        let gateway = ScriptedGateway::texts(&[
            SEARCH_TURN,
            "Answer: Found 2 markdown files: a.md, b.md",
        ]);
        let (agent, tool_calls) = agent(gateway.clone(), None);

        let result = agent
            .run(QueryRequest::new("find all files matching *.md"))
            .await
            .unwrap();

        assert_eq!(result.final_text, "Found 2 markdown files: a.md, b.md");
        assert_eq!(result.outcome, RunOutcome::Answered);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.tool_invocations.len(), 1);
        assert_eq!(result.tool_invocations[0].tool_name, "search_files");
        assert_eq!(result.tool_invocations[0].parameters, json!({"pattern": "*.md"}));
        assert!(result.tool_invocations[0].outcome.is_success());
        assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.calls(), 2);

        let kinds: Vec<(Role, Option<SegmentKind>)> = result
            .conversation
            .iter()
            .map(|e| (e.role, e.segment_kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (Role::User, None),
                (Role::Assistant, Some(SegmentKind::Thought)),
                (Role::Assistant, Some(SegmentKind::Action)),
                (Role::Tool, Some(SegmentKind::Observation)),
                (Role::Assistant, Some(SegmentKind::Answer)),
            ]
        );
    }

    #[tokio::test]
    async fn test_observation_reaches_next_prompt() {
        let gateway = ScriptedGateway::texts(&[SEARCH_TURN, "Answer: done"]);
        let (agent, _) = agent(gateway.clone(), None);
        agent.run(QueryRequest::new("find md")).await.unwrap();

        assert!(!gateway.prompt(0).contains("tool: Observation:"));
        assert!(gateway
            .prompt(1)
            .contains("tool: Observation: [\"a.md\",\"b.md\"]"));
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let gateway = ScriptedGateway::texts(&[
            "Thought: try it\nAction: teleport\nAction Input: {\"to\": \"mars\"}",
            "Answer: cannot teleport",
        ]);
        let (agent, tool_calls) = agent(gateway.clone(), None);

        let result = agent.run(QueryRequest::new("go to mars")).await.unwrap();

        assert_eq!(result.final_text, "cannot teleport");
        assert_eq!(gateway.calls(), 2);
        assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
        let observation = &result.conversation[3];
        assert_eq!(observation.segment_kind, Some(SegmentKind::Observation));
        assert!(observation.content.starts_with("tool failed: UnknownToolError"));
        assert!(observation.content.contains("teleport"));
        assert!(!result.tool_invocations[0].outcome.is_success());
    }

    #[tokio::test]
    async fn test_tool_failure_and_bad_arguments_are_observed() {
        let gateway = ScriptedGateway::texts(&[
            "Action: explode\nAction Input: {}",
            "Action: search_files\nAction Input: not json at all",
            "Action: search_files",
            "Answer: gave up",
        ]);
        let (agent, tool_calls) = agent(gateway, None);

        let result = agent.run(QueryRequest::new("q")).await.unwrap();

        let observations: Vec<&str> = result
            .conversation
            .iter()
            .filter(|e| e.role == Role::Tool)
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(observations.len(), 3);
        assert!(observations[0].contains("ToolExecutionError"));
        assert!(observations[0].contains("disk on fire"));
        assert!(observations[1].contains("ArgumentParseError"));
        assert!(observations[2].contains("ProtocolError"));
        assert_eq!(tool_calls.load(Ordering::SeqCst), 0);

        assert_eq!(result.tool_invocations.len(), 3);
        assert_eq!(result.tool_invocations[1].parameters, json!("not json at all"));
        assert_eq!(result.tool_invocations[2].parameters, Value::Null);
    }

    #[tokio::test]
    async fn test_full_response_answers_in_one_call() {
        let gateway = ScriptedGateway::texts(&[
            "Thought: t\nAction: search_files\nAction Input: {\"pattern\": \"*.md\"}\nObservation: [\"a.md\"]\nAnswer: a.md",
        ]);
        let (agent, tool_calls) = agent(gateway.clone(), None);

        let result = agent.run(QueryRequest::new("q")).await.unwrap();

        assert_eq!(result.final_text, "a.md");
        assert_eq!(gateway.calls(), 1);
        assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
        assert!(result.tool_invocations.is_empty());
        let last = result.conversation.last().unwrap();
        assert_eq!(last.segment_kind, Some(SegmentKind::Answer));
    }

    #[tokio::test]
    async fn test_model_observation_after_dispatch_is_discarded() {
        let gateway = ScriptedGateway::texts(&[
            "Action: search_files\nAction Input: {\"pattern\": \"*.md\"}\nObservation: made up",
            "Answer: ok",
        ]);
        let (agent, _) = agent(gateway, None);

        let result = agent.run(QueryRequest::new("q")).await.unwrap();

        assert!(result.conversation.iter().all(|e| e.content != "made up"));
        assert_eq!(result.tool_invocations.len(), 1);
    }

    #[tokio::test]
    async fn test_budget_exhausted_after_k_calls() {
        let gateway = ScriptedGateway::texts(&[
            "Thought: one",
            "Thought: two",
            "Thought: three",
            "Answer: never reached",
        ]);
        let (agent, _) = agent(gateway.clone(), Some(3));

        let result = agent.run(QueryRequest::new("q")).await.unwrap();

        assert_eq!(gateway.calls(), 3);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.outcome, RunOutcome::Exhausted);
        assert!(result.is_best_effort());
        assert_eq!(result.final_text, "three");
    }

    #[tokio::test]
    async fn test_exhausted_without_assistant_content() {
        let gateway = ScriptedGateway::texts(&["Action Input: {}"]);
        let (agent, _) = agent(gateway, Some(1));

        let result = agent.run(QueryRequest::new("q")).await.unwrap();
        assert_eq!(result.final_text, NO_RESPONSE);
    }

    #[tokio::test]
    async fn test_unparsable_response_is_retried() {
        let gateway = ScriptedGateway::texts(&["just some prose", "Answer: fixed"]);
        let (agent, _) = agent(gateway.clone(), None);

        let result = agent.run(QueryRequest::new("q")).await.unwrap();

        assert_eq!(result.final_text, "fixed");
        assert_eq!(result.iterations, 2);
        assert_eq!(result.conversation[1].content, "just some prose");
        assert_eq!(result.conversation[1].segment_kind, None);
        assert_eq!(result.conversation[2].role, Role::Tool);
        assert!(result.conversation[2].content.starts_with("ProtocolError"));
        assert!(gateway.prompt(1).contains(PROTOCOL_REMINDER));
    }

    #[tokio::test]
    async fn test_model_error_segment_continues() {
        let gateway = ScriptedGateway::texts(&["Error: I lack a tool for that", "Answer: sorry"]);
        let (agent, _) = agent(gateway, None);

        let result = agent.run(QueryRequest::new("q")).await.unwrap();

        assert_eq!(result.final_text, "sorry");
        assert_eq!(result.conversation[1].segment_kind, Some(SegmentKind::Error));
        assert_eq!(result.conversation[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_gateway_failure_keeps_progress() {
        let gateway = ScriptedGateway::new(vec![
            Ok(SEARCH_TURN.to_string()),
            Err(GatewayError::Transport("connection refused".into())),
        ]);
        let (agent, _) = agent(gateway, None);

        let failure = agent.run(QueryRequest::new("q")).await.unwrap_err();

        assert_eq!(failure.error.kind(), "TransportError");
        assert_eq!(failure.iterations, 2);
        assert_eq!(failure.tool_invocations.len(), 1);
        assert_eq!(failure.conversation.len(), 4);
        assert!(failure.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let gateway = ScriptedGateway::texts(&[]);
        let (agent, _) = agent(gateway.clone(), None);

        let failure = agent.run(QueryRequest::new("   ")).await.unwrap_err();
        assert!(matches!(failure.error, AgentError::EmptyQuery));
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_first_call() {
        let gateway = ScriptedGateway::texts(&["Answer: x"]);
        let (agent, _) = agent(gateway.clone(), None);
        let token = CancellationToken::new();
        token.cancel();

        let failure = agent
            .run_with_cancel(QueryRequest::new("q"), token)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, AgentError::Cancelled));
        assert_eq!(gateway.calls(), 0);
        assert_eq!(failure.iterations, 0);
    }

    #[tokio::test]
    async fn test_cancel_during_model_call() {
        let (agent, _) = agent(Arc::new(StalledGateway), None);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let failure = tokio::time::timeout(
            Duration::from_secs(5),
            agent.run_with_cancel(QueryRequest::new("q"), token),
        )
        .await
        .expect("cancellation should stop the run promptly")
        .unwrap_err();
        assert!(matches!(failure.error, AgentError::Cancelled));
        assert_eq!(failure.iterations, 1);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let (agent, _) = agent(Arc::new(EchoGateway), None);

        let (first, second) = tokio::join!(
            agent.run(QueryRequest::new("alpha")),
            agent.run(QueryRequest::new("beta")),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.final_text, "alpha");
        assert_eq!(second.final_text, "beta");
        assert_eq!(first.conversation[0].content, "alpha");
        assert_eq!(second.conversation[0].content, "beta");
    }

    #[tokio::test]
    async fn test_api_key_override_falls_back_without_support() {
        let gateway = ScriptedGateway::texts(&["Answer: ok"]);
        let (agent, _) = agent(gateway.clone(), None);

        let result = agent
            .run(QueryRequest::new("q").with_api_key("sk-run"))
            .await
            .unwrap();
        assert_eq!(result.final_text, "ok");
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_gateway_errors_are_absorbed() {
        use reagent_core::config::ProviderConfig;
        use reagent_providers::{GenerationConfig, HttpGateway, RetryPolicy};
        use wiremock::matchers::{header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Answer: recovered"}, "finish_reason": "stop"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ProviderConfig {
            api_key: "sk-shared".into(),
            api_base: server.uri(),
            ..Default::default()
        };
        let gateway = HttpGateway::new(&config, "deepseek-chat", GenerationConfig::default())
            .unwrap()
            .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)));
        let (agent, _) = agent(Arc::new(gateway), None);

        let result = agent
            .run(QueryRequest::new("q").with_api_key("sk-run"))
            .await
            .unwrap();
        assert_eq!(result.final_text, "recovered");
        assert_eq!(result.iterations, 1);
    }

    #[test]
    fn test_run_state_is_internal_bookkeeping() {
        let mut run = Run::new("q");
        assert_eq!(run.state, LoopState::Idle);
        run.transition(LoopState::Thinking);
        assert_eq!(run.state, LoopState::Thinking);

        let failure = run.fail(AgentError::Cancelled);
        assert_eq!(failure.iterations, 0);
        assert_eq!(failure.conversation.len(), 1);
    }
}
