use super::*;
use crate::agent::context::Turn;
use crate::agent::tools::{Tool, ToolResult};
use crate::errors::TransientFailure;
use crate::providers::base::Message;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Step {
    Text(&'static str),
    Calls(Vec<(&'static str, Value)>),
    Transient,
    Fatal,
    Empty,
}

/// Replays a fixed sequence of responses and records every request.
struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<(Vec<Message>, Option<bool>, usize)>>,
}

impl ScriptedProvider {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn think_flags(&self) -> Vec<Option<bool>> {
        self.seen.lock().unwrap().iter().map(|s| s.1).collect()
    }

    fn tool_counts(&self) -> Vec<usize> {
        self.seen.lock().unwrap().iter().map(|s| s.2).collect()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> Result<LLMResponse> {
        self.seen.lock().unwrap().push((
            req.messages.clone(),
            req.think,
            req.tools.as_ref().map_or(0, Vec::len),
        ));
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Text("fallback"));
        match step {
            Step::Text(t) => Ok(LLMResponse {
                content: Some(t.to_string()),
                ..Default::default()
            }),
            Step::Calls(calls) => Ok(LLMResponse {
                tool_calls: calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, (name, arguments))| ToolCallRequest {
                        id: format!("call_{i}"),
                        name: name.to_string(),
                        arguments,
                    })
                    .collect(),
                ..Default::default()
            }),
            Step::Transient => Err(OllacordError::Transient {
                kind: TransientFailure::GatewayTimeout,
                message: "504".into(),
            }
            .into()),
            Step::Fatal => Err(OllacordError::Provider {
                message: "API error (401): unauthorized".into(),
                status: Some(401),
            }
            .into()),
            Step::Empty => Ok(LLMResponse::default()),
        }
    }

    fn default_model(&self) -> &'static str {
        "mock"
    }
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &'static str {
        "echo"
    }
    fn description(&self) -> &'static str {
        "echoes its text argument"
    }
    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }
    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let text = params["text"].as_str().unwrap_or_default();
        Ok(ToolResult::new(format!("echo: {text}")))
    }
}

fn engine(provider: Arc<ScriptedProvider>, retry_budget: u32) -> ConversationEngine {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    ConversationEngine::new(
        provider,
        Arc::new(registry),
        Arc::new(ResponseLog::disabled()),
        EngineConfig {
            retry_budget,
            ..Default::default()
        },
    )
}

fn store() -> ContextStore {
    ContextStore::in_memory(vec![Turn::system("sys")]).unwrap()
}

#[tokio::test]
async fn test_text_reply_appends_user_and_assistant() {
    let provider = ScriptedProvider::new(vec![Step::Text("hi")]);
    let engine = engine(provider.clone(), 5);
    let mut store = store();

    let outcome = engine
        .chat(&mut store, "hello", ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, ChatOutcome::Final("hi".into()));
    assert_eq!(store.len(), 3);
    assert_eq!(store.turns()[1].role, Role::User);
    assert_eq!(store.turns()[1].content, "hello");
    assert_eq!(store.turns()[2].role, Role::Assistant);
    assert_eq!(store.turns()[2].content, "hi");
    assert_eq!(provider.requests(), 1);
    assert_eq!(engine.log.len(), 1);
}

#[tokio::test]
async fn test_extra_field_is_stored_on_inbound_turn() {
    let provider = ScriptedProvider::new(vec![Step::Text("ok")]);
    let engine = engine(provider, 5);
    let mut store = store();

    engine
        .chat(
            &mut store,
            "hello",
            ChatOptions {
                extra: Some("id, 42"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(store.has_extra_value("id", "42"));
}

#[tokio::test]
async fn test_malformed_extra_fails_before_any_request() {
    let provider = ScriptedProvider::new(vec![Step::Text("ok")]);
    let engine = engine(provider.clone(), 5);
    let mut store = store();

    let err = engine
        .chat(
            &mut store,
            "hello",
            ChatOptions {
                extra: Some("no separator"),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OllacordError::Format(_)));
    assert_eq!(store.len(), 1);
    assert_eq!(provider.requests(), 0);
}

#[tokio::test]
async fn test_tool_calls_run_in_order_then_reply() {
    let provider = ScriptedProvider::new(vec![
        Step::Calls(vec![
            ("echo", json!({"text": "one"})),
            ("echo", json!({"text": "two"})),
        ]),
        Step::Text("done"),
    ]);
    let engine = engine(provider.clone(), 5);
    let mut store = store();

    let outcome = engine
        .chat(&mut store, "go", ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, ChatOutcome::Final("done".into()));
    let roles: Vec<_> = store.turns().iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Tool, Role::Tool, Role::Assistant]
    );
    assert_eq!(store.turns()[2].content, "echo: one");
    assert_eq!(store.turns()[3].content, "echo: two");
    assert_eq!(provider.requests(), 2);
}

#[tokio::test]
async fn test_auto_think_turns_on_after_tools() {
    let provider = ScriptedProvider::new(vec![
        Step::Calls(vec![("echo", json!({"text": "x"}))]),
        Step::Text("done"),
    ]);
    let engine = engine(provider.clone(), 5);
    let mut store = store();

    engine
        .chat(&mut store, "go", ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(provider.think_flags(), vec![Some(false), Some(true)]);
}

#[tokio::test]
async fn test_think_omitted_without_capability() {
    let provider = ScriptedProvider::new(vec![Step::Text("hi")]);
    let engine = ConversationEngine::new(
        provider.clone(),
        Arc::new(ToolRegistry::new()),
        Arc::new(ResponseLog::disabled()),
        EngineConfig {
            supports_thinking: false,
            ..Default::default()
        },
    );
    let mut store = store();

    engine
        .chat(
            &mut store,
            "hello",
            ChatOptions {
                think: ThinkMode::On,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(provider.think_flags(), vec![None]);
    // empty registry means no tools field at all
    assert_eq!(provider.tool_counts(), vec![0]);
}

#[tokio::test]
async fn test_unknown_tool_result_goes_back_to_model() {
    let provider = ScriptedProvider::new(vec![
        Step::Calls(vec![("teleport", json!({}))]),
        Step::Text("sorry"),
    ]);
    let engine = engine(provider, 5);
    let mut store = store();

    engine
        .chat(&mut store, "go", ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(store.turns()[2].role, Role::Tool);
    assert_eq!(store.turns()[2].content, "Unknown tool type: teleport");
}

#[tokio::test]
async fn test_custom_tools_are_returned_not_executed() {
    let provider = ScriptedProvider::new(vec![Step::Calls(vec![(
        "echo",
        json!({"text": "should not run"}),
    )])]);
    let engine = engine(provider.clone(), 5);
    let mut store = store();

    let outcome = engine
        .chat(
            &mut store,
            "decide",
            ChatOptions {
                custom_tools: Some(vec![ToolDefinition {
                    name: "echo".into(),
                    description: "custom".into(),
                    parameters: json!({}),
                }]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let ChatOutcome::ToolCalls(calls) = outcome else {
        panic!("expected tool calls, got {outcome:?}");
    };
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].arguments["text"], "should not run");
    // only the inbound turn was stored
    assert_eq!(store.len(), 2);
    assert_eq!(provider.tool_counts(), vec![1]);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let provider = ScriptedProvider::new(vec![
        Step::Transient,
        Step::Transient,
        Step::Text("finally"),
    ]);
    let engine = engine(provider.clone(), 5);
    let mut store = store();

    let outcome = engine
        .chat(&mut store, "hello", ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, ChatOutcome::Final("finally".into()));
    assert_eq!(provider.requests(), 3);
    // the inbound turn is appended once, not per attempt
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_exhausted_after_budget_plus_one_attempts() {
    let provider = ScriptedProvider::new((0..10).map(|_| Step::Transient).collect());
    let engine = engine(provider.clone(), 2);
    let mut store = store();

    let outcome = engine
        .chat(&mut store, "hello", ChatOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, ChatOutcome::Exhausted);
    assert_eq!(provider.requests(), 3);
    assert_eq!(outcome.into_reply().as_deref(), Some(APOLOGY));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_non_transient_error_propagates() {
    let provider = ScriptedProvider::new(vec![Step::Fatal, Step::Text("never")]);
    let engine = engine(provider.clone(), 5);
    let mut store = store();

    let err = engine
        .chat(&mut store, "hello", ChatOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, OllacordError::Provider { status: Some(401), .. }));
    assert_eq!(provider.requests(), 1);
}

#[tokio::test]
async fn test_empty_response_is_protocol_error() {
    let provider = ScriptedProvider::new(vec![Step::Empty]);
    let engine = engine(provider, 5);
    let mut store = store();

    let err = engine
        .chat(&mut store, "hello", ChatOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, OllacordError::Protocol(_)));
}

#[tokio::test]
async fn test_endless_tool_calls_are_cut_off() {
    let provider = ScriptedProvider::new(
        (0..10)
            .map(|_| Step::Calls(vec![("echo", json!({"text": "again"}))]))
            .collect(),
    );
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool));
    let engine = ConversationEngine::new(
        provider.clone(),
        Arc::new(registry),
        Arc::new(ResponseLog::disabled()),
        EngineConfig {
            max_tool_rounds: 3,
            ..Default::default()
        },
    );
    let mut store = store();

    let err = engine
        .chat(&mut store, "loop", ChatOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, OllacordError::Protocol(_)));
    assert_eq!(provider.requests(), 4);
}

#[test]
fn test_into_reply() {
    assert_eq!(
        ChatOutcome::Final("x".into()).into_reply(),
        Some("x".to_string())
    );
    assert_eq!(ChatOutcome::ToolCalls(vec![]).into_reply(), None);
}

struct CapsProvider(Result<Vec<String>, String>);

#[async_trait]
impl LLMProvider for CapsProvider {
    async fn chat(&self, _req: ChatRequest<'_>) -> Result<LLMResponse> {
        unreachable!()
    }
    fn default_model(&self) -> &'static str {
        "mock"
    }
    async fn capabilities(&self, _model: Option<&str>) -> Result<Vec<String>> {
        self.0.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

#[tokio::test]
async fn test_probe_thinking_support() {
    let yes = CapsProvider(Ok(vec!["completion".into(), "thinking".into()]));
    assert!(ConversationEngine::probe_thinking_support(&yes, None).await);

    let no = CapsProvider(Ok(vec!["completion".into()]));
    assert!(!ConversationEngine::probe_thinking_support(&no, None).await);

    let broken = CapsProvider(Err("connection refused".into()));
    assert!(!ConversationEngine::probe_thinking_support(&broken, None).await);
}
