// Shared test helpers; not every test binary uses every item.
#![allow(unused)]

use async_trait::async_trait;
use ollacord::agent::context::ContextStore;
use ollacord::agent::memory::{Memory, MemoryIndex, MemoryStore};
use ollacord::agent::response_log::ResponseLog;
use ollacord::agent::tools::ToolRegistry;
use ollacord::agent::tools::memorize::MemorizeTool;
use ollacord::agent::{ConversationEngine, EngineConfig};
use ollacord::errors::{OllacordError, TransientFailure};
use ollacord::providers::base::{
    ChatRequest, LLMProvider, LLMResponse, Message, ToolCallRequest, ToolDefinition,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SYSTEM_PROMPT: &str = "You are a friendly Discord member.";

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub think: Option<bool>,
}

pub enum MockReply {
    Response(LLMResponse),
    Transient(TransientFailure),
    Fail(String),
}

/// Replays scripted replies in order and records every chat request.
/// Embeddings are keyword flags so similarity is predictable.
pub struct MockLLMProvider {
    replies: Mutex<VecDeque<MockReply>>,
    pub calls: Mutex<Vec<RecordedCall>>,
    pub default_response: String,
}

impl MockLLMProvider {
    pub fn with_replies(replies: Vec<MockReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from(replies)),
            calls: Mutex::new(Vec::new()),
            default_response: "Mock response".to_string(),
        })
    }

    pub fn with_responses(responses: Vec<LLMResponse>) -> Arc<Self> {
        Self::with_replies(responses.into_iter().map(MockReply::Response).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> anyhow::Result<LLMResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: req.messages,
            model: req.model.map(str::to_string),
            tools: req.tools,
            think: req.think,
        });

        match self.replies.lock().unwrap().pop_front() {
            Some(MockReply::Response(r)) => Ok(r),
            Some(MockReply::Transient(kind)) => Err(OllacordError::Transient {
                kind,
                message: "upstream timed out".into(),
            }
            .into()),
            Some(MockReply::Fail(message)) => Err(OllacordError::Provider {
                message,
                status: Some(500),
            }
            .into()),
            None => Ok(text_response(&self.default_response)),
        }
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn capabilities(&self, _model: Option<&str>) -> anyhow::Result<Vec<String>> {
        Ok(vec!["completion".into(), "tools".into(), "thinking".into()])
    }

    async fn embed(&self, _model: &str, inputs: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        const KEYWORDS: [&str; 4] = ["tea", "coffee", "alice", "bob"];
        Ok(inputs
            .iter()
            .map(|text| {
                let mut v: Vec<f32> = KEYWORDS
                    .iter()
                    .map(|k| if text.contains(k) { 1.0 } else { 0.0 })
                    .collect();
                v.push(0.1);
                v
            })
            .collect())
    }
}

// --- Response builders ---

pub fn text_response(content: &str) -> LLMResponse {
    LLMResponse {
        content: Some(content.to_string()),
        ..Default::default()
    }
}

pub fn tool_response(calls: Vec<ToolCallRequest>) -> LLMResponse {
    LLMResponse {
        tool_calls: calls,
        ..Default::default()
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

// --- Agent wiring ---

pub struct TestAgent {
    pub dir: TempDir,
    pub provider: Arc<MockLLMProvider>,
    pub engine: Arc<ConversationEngine>,
    pub memory: Arc<Memory>,
    pub store: ContextStore,
}

impl TestAgent {
    pub fn context_path(&self) -> PathBuf {
        self.dir.path().join("context.json")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.dir.path().join("data.csv")
    }
}

/// Engine with only the memorize tool, a file-backed store and no retry delay.
pub async fn create_test_agent(provider: Arc<MockLLMProvider>, retry_budget: u32) -> TestAgent {
    let dir = TempDir::new().expect("temp dir");
    let memory = Arc::new(
        Memory::open(
            MemoryStore::new(dir.path().join("data.csv")),
            MemoryIndex::new(provider.clone(), "embed"),
        )
        .await
        .expect("memory"),
    );

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(MemorizeTool::new(memory.clone())));

    let engine = Arc::new(ConversationEngine::new(
        provider.clone(),
        Arc::new(registry),
        Arc::new(ResponseLog::open(dir.path().join("logs.json"))),
        EngineConfig {
            model: Some("mock-model".into()),
            retry_budget,
            ..Default::default()
        },
    ));
    let store = ContextStore::new(dir.path().join("context.json"), SYSTEM_PROMPT);

    TestAgent {
        dir,
        provider,
        engine,
        memory,
        store,
    }
}
