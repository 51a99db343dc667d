use super::*;
use crate::agent::context::Role;
use crate::providers::base::LLMResponse;
use async_trait::async_trait;
use std::sync::Mutex;

struct ScriptedProvider {
    reply: Result<String, String>,
    requests: Mutex<Vec<(Vec<Message>, Option<bool>)>>,
}

impl ScriptedProvider {
    fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err("boom".to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> Result<LLMResponse> {
        assert!(req.tools.is_none(), "summarizer must not offer tools");
        self.requests
            .lock()
            .unwrap()
            .push((req.messages.clone(), req.think));
        match &self.reply {
            Ok(text) => Ok(LLMResponse {
                content: Some(text.clone()),
                ..Default::default()
            }),
            Err(e) => Err(anyhow::anyhow!(e.clone())),
        }
    }

    fn default_model(&self) -> &'static str {
        "mock"
    }
}

fn store_with(n: usize) -> ContextStore {
    let mut store = ContextStore::in_memory(vec![Turn::system("sys")]).unwrap();
    for i in 1..n {
        let role = if i % 2 == 1 { Role::User } else { Role::Assistant };
        store.append(format!("turn {i}"), role, vec![], None).unwrap();
    }
    store
}

#[tokio::test]
async fn test_noop_when_not_long_enough() {
    let provider = ScriptedProvider::ok("summary");
    let summarizer = Summarizer::new(provider.clone(), None);
    // len == k + 1
    let mut store = store_with(4);
    let before = store.turns().to_vec();
    assert!(!summarizer.summarize(&mut store, 3).await.unwrap());
    assert_eq!(store.turns(), before.as_slice());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_replaces_prefix_with_summary_turn() {
    let provider = ScriptedProvider::ok("  they talked about tea  ");
    let summarizer = Summarizer::new(provider.clone(), None);
    let mut store = store_with(10);
    let before = store.turns().to_vec();

    assert!(summarizer.summarize(&mut store, 4).await.unwrap());
    assert_eq!(store.len(), 10 - 4 + 1);
    assert_eq!(store.turns()[0], before[0]);
    assert_eq!(store.turns()[1].role, Role::System);
    assert_eq!(
        store.turns()[1].content,
        "(Summary of earlier conversation)\nthey talked about tea"
    );
    assert_eq!(&store.turns()[2..], &before[5..]);
}

#[tokio::test]
async fn test_prompt_contains_only_summarized_turns() {
    let provider = ScriptedProvider::ok("s");
    let summarizer = Summarizer::new(provider.clone(), None).with_thinking_support(true);
    let mut store = store_with(6);
    summarizer.summarize(&mut store, 2).await.unwrap();

    let requests = provider.requests.lock().unwrap();
    let (messages, think) = &requests[0];
    assert_eq!(*think, Some(false));
    assert_eq!(messages[0].role, "system");
    assert!(messages[0].content.starts_with("You are a summarizer."));
    let prompt = &messages[1].content;
    assert!(prompt.starts_with("Summarize the following conversation"));
    assert!(prompt.contains("turn 1"));
    assert!(prompt.contains("turn 2"));
    assert!(!prompt.contains("turn 3"));
    assert!(!prompt.contains("sys"));
}

#[tokio::test]
async fn test_think_omitted_without_support() {
    let provider = ScriptedProvider::ok("s");
    let summarizer = Summarizer::new(provider.clone(), None).with_thinking_support(false);
    let mut store = store_with(6);
    summarizer.summarize(&mut store, 2).await.unwrap();
    assert_eq!(provider.requests.lock().unwrap()[0].1, None);
}

#[tokio::test]
async fn test_failure_leaves_store_untouched() {
    let provider = ScriptedProvider::failing();
    let summarizer = Summarizer::new(provider, None);
    let mut store = store_with(8);
    let before = store.turns().to_vec();
    assert!(summarizer.summarize(&mut store, 3).await.is_err());
    assert_eq!(store.turns(), before.as_slice());
}

#[tokio::test]
async fn test_empty_summary_is_failure() {
    let provider = ScriptedProvider::ok("   ");
    let summarizer = Summarizer::new(provider, None);
    let mut store = store_with(8);
    let before = store.turns().to_vec();
    assert!(summarizer.summarize(&mut store, 3).await.is_err());
    assert_eq!(store.turns(), before.as_slice());
}

#[tokio::test]
async fn test_zero_count_is_noop() {
    let provider = ScriptedProvider::ok("s");
    let summarizer = Summarizer::new(provider.clone(), None);
    let mut store = store_with(5);
    assert!(!summarizer.summarize(&mut store, 0).await.unwrap());
    assert_eq!(provider.calls(), 0);
}
