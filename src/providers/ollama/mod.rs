use crate::config::OllamaConfig;
use crate::providers::base::{ChatRequest, LLMProvider, LLMResponse, Message, ToolCallRequest};
use crate::providers::errors::ProviderErrorHandler;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

const CONNECT_TIMEOUT_SECS: u64 = 30;
const PROVIDER_NAME: &str = "Ollama";

/// Client for the native Ollama HTTP API (`/api/chat`, `/api/show`, `/api/embed`).
pub struct OllamaProvider {
    default_model: String,
    base_url: String,
    keep_alive: Option<i64>,
    client: Client,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            default_model: config.model.clone(),
            base_url: config.url.trim_end_matches('/').to_string(),
            keep_alive: config.keep_alive(),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn with_base_url(base_url: &str, default_model: &str, keep_alive: Option<i64>) -> Self {
        Self {
            default_model: default_model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            keep_alive,
            client: Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn model_or_default<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model.unwrap_or(&self.default_model)
    }

    fn encode_messages(messages: Vec<Message>) -> Vec<Value> {
        messages
            .into_iter()
            .map(|msg| {
                let mut obj = json!({
                    "role": msg.role,
                    "content": msg.content,
                });
                if !msg.images.is_empty() {
                    obj["images"] = json!(msg.images);
                }
                obj
            })
            .collect()
    }

    fn build_chat_body(&self, req: ChatRequest<'_>, stream: bool) -> Value {
        let model = self.model_or_default(req.model).to_string();
        let mut body = json!({
            "model": model,
            "messages": Self::encode_messages(req.messages),
            "stream": stream,
        });

        if let Some(tools) = req.tools.filter(|t| !t.is_empty()) {
            let tools_json: Vec<Value> = tools
                .into_iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools_json);
        }
        if let Some(think) = req.think {
            body["think"] = json!(think);
        }
        if let Some(keep_alive) = self.keep_alive {
            body["keep_alive"] = json!(keep_alive);
        }
        body
    }

    fn parse_response(json: Value) -> Result<LLMResponse> {
        let message = json
            .get("message")
            .and_then(Value::as_object)
            .context("No message in Ollama response")?;

        let content = message
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string);
        let reasoning_content = message
            .get("thinking")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
            for (idx, tc) in calls.iter().enumerate() {
                let Some(function) = tc.get("function") else {
                    continue;
                };
                // Arguments usually arrive as an object, some templates emit a JSON string
                let arguments = match function.get("arguments") {
                    Some(Value::String(s)) => {
                        serde_json::from_str(s).unwrap_or_else(|_| json!({}))
                    }
                    Some(v @ Value::Object(_)) => v.clone(),
                    _ => json!({}),
                };
                tool_calls.push(ToolCallRequest {
                    id: tc
                        .get("id")
                        .and_then(Value::as_str)
                        .map_or_else(|| format!("call_{}", idx), str::to_string),
                    name: function
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    arguments,
                });
            }
        }

        Ok(LLMResponse {
            content,
            tool_calls,
            reasoning_content,
            input_tokens: json.get("prompt_eval_count").and_then(Value::as_u64),
            output_tokens: json.get("eval_count").and_then(Value::as_u64),
            raw: Some(json),
        })
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderErrorHandler::from_transport(&e, PROVIDER_NAME))?;
        ProviderErrorHandler::check_http_status(resp, PROVIDER_NAME).await
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> Result<LLMResponse> {
        let body = self.build_chat_body(req, false);
        debug!(
            "ollama chat: model={} messages={}",
            body["model"],
            body["messages"].as_array().map_or(0, Vec::len)
        );

        let resp = self.post("/api/chat", &body).await?;
        let json: Value = resp
            .json()
            .await
            .map_err(|e| ProviderErrorHandler::from_transport(&e, PROVIDER_NAME))?;
        Self::parse_response(json)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn warmup(&self, model: Option<&str>) -> Result<()> {
        let model = self.model_or_default(model);
        info!("loading model {} into memory", model);
        let req = ChatRequest {
            messages: vec![Message::user("Hi")],
            model: Some(model),
            ..Default::default()
        };
        let body = self.build_chat_body(req, true);
        let mut resp = self.post("/api/chat", &body).await?;
        // The first streamed chunk means the weights are resident
        let first = resp
            .chunk()
            .await
            .map_err(|e| ProviderErrorHandler::from_transport(&e, PROVIDER_NAME))?;
        if first.is_none() {
            anyhow::bail!("model server closed the stream before producing output");
        }
        info!("model {} loaded", model);
        Ok(())
    }

    async fn capabilities(&self, model: Option<&str>) -> Result<Vec<String>> {
        let model = self.model_or_default(model);
        let resp = self.post("/api/show", &json!({ "name": model })).await?;
        let json: Value = resp
            .json()
            .await
            .map_err(|e| ProviderErrorHandler::from_transport(&e, PROVIDER_NAME))?;
        Ok(json
            .get("capabilities")
            .and_then(Value::as_array)
            .map(|caps| {
                caps.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let resp = self
            .post("/api/embed", &json!({ "model": model, "input": inputs }))
            .await?;
        let json: Value = resp
            .json()
            .await
            .map_err(|e| ProviderErrorHandler::from_transport(&e, PROVIDER_NAME))?;
        let embeddings = json
            .get("embeddings")
            .and_then(Value::as_array)
            .context("No embeddings in Ollama response")?;

        let vectors: Vec<Vec<f32>> = embeddings
            .iter()
            .map(|row| {
                row.as_array()
                    .map(|vals| {
                        vals.iter()
                            .filter_map(Value::as_f64)
                            .map(|v| v as f32)
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();
        if vectors.len() != inputs.len() {
            anyhow::bail!(
                "embedding count mismatch: sent {}, got {}",
                inputs.len(),
                vectors.len()
            );
        }
        Ok(vectors)
    }
}
