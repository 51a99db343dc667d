use super::default_true;
use serde::{Deserialize, Serialize};

fn default_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen3:8b".to_string()
}

fn default_embed_model() -> String {
    "paraphrase-multilingual".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embed_model", rename = "embedModel")]
    pub embed_model: String,
    /// Keep models resident on a local server (`keep_alive: -1`).
    #[serde(default = "default_true", rename = "hostOptimizations")]
    pub host_optimizations: bool,
    #[serde(default = "default_true", rename = "loadModelOnStart")]
    pub load_model_on_start: bool,
    #[serde(
        default = "default_request_timeout_secs",
        rename = "requestTimeoutSecs"
    )]
    pub request_timeout_secs: u64,
}

impl OllamaConfig {
    pub fn is_local(&self) -> bool {
        reqwest::Url::parse(&self.url).is_ok_and(|u| {
            matches!(
                u.host_str(),
                Some("localhost" | "127.0.0.1" | "[::1]")
            )
        })
    }

    /// `keep_alive` value to send with each request, if any.
    pub fn keep_alive(&self) -> Option<i64> {
        (self.host_optimizations && self.is_local()).then_some(-1)
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            model: default_model(),
            embed_model: default_embed_model(),
            host_optimizations: true,
            load_model_on_start: true,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
