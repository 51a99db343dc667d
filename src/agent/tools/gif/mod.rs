use crate::agent::tools::base::{ExecutionContext, require_str};
use crate::agent::tools::{Tool, ToolResult};
use crate::config::GifConfig;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const TENOR_SEARCH_URL: &str = "https://tenor.googleapis.com/v2/search";
/// Hits considered when picking a random GIF.
const TOP_K: usize = 5;
pub const NOT_FOUND: &str = "No GIF found.";

/// Reaction GIF lookup through Tenor.
pub struct GifTool {
    client: Client,
    api_key: String,
    limit: usize,
    base_url: String,
}

impl GifTool {
    pub fn new(config: &GifConfig) -> Self {
        Self::with_base_url(config, TENOR_SEARCH_URL)
    }

    pub fn with_base_url(config: &GifConfig, base_url: &str) -> Self {
        Self {
            client: crate::utils::http::default_http_client(),
            api_key: config.api_key.clone(),
            limit: config.limit,
            base_url: base_url.to_string(),
        }
    }

    async fn search(&self, query: &str) -> Result<String> {
        let limit = self.limit.to_string();
        let json: Value = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("key", self.api_key.as_str()),
                ("limit", limit.as_str()),
                ("media_filter", "minimal"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let results = json["results"].as_array().map_or(&[][..], Vec::as_slice);
        let top = &results[..results.len().min(TOP_K)];
        if top.is_empty() {
            return Ok(NOT_FOUND.to_string());
        }
        let pick = &top[fastrand::usize(..top.len())];
        debug!("gif: picked result {} of {}", pick["id"], top.len());
        pick["media_formats"]["gif"]["url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("GIF result has no gif url"))
    }
}

#[async_trait]
impl Tool for GifTool {
    fn name(&self) -> &'static str {
        "gif"
    }

    fn description(&self) -> &'static str {
        "Send a gif"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The query to search a gif about."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let query = match require_str(&params, "query") {
            Ok(q) => q,
            Err(e) => return Ok(ToolResult::error(format!("Error: {}", e))),
        };
        Ok(ToolResult::from_result(self.search(query).await, "Error"))
    }
}

#[cfg(test)]
mod tests;
