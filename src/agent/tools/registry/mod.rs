use crate::agent::tools::base::ExecutionContext;
use crate::agent::tools::{Tool, ToolResult};
use crate::providers::base::ToolDefinition;
use anyhow::Result;
use lru::LruCache;
use serde_json::Value;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Tool output is cut to this many characters before it enters the context.
pub const MAX_OUTPUT_CHARS: usize = 10_000;
const CUT_MARKER: &str = "\n... (output truncated)";

const CACHE_CAPACITY: usize = 64;
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Named tool set the engine dispatches model tool calls into.
///
/// Every call runs in its own task under the tool's timeout, so a hung or
/// panicking tool becomes an error result instead of taking the
/// conversation down with it.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    cache: ResultCache,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            cache: ResultCache::new(CACHE_CAPACITY, CACHE_TTL),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().trim().to_string();
        if name.is_empty() || name.chars().any(char::is_control) {
            warn!("ignoring tool with unusable name {:?}", tool.name());
            return;
        }
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!("tool '{}' registered twice, keeping the newer one", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered names in alphabetical order.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas for every registered tool, sorted by name.
    pub fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Run tool `name` with `params`.
    ///
    /// Unknown names, tool failures, panics and timeouts all come back as
    /// an error result the model can read. `Err` is reserved for a
    /// cancelled task.
    pub async fn execute(
        &self,
        name: &str,
        params: Value,
        ctx: &ExecutionContext,
    ) -> Result<ToolResult> {
        let Some(tool) = self.get(name) else {
            warn!("model requested unknown tool '{}'", name);
            return Ok(ToolResult::error(format!("Unknown tool type: {}", name)));
        };
        debug!("running tool {} (channel={}): {}", name, ctx.channel, params);

        let key = tool.cacheable().then(|| cache_key(name, &params));
        if let Some(key) = &key
            && let Some(hit) = self.cache.get(key).await
        {
            debug!("tool {} answered from cache", name);
            return Ok(hit);
        }

        let started = Instant::now();
        let mut result = run_guarded(name, tool, params, ctx.clone()).await?;
        result.content = cap_output(&result.content, MAX_OUTPUT_CHARS);

        if result.is_error {
            warn!("tool {} failed: {}", name, result.content);
        } else {
            info!(
                "tool {} finished in {:?} ({} chars)",
                name,
                started.elapsed(),
                result.content.len()
            );
            if let Some(key) = key {
                self.cache.put(key, result.clone()).await;
            }
        }
        Ok(result)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the tool so a panic is caught as a `JoinError`, and bound it by
/// the tool's own timeout.
async fn run_guarded(
    name: &str,
    tool: Arc<dyn Tool>,
    params: Value,
    ctx: ExecutionContext,
) -> Result<ToolResult> {
    let timeout = tool.execution_timeout();
    let handle = tokio::task::spawn(async move {
        tokio::time::timeout(timeout, tool.execute(params, &ctx)).await
    });

    match handle.await {
        Ok(Ok(Ok(result))) => Ok(result),
        Ok(Ok(Err(e))) => Ok(ToolResult::error(format!("Error: {:#}", e))),
        Ok(Err(_elapsed)) => {
            warn!("tool {} timed out after {}s", name, timeout.as_secs());
            Ok(ToolResult::error(format!(
                "Error: tool '{}' timed out after {}s",
                name,
                timeout.as_secs()
            )))
        }
        Err(join_err) if join_err.is_panic() => {
            let payload = join_err.into_panic();
            let reason = payload
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| payload.downcast_ref::<&str>().copied())
                .unwrap_or("unknown cause");
            error!("tool {} panicked: {}", name, reason);
            Ok(ToolResult::error(format!(
                "Error: tool '{}' crashed: {}",
                name, reason
            )))
        }
        Err(_) => Err(anyhow::anyhow!("tool '{}' was cancelled", name)),
    }
}

/// Cut `content` to at most `max_chars` characters, marker included.
fn cap_output(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let keep = max_chars.saturating_sub(CUT_MARKER.chars().count());
    let mut out: String = content.chars().take(keep).collect();
    out.push_str(CUT_MARKER);
    out
}

/// serde_json objects are BTreeMaps, so the serialized arguments already
/// have their keys sorted at every depth.
fn cache_key(name: &str, params: &Value) -> String {
    format!("{}:{}", name, params)
}

/// Short-lived LRU of successful results for cacheable tools.
struct ResultCache {
    entries: Mutex<LruCache<String, (Instant, ToolResult)>>,
    ttl: Duration,
}

impl ResultCache {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    async fn get(&self, key: &str) -> Option<ToolResult> {
        let mut entries = self.entries.lock().await;
        let (stored, result) = entries.get(key).cloned()?;
        if stored.elapsed() < self.ttl {
            return Some(result);
        }
        entries.pop(key);
        None
    }

    async fn put(&self, key: String, result: ToolResult) {
        self.entries.lock().await.put(key, (Instant::now(), result));
    }
}
