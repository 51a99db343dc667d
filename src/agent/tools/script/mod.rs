use crate::agent::tools::base::{ExecutionContext, require_str};
use crate::agent::tools::{Tool, ToolResult};
use crate::config::ScriptConfig;
use crate::utils::sandbox::{self, ResourceLimits, SandboxRules};
use crate::utils::subprocess::scrubbed_command;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const SCRIPT_FILE: &str = "script.py";
const MAX_OUTPUT_BYTES: usize = 64 * 1024;
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs model-written Python in a separate, Landlock-confined process.
///
/// The interpreter gets a scrubbed environment and a private scratch
/// directory as its only writable path. It runs in its own network
/// namespace under rlimits, and its whole process group is killed once it
/// exits or hits the timeout.
pub struct ScriptTool {
    config: ScriptConfig,
}

impl ScriptTool {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    async fn run(&self, script: &str) -> Result<ToolResult> {
        let sandbox_config = &self.config.sandbox;
        if sandbox_config.enabled {
            if !sandbox::is_available() {
                warn!("python: Landlock is not enforced on this host, refusing to run script");
                return Ok(ToolResult::error(
                    "Error: script sandbox is unavailable on this host, python is disabled",
                ));
            }
            if sandbox_config.block_network && !sandbox::network_isolation_available() {
                warn!(
                    "python: unprivileged network namespaces are unavailable, refusing to run \
                     script (set tools.script.sandbox.blockNetwork to false to allow network)"
                );
                return Ok(ToolResult::error(
                    "Error: script network isolation is unavailable on this host, python is disabled",
                ));
            }
        }

        let scratch = tempfile::Builder::new()
            .prefix("ollacord-script-")
            .tempdir()
            .context("failed to create script directory")?;
        let script_path = scratch.path().join(SCRIPT_FILE);
        tokio::fs::write(&script_path, script)
            .await
            .context("failed to write script")?;

        let mut cmd = scrubbed_command(&self.config.interpreter);
        // -I: isolated mode, ignores PYTHON* variables and the user site dir
        cmd.arg("-I")
            .arg(SCRIPT_FILE)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // The script leads its own group so its children die with it
        #[cfg(unix)]
        cmd.process_group(0);
        sandbox::apply_limits(&mut cmd, ResourceLimits::from(sandbox_config));

        if sandbox_config.enabled {
            let rules = SandboxRules::for_script(scratch.path(), sandbox_config);
            sandbox::apply_to_command(&mut cmd, &rules)?;
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Error during execution: failed to start {}: {}",
                    self.config.interpreter, e
                )));
            }
        };
        let pid = child.id();
        let stdout = Capture::start(child.stdout.take());
        let stderr = Capture::start(child.stderr.take());

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let waited = tokio::time::timeout(timeout, child.wait()).await;
        // Whatever the script left running goes down with it
        if let Some(pid) = pid {
            sandbox::kill_process_group(pid);
        }

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Ok(ToolResult::error(format!(
                    "Error during execution: failed to wait for {}: {}",
                    self.config.interpreter, e
                )));
            }
            Err(_) => {
                let _ = child.kill().await;
                return Ok(ToolResult::error(format!(
                    "Error during execution: script timed out after {} seconds",
                    self.config.timeout_secs
                )));
            }
        };

        let mut combined = stdout.finish().await;
        combined.extend_from_slice(&stderr.finish().await);
        let truncated = combined.len() > MAX_OUTPUT_BYTES;
        combined.truncate(MAX_OUTPUT_BYTES);
        let mut text = String::from_utf8_lossy(&combined).into_owned();
        if truncated {
            text.push_str("\n[output truncated]");
        }
        debug!("python: exit={:?} output_len={}", status.code(), text.len());

        if status.success() {
            Ok(ToolResult::new(text))
        } else {
            Ok(ToolResult::error(format!("Error during execution: {}", text.trim_end())))
        }
    }
}

/// Drains one output pipe in the background, keeping at most
/// `MAX_OUTPUT_BYTES + 1` bytes so overflow is still detectable.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buf = Arc::clone(&buf);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                while let Ok(n) = pipe.read(&mut chunk).await {
                    if n == 0 {
                        break;
                    }
                    let mut kept = buf.lock().unwrap_or_else(PoisonError::into_inner);
                    let room = (MAX_OUTPUT_BYTES + 1).saturating_sub(kept.len());
                    kept.extend_from_slice(&chunk[..n.min(room)]);
                }
            })
        });
        Self { buf, task }
    }

    /// A process that escaped the group may still hold the pipe open, so
    /// the reader gets a short grace period and then keeps what it has.
    async fn finish(self) -> Vec<u8> {
        if let Some(mut task) = self.task
            && tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err()
        {
            task.abort();
        }
        std::mem::take(&mut *self.buf.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl Tool for ScriptTool {
    fn name(&self) -> &'static str {
        "python"
    }

    fn description(&self) -> &'static str {
        "Use python for advanced task."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "script": {
                    "type": "string",
                    "description": "The script for your task."
                }
            },
            "required": ["script"]
        })
    }

    fn execution_timeout(&self) -> Duration {
        // Leave room for the inner timeout to report first
        Duration::from_secs(self.config.timeout_secs + 5)
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let script = match require_str(&params, "script") {
            Ok(s) => s,
            Err(e) => return Ok(ToolResult::error(format!("Error during execution: {}", e))),
        };
        match self.run(script).await {
            Ok(result) => Ok(result),
            Err(e) => Ok(ToolResult::error(format!("Error during execution: {:#}", e))),
        }
    }
}
