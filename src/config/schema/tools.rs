use super::default_true;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub browse: BrowseConfig,
    #[serde(default)]
    pub gif: GifConfig,
    #[serde(default)]
    pub script: ScriptConfig,
}

fn default_browse_max_chars() -> usize {
    1000
}

fn default_browse_max_results() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseConfig {
    #[serde(default = "default_browse_max_chars", rename = "maxChars")]
    pub max_chars: usize,
    #[serde(default = "default_browse_max_results", rename = "maxResults")]
    pub max_results: usize,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            max_chars: default_browse_max_chars(),
            max_results: default_browse_max_results(),
        }
    }
}

fn default_gif_limit() -> usize {
    5
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GifConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default = "default_gif_limit")]
    pub limit: usize,
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            limit: default_gif_limit(),
        }
    }
}

redact_debug!(GifConfig, redact(api_key), limit,);

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_script_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_script_timeout", rename = "timeoutSecs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interpreter: default_interpreter(),
            timeout_secs: default_script_timeout(),
            sandbox: SandboxConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, rename = "additionalReadPaths")]
    pub additional_read_paths: Vec<String>,
    #[serde(default = "default_true", rename = "blockNetwork")]
    pub block_network: bool,
    /// `RLIMIT_NPROC` for the script's user, 0 for no limit.
    #[serde(default = "default_max_processes", rename = "maxProcesses")]
    pub max_processes: u64,
    /// Address space cap in MiB, 0 for no limit.
    #[serde(default = "default_max_memory_mb", rename = "maxMemoryMb")]
    pub max_memory_mb: u64,
    /// CPU seconds before the kernel kills the script, 0 for no limit.
    #[serde(default = "default_max_cpu_secs", rename = "maxCpuSecs")]
    pub max_cpu_secs: u64,
}

fn default_max_processes() -> u64 {
    512
}

fn default_max_memory_mb() -> u64 {
    1024
}

fn default_max_cpu_secs() -> u64 {
    60
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            additional_read_paths: Vec::new(),
            block_network: true,
            max_processes: default_max_processes(),
            max_memory_mb: default_max_memory_mb(),
            max_cpu_secs: default_max_cpu_secs(),
        }
    }
}
