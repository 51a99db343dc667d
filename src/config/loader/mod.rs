use crate::config::Config;
use crate::utils::{ensure_dir, get_ollacord_home};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variables that take precedence over the file.
const ENV_DISCORD_TOKEN: &str = "OLLACORD_DISCORD_TOKEN";
const ENV_GIF_TOKEN: &str = "OLLACORD_GIF_TOKEN";
const ENV_OLLAMA_URL: &str = "OLLACORD_OLLAMA_URL";

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_ollacord_home()?.join("config.json"))
}

fn resolve(config_path: Option<&Path>) -> PathBuf {
    config_path.map_or_else(
        || get_config_path().unwrap_or_else(|_| PathBuf::from("config.json")),
        Path::to_path_buf,
    )
}

/// Load, apply environment overrides, then validate.
///
/// A missing file yields the defaults.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let path = resolve(config_path);
    let mut config = if path.exists() {
        read_file(&path)?
    } else {
        debug!("no config at {}, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config);
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

fn read_file(path: &Path) -> Result<Config> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open config at {}", path.display()))?;
    // save_config holds the exclusive lock while it swaps the file in
    file.lock_shared()
        .context("Failed to acquire shared lock on config file")?;

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let data: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?;
    warn_if_readable_by_others(path);

    serde_json::from_value(migrate_config(data)).context("Failed to deserialize config")
}

fn apply_env_overrides(config: &mut Config) {
    let overrides: [(&str, &mut String); 3] = [
        (ENV_DISCORD_TOKEN, &mut config.discord.token),
        (ENV_GIF_TOKEN, &mut config.tools.gif.api_key),
        (ENV_OLLAMA_URL, &mut config.ollama.url),
    ];
    for (name, field) in overrides {
        if let Ok(value) = std::env::var(name)
            && !value.trim().is_empty()
        {
            debug!("{} set, overriding the config file", name);
            *field = value;
        }
    }
}

/// The file holds the bot token, so anything wider than 0600 gets a warning.
#[cfg(unix)]
fn warn_if_readable_by_others(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(meta) = fs::metadata(path) {
        let mode = meta.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            warn!(
                "config file {} has permissions {:o}, recommend 0600",
                path.display(),
                mode
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_readable_by_others(_path: &Path) {}

/// Early configs called the server address `ollama.link`.
fn migrate_config(mut data: Value) -> Value {
    if let Some(ollama) = data.get_mut("ollama").and_then(Value::as_object_mut)
        && let Some(link) = ollama.remove("link")
        && !ollama.contains_key("url")
    {
        ollama.insert("url".to_string(), link);
    }
    data
}

pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let path = resolve(config_path);
    ensure_dir(path.parent().context("Config path has no parent")?)?;

    // The config itself is replaced by rename, so the lock lives beside it
    let lock_path = path.with_extension("json.lock");
    let lock = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file at {}", lock_path.display()))?;
    lock.lock_exclusive()
        .context("Failed to acquire exclusive lock on config lock file")?;

    let json = serde_json::to_string_pretty(config)?;
    crate::utils::atomic_write(&path, &json)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(&path, fs::Permissions::from_mode(0o600)) {
            warn!("could not restrict {}: {}", path.display(), e);
        }
    }
    Ok(())
}
