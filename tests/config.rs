use ollacord::config::{Config, load_config, save_config};
use std::path::Path;
use tempfile::TempDir;

fn write_config(dir: &TempDir, json: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.json");
    std::fs::write(&path, json).unwrap();
    path
}

fn load_err(path: &Path) -> String {
    format!("{:#}", load_config(Some(path)).unwrap_err())
}

#[test]
fn test_camel_case_keys_are_read() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "agent": {
                "systemPrompt": "Be brief.",
                "maxLength": 30,
                "summarizeCount": 10,
                "retryBudget": 2,
                "memoryRecall": 3,
                "workspace": "/tmp/ollacord-test",
                "attachmentFolder": "files"
            },
            "ollama": {"model": "llama3.1:8b", "embedModel": "nomic-embed-text", "hostOptimizations": false},
            "tools": {"browse": {"maxResults": 3}, "script": {"enabled": false}}
        }"#,
    );

    let config = load_config(Some(&path)).unwrap();

    assert_eq!(config.agent.system_prompt, "Be brief.");
    assert_eq!(config.agent.max_length, 30);
    assert_eq!(config.agent.summarize_count, 10);
    assert_eq!(config.agent.retry_budget, 2);
    assert_eq!(config.agent.memory_recall, 3);
    assert_eq!(config.ollama.model, "llama3.1:8b");
    assert_eq!(config.ollama.embed_model, "nomic-embed-text");
    assert!(!config.ollama.host_optimizations);
    assert_eq!(config.tools.browse.max_results, 3);
    assert!(!config.tools.script.enabled);
    assert_eq!(
        config.attachment_path(),
        Path::new("/tmp/ollacord-test").join("files")
    );
}

#[test]
fn test_missing_sections_use_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "{}");

    let config = load_config(Some(&path)).unwrap();
    let defaults = Config::default();

    assert_eq!(config.agent.max_length, defaults.agent.max_length);
    assert_eq!(config.agent.summarize_count, defaults.agent.summarize_count);
    assert_eq!(config.ollama.model, defaults.ollama.model);
    assert!(config.tools.script.enabled);
    assert!(config.tools.script.sandbox.enabled);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_config(Some(&dir.path().join("absent.json"))).unwrap();
    assert_eq!(config.agent.retry_budget, 5);
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = TempDir::new().unwrap();

    let path = write_config(&dir, r#"{"agent": {"maxLength": 5, "summarizeCount": 10}}"#);
    assert!(load_err(&path).contains("maxLength"));

    let path = write_config(&dir, r#"{"ollama": {"model": "  "}}"#);
    assert!(load_err(&path).contains("ollama.model"));

    let path = write_config(&dir, r#"{"agent": {"attachmentFolder": "../outside"}}"#);
    assert!(load_err(&path).contains("attachmentFolder"));

    let path = write_config(&dir, r#"{"tools": {"gif": {"limit": 0}}}"#);
    assert!(load_err(&path).contains("tools.gif.limit"));
}

#[test]
fn test_malformed_json_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "{ agent: ");
    assert!(load_err(&path).contains("Failed to parse config JSON"));
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.agent.system_prompt = "Stay on topic.".into();
    config.ollama.model = "mistral:7b".into();
    save_config(&config, Some(&path)).unwrap();

    let loaded = load_config(Some(&path)).unwrap();
    assert_eq!(loaded.agent.system_prompt, "Stay on topic.");
    assert_eq!(loaded.ollama.model, "mistral:7b");

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"systemPrompt\""));
}
