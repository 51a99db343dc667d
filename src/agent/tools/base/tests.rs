use super::*;
use serde_json::json;

#[test]
fn test_tool_result_constructors() {
    let ok = ToolResult::new("done");
    assert!(!ok.is_error);
    assert_eq!(ok.to_string(), "done");
    assert!(ToolResult::error("bad").is_error);
}

#[test]
fn test_from_result_formats_errors() {
    let ok = ToolResult::from_result(Ok("fine".into()), "Error");
    assert_eq!(ok.content, "fine");
    let err = ToolResult::from_result(Err(anyhow::anyhow!("timed out")), "Error");
    assert!(err.is_error);
    assert_eq!(err.content, "Error: timed out");
}

#[test]
fn test_require_str() {
    let params = json!({"query": "cats", "blank": "  ", "num": 3, "nil": null});
    assert_eq!(require_str(&params, "query"), Ok("cats"));
    assert!(require_str(&params, "blank").unwrap_err().contains("empty"));
    assert!(require_str(&params, "num").unwrap_err().contains("string"));
    assert!(require_str(&params, "nil").unwrap_err().contains("missing"));
    assert!(require_str(&params, "absent").unwrap_err().contains("missing"));
}

struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }
    fn description(&self) -> &'static str {
        "Echo text back"
    }
    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }
    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> anyhow::Result<ToolResult> {
        Ok(ToolResult::new(params["text"].as_str().unwrap_or_default()))
    }
}

#[test]
fn test_to_definition() {
    let def = Echo.to_definition();
    assert_eq!(def.name, "echo");
    assert_eq!(def.description, "Echo text back");
    assert_eq!(def.parameters["type"], "object");
    assert!(!Echo.cacheable());
}
