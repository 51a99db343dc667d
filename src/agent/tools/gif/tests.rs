use super::*;
use proptest::prelude::*;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn hits(n: usize) -> Value {
    let results: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "id": i.to_string(),
                "media_formats": {"gif": {"url": format!("https://media.tenor.com/{i}.gif")}}
            })
        })
        .collect();
    json!({ "results": results })
}

async fn server_with(body: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/search"))
        .and(query_param("key", "tenor-key"))
        .and(query_param("limit", "5"))
        .and(query_param("media_filter", "minimal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    server
}

fn tool_for(server: &MockServer) -> GifTool {
    GifTool::with_base_url(
        &GifConfig {
            api_key: "tenor-key".into(),
            limit: 5,
        },
        &format!("{}/v2/search", server.uri()),
    )
}

async fn run(tool: &GifTool, query: &str) -> ToolResult {
    tool.execute(json!({ "query": query }), &ExecutionContext::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_returns_one_of_the_top_five() {
    // The server sends more than five; only the first five are eligible
    let server = server_with(hits(8)).await;
    let tool = tool_for(&server);
    let allowed: Vec<String> = (0..5)
        .map(|i| format!("https://media.tenor.com/{i}.gif"))
        .collect();
    for _ in 0..20 {
        let result = run(&tool, "cat").await;
        assert!(!result.is_error);
        assert!(allowed.contains(&result.content), "{}", result.content);
    }
}

#[tokio::test]
async fn test_single_hit() {
    let server = server_with(hits(1)).await;
    let result = run(&tool_for(&server), "dog").await;
    assert_eq!(result.content, "https://media.tenor.com/0.gif");
}

#[tokio::test]
async fn test_no_hits_is_sentinel() {
    let server = server_with(hits(0)).await;
    let result = run(&tool_for(&server), "zzzz").await;
    assert!(!result.is_error);
    assert_eq!(result.content, NOT_FOUND);

    let server = server_with(json!({})).await;
    assert_eq!(run(&tool_for(&server), "zzzz").await.content, NOT_FOUND);
}

#[tokio::test]
async fn test_http_error_is_inline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    let result = run(&tool_for(&server), "cat").await;
    assert!(result.is_error);
    assert!(result.content.starts_with("Error: "));
}

#[tokio::test]
async fn test_missing_query() {
    let tool = GifTool::new(&GifConfig::default());
    let result = tool
        .execute(json!({"q": "cat"}), &ExecutionContext::default())
        .await
        .unwrap();
    assert!(result.is_error);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_pick_is_within_top_k(n in 1usize..12) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let server = server_with(hits(n)).await;
            let result = run(&tool_for(&server), "x").await;
            let idx: usize = result
                .content
                .trim_start_matches("https://media.tenor.com/")
                .trim_end_matches(".gif")
                .parse()
                .unwrap();
            assert!(idx < n.min(TOP_K));
        });
    }
}
