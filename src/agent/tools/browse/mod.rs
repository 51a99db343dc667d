use crate::agent::tools::base::{ExecutionContext, require_str};
use crate::agent::tools::{Tool, ToolResult};
use crate::config::BrowseConfig;
use crate::utils::http::{DEFAULT_MAX_BODY_BYTES, DESKTOP_USER_AGENT, limited_text};
use crate::utils::regex::RegexPatterns;
use crate::utils::url_security::{self, ResolvedUrl};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const FETCH_TIMEOUT_SECS: u64 = 10;

/// Fetch a page's main text, or search the web for a phrase.
pub struct BrowseTool {
    client: Client,
    search_url: String,
    max_chars: usize,
    max_results: usize,
}

impl BrowseTool {
    pub fn new(config: &BrowseConfig) -> Self {
        Self::with_search_url(config, SEARCH_URL)
    }

    pub fn with_search_url(config: &BrowseConfig, search_url: &str) -> Self {
        Self {
            client: crate::utils::http::default_http_client(),
            search_url: search_url.to_string(),
            max_chars: config.max_chars,
            max_results: config.max_results,
        }
    }

    /// Fetch a model-supplied link. Internal addresses are refused and the
    /// request goes out on a client pinned to the checked addresses.
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let resolved = url_security::validate_and_resolve(url)
            .await
            .map_err(anyhow::Error::msg)?;
        let client = pinned_client(&resolved)?;
        self.read_page(&client, resolved.url.as_str()).await
    }

    async fn read_page(&self, client: &Client, url: &str) -> Result<String> {
        let resp = client
            .get(url)
            .header("User-Agent", DESKTOP_USER_AGENT)
            .send()
            .await?;
        if resp.status().is_redirection() {
            let target = resp
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown location");
            anyhow::bail!("redirect to {} not followed ({})", target, resp.status());
        }
        let html = limited_text(resp.error_for_status()?, DEFAULT_MAX_BODY_BYTES).await?;
        let text = extract_main_text(&html);
        Ok(text.chars().take(self.max_chars).collect())
    }

    async fn search(&self, query: &str) -> Result<String> {
        let resp = self
            .client
            .get(&self.search_url)
            .query(&[("q", query)])
            .header("User-Agent", DESKTOP_USER_AGENT)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .send()
            .await?
            .error_for_status()?;
        let html = limited_text(resp, DEFAULT_MAX_BODY_BYTES).await?;
        let results = parse_search_results(&html, self.max_results)?;
        debug!("browse: {} results for {:?}", results.len(), query);
        Ok(json!({ "query": query, "results": results }).to_string())
    }
}

#[async_trait]
impl Tool for BrowseTool {
    fn name(&self) -> &'static str {
        "browse"
    }

    fn description(&self) -> &'static str {
        "Get online information"
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The browse query or a direct link."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let query = match require_str(&params, "query") {
            Ok(q) => q.trim(),
            Err(e) => return Ok(ToolResult::error(format!("Error: {}", e))),
        };
        let result = if is_url(query) {
            self.fetch_page(query).await
        } else {
            self.search(query).await
        };
        Ok(ToolResult::from_result(result, "Error"))
    }
}

/// One-shot client that only connects to `resolved.addrs`. Redirects are
/// off, since a redirect target was never checked.
fn pinned_client(resolved: &ResolvedUrl) -> Result<Client> {
    let mut builder = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS));
    for addr in &resolved.addrs {
        builder = builder.resolve(&resolved.host, *addr);
    }
    builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build pinned HTTP client: {}", e))
}

fn is_url(query: &str) -> bool {
    let lower = query.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Failed to parse selector {}: {:?}", css, e))
}

/// Text of the first `article`, else `main`, else `body`, one trimmed line
/// per text node.
fn extract_main_text(html: &str) -> String {
    let cleaned = RegexPatterns::html_script().replace_all(html, "");
    let cleaned = RegexPatterns::html_style().replace_all(&cleaned, "");
    let document = Html::parse_document(&cleaned);

    for css in ["article", "main", "body"] {
        let Ok(sel) = selector(css) else { continue };
        if let Some(element) = document.select(&sel).next() {
            let lines: Vec<&str> = element
                .text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect();
            if !lines.is_empty() {
                return lines.join("\n");
            }
        }
    }

    // Fragments without any of the above
    let stripped = RegexPatterns::html_tags().replace_all(&cleaned, "\n");
    let decoded = html_escape::decode_html_entities(&stripped);
    let text = RegexPatterns::whitespace().replace_all(&decoded, " ");
    RegexPatterns::blank_lines()
        .replace_all(&text, "\n")
        .trim()
        .to_string()
}

/// DuckDuckGo wraps result links as `//duckduckgo.com/l/?uddg=<target>`.
fn resolve_result_href(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or_else(|| href.to_string())
}

fn parse_search_results(html: &str, max_results: usize) -> Result<Vec<Value>> {
    let document = Html::parse_document(html);
    let result_sel = selector(".result")?;
    let title_sel = selector(".result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut results = Vec::new();
    for result in document.select(&result_sel) {
        if results.len() >= max_results {
            break;
        }
        let Some(link) = result.select(&title_sel).next() else {
            continue;
        };
        let title = link.text().collect::<String>();
        let title = title.trim();
        if title.is_empty() {
            continue;
        }
        let href = link
            .value()
            .attr("href")
            .map(resolve_result_href)
            .unwrap_or_default();
        let body = result
            .select(&snippet_sel)
            .next()
            .map(|e| e.text().collect::<String>())
            .unwrap_or_default();

        results.push(json!({
            "title": title,
            "href": href,
            "body": body.trim(),
        }));
    }
    Ok(results)
}
