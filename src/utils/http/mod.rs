use anyhow::{Result, bail};
use reqwest::{Client, Response};
use std::time::Duration;

/// Pages larger than this are refused outright or cut while streaming.
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Search frontends answer plain bot agents with a captcha page.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client shared by the browse and gif tools.
pub fn default_http_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Read at most `max_bytes` of the body and decode it lossily.
///
/// A declared `Content-Length` over the cap fails before anything is read.
/// An undeclared oversized body is cut at the cap.
pub async fn limited_text(mut resp: Response, max_bytes: usize) -> Result<String> {
    if let Some(declared) = resp.content_length()
        && declared as usize > max_bytes
    {
        bail!(
            "response body too large: {} bytes, limit is {}",
            declared,
            max_bytes
        );
    }

    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = max_bytes - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}
