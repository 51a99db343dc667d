use crate::errors::{OllacordError, TransientFailure};
use serde_json::Value;
use tracing::{error, warn};

/// Maps HTTP and transport failures from the model server onto `OllacordError`.
///
/// Functions are designed to be used as static methods.
pub struct ProviderErrorHandler;

impl ProviderErrorHandler {
    /// Build the typed error for a non-success status and its body.
    pub fn parse_api_error(status: u16, error_text: &str) -> OllacordError {
        // Ollama reports errors as {"error": "..."}; proxies send HTML or plain text
        let detail = serde_json::from_str::<Value>(error_text)
            .ok()
            .and_then(|v| match v.get("error") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Object(o)) => o
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .unwrap_or_else(|| error_text.trim().chars().take(300).collect());

        if let Some(kind) = TransientFailure::from_status(status) {
            warn!("model server returned {} ({})", status, kind);
            return OllacordError::Transient {
                kind,
                message: format!("HTTP {}: {}", status, detail),
            };
        }

        let message = if status == 404 && detail.contains("not found") {
            format!(
                "{}. Pull it first with `ollama pull <model>` or change ollama.model in config.json",
                detail
            )
        } else {
            format!("API error ({}): {}", status, detail)
        };
        OllacordError::Provider {
            message,
            status: Some(status),
        }
    }

    /// Classify a `reqwest` transport error.
    pub fn from_transport(err: &reqwest::Error, provider: &str) -> OllacordError {
        if err.is_timeout() {
            warn!("{} request timed out: {}", provider, err);
            return OllacordError::Transient {
                kind: TransientFailure::RequestTimeout,
                message: err.to_string(),
            };
        }
        error!("{} transport error: {}", provider, err);
        OllacordError::Provider {
            message: format!("{} request failed: {}", provider, err),
            status: err.status().map(|s| s.as_u16()),
        }
    }

    /// Check HTTP status and return a typed error if the response is not successful.
    /// On success, returns the response unchanged for further processing.
    pub async fn check_http_status(
        resp: reqwest::Response,
        provider: &str,
    ) -> Result<reqwest::Response, anyhow::Error> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let error_text = resp
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());

        error!("{} provider returned HTTP {}", provider, status);
        Err(Self::parse_api_error(status, &error_text).into())
    }
}
