use crate::providers::base::LLMProvider;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct IndexState {
    entries: Vec<(String, Vec<f32>)>,
    /// Documents whose embedding failed; retried on the next recall.
    pending: Vec<String>,
}

/// Embedding index maintained insert-on-write.
pub struct MemoryIndex {
    provider: Arc<dyn LLMProvider>,
    model: String,
    state: Mutex<IndexState>,
}

impl MemoryIndex {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            state: Mutex::new(IndexState {
                entries: Vec::new(),
                pending: Vec::new(),
            }),
        }
    }

    /// Embed `documents` in one batch. On failure they are queued instead.
    pub async fn extend(&self, documents: Vec<String>) {
        if documents.is_empty() {
            return;
        }
        let embedded = self.provider.embed(&self.model, &documents).await;
        let mut state = self.state.lock().await;
        match embedded {
            Ok(vectors) => {
                debug!("memory index: added {} documents", documents.len());
                state.entries.extend(documents.into_iter().zip(vectors));
            }
            Err(e) => {
                warn!(
                    "memory index: embedding {} documents failed, will retry: {}",
                    documents.len(),
                    e
                );
                state.pending.extend(documents);
            }
        }
    }

    pub async fn insert(&self, document: String) {
        self.extend(vec![document]).await;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Up to `n` documents closest to `query`, best first.
    pub async fn search(&self, query: &str, n: usize) -> Result<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let pending = std::mem::take(&mut self.state.lock().await.pending);
        self.extend(pending).await;
        if self.state.lock().await.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self
            .provider
            .embed(&self.model, &[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty embedding result"))?;

        let state = self.state.lock().await;
        let mut scored: Vec<(f32, &String)> = state
            .entries
            .iter()
            .map(|(doc, vec)| (cosine_similarity(&query_vec, vec), doc))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored.into_iter().take(n).map(|(_, d)| d.clone()).collect())
    }
}

/// Cosine similarity. Vectors of different length, or a zero vector, score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
