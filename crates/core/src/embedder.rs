//! E1 — Embedder collaborator. The `Embedder` trait is the seam the rest of
//! the pipeline programs against (grounded in the `Embedder` trait shape
//! used for pluggable embedding backends in the pack); [`JinaEmbedder`] is
//! the concrete HTTP-backed implementation, reading `JINA_API_KEY` per the
//! documented environment contract.

use crate::error::{CoreError, CoreResult};
use serde::Deserialize;
use std::time::Duration;

pub trait Embedder: Send + Sync {
    /// Embed a batch of texts in one request, preserving input order.
    fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        self.embed_batch(std::slice::from_ref(&text.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::EmbedderFailed("empty embedding response".into()))
    }

    /// Maximum input length (characters) this provider accepts per text.
    fn max_input_chars(&self) -> usize;
}

/// Truncate `text` to at most `max_chars` bytes at a valid char boundary
/// (§6.2: any input over the provider's limit is truncated before sending,
/// rather than rejected or silently failing at the HTTP layer).
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

const DEFAULT_JINA_MODEL: &str = "jina-embeddings-v2-base-code";
const DEFAULT_JINA_ENDPOINT: &str = "https://api.jina.ai/v1/embeddings";

pub struct JinaEmbedder {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct JinaResponse {
    data: Vec<JinaEmbeddingData>,
}

#[derive(Deserialize)]
struct JinaEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl JinaEmbedder {
    pub fn from_env() -> CoreResult<Self> {
        let api_key = std::env::var("JINA_API_KEY")
            .map_err(|_| CoreError::Config("JINA_API_KEY is not set".into()))?;
        Ok(Self::new(api_key))
    }

    pub fn new(api_key: String) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client should build with static config");
        Self {
            client,
            api_key,
            model: DEFAULT_JINA_MODEL.to_string(),
            endpoint: DEFAULT_JINA_ENDPOINT.to_string(),
        }
    }
}

impl Embedder for JinaEmbedder {
    fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let max_chars = self.max_input_chars();
        let truncated: Vec<&str> = texts.iter().map(|t| truncate_chars(t, max_chars)).collect();

        let body = serde_json::json!({
            "model": self.model,
            "input": truncated,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| CoreError::EmbedderFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(CoreError::EmbedderFailed(format!("{status}: {text}")));
        }

        let parsed: JinaResponse =
            response.json().map_err(|e| CoreError::EmbedderFailed(e.to_string()))?;

        let mut ordered: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for item in parsed.data {
            if item.index < ordered.len() {
                ordered[item.index] = Some(item.embedding);
            }
        }
        ordered
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                e.ok_or_else(|| {
                    CoreError::EmbedderFailed(format!("missing embedding for input {i}"))
                })
            })
            .collect()
    }

    fn max_input_chars(&self) -> usize {
        8000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEmbedder;
    impl Embedder for FakeEmbedder {
        fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
        fn max_input_chars(&self) -> usize {
            100
        }
    }

    #[test]
    fn embed_delegates_to_embed_batch() {
        let e = FakeEmbedder;
        let v = e.embed("hello").unwrap();
        assert_eq!(v, vec![5.0]);
    }

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        let text = "a".repeat(10) + "é" + &"b".repeat(10);
        let truncated = truncate_chars(&text, 11);
        assert!(truncated.len() <= 11);
        assert!(text.starts_with(truncated));
    }

    #[test]
    fn truncate_chars_leaves_short_input_untouched() {
        assert_eq!(truncate_chars("hi", 100), "hi");
    }
}
