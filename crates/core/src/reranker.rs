//! E3 — Reranker collaborator (optional). When configured, takes the
//! hybrid search's candidate set and re-scores it against the query with a
//! cross-encoder, same trait-seam pattern as [`crate::embedder::Embedder`]
//! and [`crate::vectorstore::VectorStore`].

use crate::error::{CoreError, CoreResult};
use serde::Deserialize;
use std::time::Duration;

pub trait Reranker: Send + Sync {
    /// Re-score `documents` against `query`, returning `(index, score)`
    /// pairs into `documents` in descending order of relevance. The score is
    /// carried back by the caller so callers can report both the original
    /// hybrid score and the reranked one.
    fn rerank(&self, query: &str, documents: &[String]) -> CoreResult<Vec<(usize, f32)>>;
}

const DEFAULT_RERANKER_ENDPOINT: &str = "https://api.jina.ai/v1/rerank";
const DEFAULT_RERANKER_MODEL: &str = "jina-reranker-v2-base-multilingual";

pub struct JinaReranker {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl JinaReranker {
    pub fn from_env() -> Option<Self> {
        std::env::var("JINA_API_KEY").ok().map(Self::new)
    }

    pub fn new(api_key: String) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client should build with static config");
        Self {
            client,
            api_key,
            model: DEFAULT_RERANKER_MODEL.to_string(),
            endpoint: DEFAULT_RERANKER_ENDPOINT.to_string(),
        }
    }
}

impl Reranker for JinaReranker {
    fn rerank(&self, query: &str, documents: &[String]) -> CoreResult<Vec<(usize, f32)>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| CoreError::RerankerFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(CoreError::RerankerFailed(format!("{status}: {text}")));
        }

        let mut parsed: RerankResponse =
            response.json().map_err(|e| CoreError::RerankerFailed(e.to_string()))?;
        parsed.results.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        Ok(parsed.results.into_iter().map(|r| (r.index, r.relevance_score)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct IdentityReranker;
    impl Reranker for IdentityReranker {
        fn rerank(&self, _query: &str, documents: &[String]) -> CoreResult<Vec<(usize, f32)>> {
            Ok((0..documents.len()).map(|i| (i, 1.0)).collect())
        }
    }

    #[test]
    fn identity_reranker_preserves_order() {
        let docs = vec!["a".to_string(), "b".to_string()];
        let r = IdentityReranker.rerank("q", &docs).unwrap();
        assert_eq!(r, vec![(0, 1.0), (1, 1.0)]);
    }
}
