//! E2 — VectorStore collaborator. Shaped after the `VectorStore` trait used
//! for pluggable vector backends in the pack (`search`/`upsert`/`delete` by
//! collection), but synchronous and namespace-scoped rather than
//! collection-scoped, and exposing a single hybrid dense+BM25 query method
//! instead of a pure-vector `search` — Turbopuffer's `rank_by` natively
//! blends both in one request, so the trait names the blend directly rather
//! than asking callers to run two searches and merge scores themselves.

use crate::error::{CoreError, CoreResult};
use crate::model::{Chunk, Symbol, SymbolType};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HybridHit {
    pub chunk: Chunk,
    pub score: f32,
}

pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records by id within `namespace`.
    fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> CoreResult<()>;

    /// Delete records by chunk id within `namespace`.
    fn delete(&self, namespace: &str, chunk_ids: &[String]) -> CoreResult<()>;

    /// Hybrid dense-vector + BM25 search within `namespace`, blended with
    /// `vector_weight`/`bm25_weight` (spec §4.12).
    fn hybrid_search(
        &self,
        namespace: &str,
        query_text: &str,
        query_embedding: &[f32],
        top_k: usize,
        vector_weight: f32,
        bm25_weight: f32,
    ) -> CoreResult<Vec<HybridHit>>;

    /// Drop an entire namespace (used by `clear_index`).
    fn delete_namespace(&self, namespace: &str) -> CoreResult<()>;

    /// Whether `namespace` currently holds any records.
    fn namespace_exists(&self, namespace: &str) -> CoreResult<bool>;
}

const DEFAULT_TURBOPUFFER_ENDPOINT: &str = "https://api.turbopuffer.com/v1";

pub struct TurbopufferStore {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

impl TurbopufferStore {
    pub fn from_env() -> CoreResult<Self> {
        let api_key = std::env::var("TURBOPUFFER_API_KEY")
            .map_err(|_| CoreError::Config("TURBOPUFFER_API_KEY is not set".into()))?;
        Ok(Self::new(api_key))
    }

    pub fn new(api_key: String) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client should build with static config");
        Self { client, api_key, base_url: DEFAULT_TURBOPUFFER_ENDPOINT.to_string() }
    }

    fn namespace_url(&self, namespace: &str, suffix: &str) -> String {
        format!("{}/namespaces/{namespace}{suffix}", self.base_url)
    }
}

impl VectorStore for TurbopufferStore {
    fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> CoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let rows: Vec<_> = records
            .iter()
            .map(|r| {
                let symbols_csv = r.chunk.symbols.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(",");
                let exports_csv = r.chunk.exports.join(",");
                json!({
                    "id": r.chunk.id,
                    "vector": r.embedding,
                    "attributes": {
                        "content": r.chunk.content,
                        "filePath": r.chunk.file_path,
                        "relativePath": r.chunk.relative_path,
                        "startLine": r.chunk.start_line,
                        "endLine": r.chunk.end_line,
                        "language": r.chunk.language,
                        "symbols": symbols_csv,
                        "exports": exports_csv,
                    }
                })
            })
            .collect();

        let response = self
            .client
            .post(self.namespace_url(namespace, ""))
            .bearer_auth(&self.api_key)
            .json(&json!({ "upsert_rows": rows, "distance_metric": "cosine_distance" }))
            .send()
            .map_err(|e| CoreError::VectorStoreFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(CoreError::VectorStoreFailed(format!("{status}: {text}")));
        }
        Ok(())
    }

    fn delete(&self, namespace: &str, chunk_ids: &[String]) -> CoreResult<()> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(self.namespace_url(namespace, ""))
            .bearer_auth(&self.api_key)
            .json(&json!({ "deletes": chunk_ids }))
            .send()
            .map_err(|e| CoreError::VectorStoreFailed(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(CoreError::VectorStoreFailed(format!("{status}: {text}")));
        }
        Ok(())
    }

    fn hybrid_search(
        &self,
        namespace: &str,
        query_text: &str,
        query_embedding: &[f32],
        top_k: usize,
        vector_weight: f32,
        bm25_weight: f32,
    ) -> CoreResult<Vec<HybridHit>> {
        let body = json!({
            "rank_by": ["Sum", [
                ["vector", "ANN", query_embedding, vector_weight],
                ["content", "BM25", query_text, bm25_weight],
            ]],
            "top_k": top_k,
            "include_attributes": true,
        });

        let response = self
            .client
            .post(self.namespace_url(namespace, "/query"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| CoreError::VectorStoreFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(CoreError::VectorStoreFailed(format!("{status}: {text}")));
        }

        let parsed: TurbopufferQueryResponse =
            response.json().map_err(|e| CoreError::VectorStoreFailed(e.to_string()))?;

        Ok(parsed
            .rows
            .into_iter()
            .filter_map(|row| row.into_hit())
            .collect())
    }

    fn delete_namespace(&self, namespace: &str) -> CoreResult<()> {
        let response = self
            .client
            .delete(self.namespace_url(namespace, ""))
            .bearer_auth(&self.api_key)
            .send()
            .map_err(|e| CoreError::VectorStoreFailed(e.to_string()))?;
        if !response.status().is_success() && response.status().as_u16() != 404 {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(CoreError::VectorStoreFailed(format!("{status}: {text}")));
        }
        Ok(())
    }

    fn namespace_exists(&self, namespace: &str) -> CoreResult<bool> {
        let response = self
            .client
            .get(self.namespace_url(namespace, "/metadata"))
            .bearer_auth(&self.api_key)
            .send()
            .map_err(|e| CoreError::VectorStoreFailed(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

#[derive(Deserialize)]
struct TurbopufferQueryResponse {
    rows: Vec<TurbopufferRow>,
}

#[derive(Deserialize)]
struct TurbopufferRow {
    id: String,
    #[serde(rename = "$dist")]
    score: Option<f32>,
    attributes: Option<TurbopufferAttributes>,
}

#[derive(Deserialize)]
struct TurbopufferAttributes {
    content: String,
    #[serde(rename = "filePath")]
    file_path: String,
    #[serde(rename = "relativePath")]
    relative_path: String,
    #[serde(rename = "startLine")]
    start_line: usize,
    #[serde(rename = "endLine")]
    end_line: usize,
    language: String,
    #[serde(default)]
    symbols: String,
    #[serde(default)]
    exports: String,
}

impl TurbopufferRow {
    fn into_hit(self) -> Option<HybridHit> {
        let attrs = self.attributes?;
        // Symbols/exports only round-trip as comma-joined names (§6.2's wire
        // contract carries no structured symbol data). Kind/line are best-effort
        // reconstructions; search.rs re-parses the file on disk for the
        // authoritative version when it's still readable.
        let symbols = attrs
            .symbols
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| Symbol {
                name: name.to_string(),
                kind: SymbolType::Function,
                start_line: attrs.start_line,
                end_line: attrs.end_line,
                scope: None,
            })
            .collect();
        let exports =
            attrs.exports.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        Some(HybridHit {
            chunk: Chunk {
                id: self.id,
                content: attrs.content,
                file_path: attrs.file_path,
                relative_path: attrs.relative_path,
                start_line: attrs.start_line,
                end_line: attrs.end_line,
                language: attrs.language,
                symbols,
                imports: Vec::new(),
                exports,
            },
            score: self.score.unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeStore;
    impl VectorStore for FakeStore {
        fn upsert(&self, _namespace: &str, _records: &[VectorRecord]) -> CoreResult<()> {
            Ok(())
        }
        fn delete(&self, _namespace: &str, _chunk_ids: &[String]) -> CoreResult<()> {
            Ok(())
        }
        fn hybrid_search(
            &self,
            _namespace: &str,
            _query_text: &str,
            _query_embedding: &[f32],
            _top_k: usize,
            _vector_weight: f32,
            _bm25_weight: f32,
        ) -> CoreResult<Vec<HybridHit>> {
            Ok(Vec::new())
        }
        fn delete_namespace(&self, _namespace: &str) -> CoreResult<()> {
            Ok(())
        }
        fn namespace_exists(&self, _namespace: &str) -> CoreResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn fake_store_satisfies_the_trait() {
        let store = FakeStore;
        assert!(!store.namespace_exists("ns").unwrap());
    }

    #[test]
    fn row_reconstructs_symbol_and_export_names_from_csv_attributes() {
        let row = TurbopufferRow {
            id: "chunk_1".into(),
            score: Some(0.5),
            attributes: Some(TurbopufferAttributes {
                content: "pub struct Logger {}".into(),
                file_path: "/repo/src/logger.rs".into(),
                relative_path: "src/logger.rs".into(),
                start_line: 1,
                end_line: 1,
                language: "rust".into(),
                symbols: "Logger, Logger.new".into(),
                exports: "Logger".into(),
            }),
        };
        let hit = row.into_hit().unwrap();
        assert_eq!(hit.chunk.symbols.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["Logger", "Logger.new"]);
        assert_eq!(hit.chunk.exports, vec!["Logger".to_string()]);
    }
}
