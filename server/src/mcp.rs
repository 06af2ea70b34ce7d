//! MCP JSON-RPC server implementing the Model Context Protocol over stdio.
//!
//! Exposes exactly four tools — `index_codebase`, `search_codebase`,
//! `get_indexing_status`, `clear_index` — matching the tool protocol table.
//! Version negotiation, tool dispatch, and the stdio read loop follow the
//! same shape as the pack's JSON-RPC dispatch: parse a line, route by
//! `method`, never block on a malformed message.

use crate::app::AppContext;
use crate::worker;
use codex_context_core::config::IndexConfig;
use codex_context_core::error::CoreError;
use codex_context_core::metadata::FileMetadataStore;
use codex_context_core::search::{search, SearchOptions};
use std::io::{self, BufRead, Write};

const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18"];
const LATEST_VERSION: &str = "2025-06-18";

fn negotiate_version(client_version: &str) -> &'static str {
    SUPPORTED_VERSIONS.iter().find(|&&v| v == client_version).copied().unwrap_or(LATEST_VERSION)
}

fn tool_definitions() -> serde_json::Value {
    let ro = serde_json::json!({
        "readOnlyHint": true,
        "destructiveHint": false,
        "idempotentHint": true,
        "openWorldHint": true
    });
    let mutating = serde_json::json!({
        "readOnlyHint": false,
        "destructiveHint": false,
        "idempotentHint": true,
        "openWorldHint": true
    });
    let destructive = serde_json::json!({
        "readOnlyHint": false,
        "destructiveHint": true,
        "idempotentHint": true,
        "openWorldHint": false
    });

    serde_json::json!([
        {
            "name": "index_codebase",
            "annotations": mutating,
            "description": "Index (or incrementally re-sync) a codebase for hybrid search. On first call for a path, runs a full index; on subsequent calls, only changed files are re-embedded.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Absolute path to the codebase root" },
                    "force": { "type": "boolean", "description": "Force a full reindex even if the codebase was already indexed. Default: false" }
                },
                "required": ["path"]
            }
        },
        {
            "name": "search_codebase",
            "annotations": ro,
            "description": "Hybrid dense-vector + BM25 search over an indexed codebase. Returns ranked chunks with their symbols, imports, and file location.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Absolute path to the indexed codebase root" },
                    "query": { "type": "string", "description": "Natural-language or keyword search query" },
                    "topK": { "type": "integer", "description": "Max results to return. Default: 10" },
                    "rerank": { "type": "boolean", "description": "Re-score candidates with a cross-encoder reranker when configured. Default: false" }
                },
                "required": ["path", "query"]
            }
        },
        {
            "name": "get_indexing_status",
            "annotations": ro,
            "description": "Report whether a codebase is indexed and, if so, how many files and chunks it contains.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Absolute path to the codebase root" }
                },
                "required": ["path"]
            }
        },
        {
            "name": "clear_index",
            "annotations": destructive,
            "description": "Remove a codebase's index entirely — vector store namespace, file metadata, and namespace registry entry.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Absolute path to the codebase root" }
                },
                "required": ["path"]
            }
        }
    ])
}

fn handle_index_codebase(ctx: &AppContext, args: &serde_json::Value) -> (String, bool) {
    let Some(path_str) = args.get("path").and_then(|v| v.as_str()) else {
        return ("Missing required parameter 'path'".to_string(), true);
    };
    let root = match AppContext::validate_path(path_str) {
        Ok(p) => p,
        Err(e) => return (e.to_string(), true),
    };
    let force = args.get("force").and_then(|v| v.as_bool()).unwrap_or(false);

    let config = IndexConfig::load(&root);

    let namespace = match ctx.registry.namespace_for(&root) {
        Ok(ns) => ns,
        Err(e) => return (e.to_string(), true),
    };

    let already_indexed = !force
        && ctx.store.namespace_exists(&namespace).unwrap_or(false)
        && !FileMetadataStore::for_namespace(&namespace).all().is_empty();

    let lock_service = ctx.lock_service(&config);
    let lock_op = if already_indexed { "incremental" } else { "full" };
    let guard = match lock_service.acquire(lock_op, &root) {
        Ok(g) => g,
        Err(e) => return (e.to_string(), true),
    };

    // Indexing a large codebase can run well past an MCP client's request
    // timeout (§6.1): hand the run to a detached worker and return
    // immediately. The lock is held by the worker thread, not released here.
    let log_path = worker::spawn_index_worker(
        root,
        namespace.clone(),
        config,
        ctx.embedder.clone(),
        ctx.store.clone(),
        already_indexed,
        guard,
    );

    let response = serde_json::json!({
        "started": true,
        "namespace": namespace,
        "mode": if already_indexed { "incremental" } else { "full" },
        "logPath": log_path,
    });
    (serde_json::to_string_pretty(&response).unwrap_or_default(), false)
}

fn handle_search_codebase(ctx: &AppContext, args: &serde_json::Value) -> (String, bool) {
    let Some(path_str) = args.get("path").and_then(|v| v.as_str()) else {
        return ("Missing required parameter 'path'".to_string(), true);
    };
    let Some(query) = args.get("query").and_then(|v| v.as_str()) else {
        return ("Missing required parameter 'query'".to_string(), true);
    };
    let root = match AppContext::validate_path(path_str) {
        Ok(p) => p,
        Err(e) => return (e.to_string(), true),
    };

    let Some(namespace) = ctx.registry.lookup(&root) else {
        return (CoreError::NotIndexed(root).to_string(), true);
    };

    let config = IndexConfig::load(&root);
    let top_k = args.get("topK").and_then(|v| v.as_u64()).unwrap_or(10) as usize;
    let rerank = args.get("rerank").and_then(|v| v.as_bool()).unwrap_or(false);
    let options = SearchOptions::from_config(&config, top_k, rerank && ctx.reranker.is_some());

    let result = search(
        &root,
        &namespace,
        query,
        &options,
        &config,
        ctx.embedder.as_ref(),
        ctx.store.as_ref(),
        ctx.reranker.as_deref(),
    );

    match result {
        Ok(hits) => (serde_json::to_string_pretty(&hits).unwrap_or_default(), false),
        Err(e) => (e.to_string(), true),
    }
}

fn handle_get_indexing_status(ctx: &AppContext, args: &serde_json::Value) -> (String, bool) {
    let Some(path_str) = args.get("path").and_then(|v| v.as_str()) else {
        return ("Missing required parameter 'path'".to_string(), true);
    };
    let root = match AppContext::validate_path(path_str) {
        Ok(p) => p,
        Err(e) => return (e.to_string(), true),
    };

    let Some(namespace) = ctx.registry.lookup(&root) else {
        let status = serde_json::json!({ "indexed": false, "path": path_str });
        return (serde_json::to_string_pretty(&status).unwrap_or_default(), false);
    };

    let metadata_store = FileMetadataStore::for_namespace(&namespace);
    let files = metadata_store.all();
    let file_count = files.len();
    let chunk_count: usize = files.values().map(|e| e.chunk_ids.len()).sum();
    let exists_remotely = ctx.store.namespace_exists(&namespace).unwrap_or(false);
    let worker_status = worker::tail_summary(&namespace);

    let mut status = serde_json::json!({
        "indexed": file_count > 0 || exists_remotely,
        "path": path_str,
        "namespace": namespace,
        "fileCount": file_count,
        "chunkCount": chunk_count,
    });
    if let serde_json::Value::Object(ref mut map) = status {
        if let serde_json::Value::Object(worker_map) = worker_status {
            map.extend(worker_map);
        }
    }
    (serde_json::to_string_pretty(&status).unwrap_or_default(), false)
}

fn handle_clear_index(ctx: &AppContext, args: &serde_json::Value) -> (String, bool) {
    let Some(path_str) = args.get("path").and_then(|v| v.as_str()) else {
        return ("Missing required parameter 'path'".to_string(), true);
    };
    let root = match AppContext::validate_path(path_str) {
        Ok(p) => p,
        Err(e) => return (e.to_string(), true),
    };

    let Some(namespace) = ctx.registry.lookup(&root) else {
        return (serde_json::json!({ "cleared": false, "path": path_str }).to_string(), false);
    };

    if let Err(e) = ctx.store.delete_namespace(&namespace) {
        return (e.to_string(), true);
    }
    if let Err(e) = FileMetadataStore::for_namespace(&namespace).clear() {
        return (e.to_string(), true);
    }
    if let Err(e) = ctx.registry.remove(&root) {
        return (e.to_string(), true);
    }

    (serde_json::json!({ "cleared": true, "path": path_str, "namespace": namespace }).to_string(), false)
}

fn handle_tool_call(ctx: &AppContext, tool_name: &str, args: &serde_json::Value) -> (String, bool) {
    match tool_name {
        "index_codebase" => handle_index_codebase(ctx, args),
        "search_codebase" => handle_search_codebase(ctx, args),
        "get_indexing_status" => handle_get_indexing_status(ctx, args),
        "clear_index" => handle_clear_index(ctx, args),
        _ => (format!("Unknown tool '{tool_name}'"), true),
    }
}

/// Process one JSON-RPC request, returning `None` for notifications.
pub fn dispatch_jsonrpc(ctx: &AppContext, msg: &serde_json::Value) -> Option<serde_json::Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = msg.get("id").cloned();

    if id.is_none() || method.starts_with("notifications/") {
        return None;
    }

    let response = match method {
        "initialize" => {
            let client_version = msg["params"]["protocolVersion"].as_str().unwrap_or("");
            let negotiated = negotiate_version(client_version);
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": negotiated,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": "codex-context", "version": env!("CARGO_PKG_VERSION") },
                    "instructions": "Index a codebase with index_codebase, then search it with search_codebase. Use get_indexing_status to check progress and clear_index to drop an index."
                }
            })
        }
        "tools/list" => {
            serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": { "tools": tool_definitions() } })
        }
        "tools/call" => {
            let tool_name = msg["params"]["name"].as_str().unwrap_or("");
            let arguments = msg["params"].get("arguments").cloned().unwrap_or(serde_json::json!({}));
            let (text, is_error) = handle_tool_call(ctx, tool_name, &arguments);

            // isError is deliberately always false: a true value here has been
            // observed to cascade-cancel sibling tool calls in some MCP clients.
            // Failures are still legible to the model via the warning prefix.
            let content_text = if is_error { format!("\u{26a0} Error: {text}") } else { text };
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "content": [{ "type": "text", "text": content_text }], "isError": false }
            })
        }
        "ping" => serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
        _ => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "Method not found" }
        }),
    };

    Some(response)
}

/// Run the MCP stdio server loop: read JSON-RPC requests from stdin, write
/// responses to stdout, one line each.
pub fn run_mcp(ctx: AppContext) {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = stdin.lock();
    let mut initialized = false;

    tracing::info!("MCP server ready");

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let msg: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => {
                let err = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": "Parse error" }
                });
                let mut out = stdout.lock();
                let _ = writeln!(out, "{err}");
                let _ = out.flush();
                continue;
            }
        };

        let method = msg["method"].as_str().unwrap_or("");
        if method == "notifications/initialized" || method == "notifications/cancelled" {
            continue;
        }

        if !initialized && method != "initialize" && method != "ping" {
            if let Some(id) = msg.get("id").cloned() {
                let err = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32002, "message": "Server not initialized. Send 'initialize' first." }
                });
                let mut out = stdout.lock();
                let _ = writeln!(out, "{}", serde_json::to_string(&err).unwrap_or_default());
                let _ = out.flush();
            }
            continue;
        }

        if let Some(response) = dispatch_jsonrpc(&ctx, &msg) {
            if method == "initialize" {
                initialized = true;
            }
            let mut out = stdout.lock();
            let _ = writeln!(out, "{}", serde_json::to_string(&response).unwrap_or_default());
            let _ = out.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codex_context_core::embedder::Embedder;
    use codex_context_core::error::CoreResult;
    use codex_context_core::registry::NamespaceRegistry;
    use codex_context_core::vectorstore::{HybridHit, VectorRecord, VectorStore};

    struct FakeEmbedder;
    impl Embedder for FakeEmbedder {
        fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1]).collect())
        }
        fn max_input_chars(&self) -> usize {
            8000
        }
    }

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

    fn test_ctx(data_dir: &std::path::Path) -> AppContext {
        std::env::set_var("CODEX_CONTEXT_DATA_DIR", data_dir);
        AppContext {
            embedder: std::sync::Arc::new(FakeEmbedder),
            store: std::sync::Arc::new(FakeStore),
            reranker: None,
            registry: NamespaceRegistry::new(),
        }
    }

    #[test]
    fn unknown_client_version_falls_back_to_latest() {
        assert_eq!(negotiate_version("1999-01-01"), LATEST_VERSION);
        assert_eq!(negotiate_version(LATEST_VERSION), LATEST_VERSION);
    }

    #[test]
    fn tool_list_exposes_exactly_four_tools() {
        let tools = tool_definitions();
        let names: Vec<&str> =
            tools.as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(
            names,
            vec!["index_codebase", "search_codebase", "get_indexing_status", "clear_index"]
        );
    }

    #[test]
    fn search_before_index_reports_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let args = serde_json::json!({ "path": "/nonexistent/codebase/root/xyz", "query": "foo" });
        let (text, is_error) = handle_search_codebase(&ctx, &args);
        assert!(is_error);
        assert!(text.contains("not accessible") || text.contains("not indexed"));
    }

    #[test]
    fn tools_call_response_never_sets_is_error_true() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "search_codebase", "arguments": { "path": "/nope", "query": "x" } }
        });
        let response = dispatch_jsonrpc(&ctx, &msg).unwrap();
        assert_eq!(response["result"]["isError"], false);
        assert!(response["result"]["content"][0]["text"].as_str().unwrap().contains("Error"));
    }

    #[test]
    fn notification_messages_produce_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let msg = serde_json::json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        assert!(dispatch_jsonrpc(&ctx, &msg).is_none());
    }

    #[test]
    fn full_index_and_status_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let codebase = tempfile::tempdir().unwrap();
        std::fs::write(codebase.path().join("a.rs"), "pub fn a() {}\n").unwrap();
        let path_str = codebase.path().to_string_lossy().to_string();

        let (index_text, index_is_error) =
            handle_index_codebase(&ctx, &serde_json::json!({ "path": path_str }));
        assert!(!index_is_error, "index failed: {index_text}");
        let started: serde_json::Value = serde_json::from_str(&index_text).unwrap();
        assert_eq!(started["started"], true);
        assert_eq!(started["mode"], "full");

        // Indexing runs on a detached worker thread; poll the status until it
        // reports a completed run instead of asserting on it immediately.
        let mut file_count = None;
        for _ in 0..100 {
            let (status_text, status_is_error) =
                handle_get_indexing_status(&ctx, &serde_json::json!({ "path": path_str }));
            assert!(!status_is_error);
            let status: serde_json::Value = serde_json::from_str(&status_text).unwrap();
            if status.get("running") == Some(&serde_json::Value::Bool(false))
                && status.get("lastResult").is_some()
            {
                file_count = Some(status["fileCount"].as_u64().unwrap());
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert_eq!(file_count, Some(1), "background index never completed");

        let (clear_text, clear_is_error) =
            handle_clear_index(&ctx, &serde_json::json!({ "path": path_str }));
        assert!(!clear_is_error, "clear failed: {clear_text}");
    }
}
