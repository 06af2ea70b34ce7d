//! codex-context-mcp binary — thin CLI shell over the [`codex_context_mcp`] library crate.
//!
//! `serve` runs the stdio MCP server; the remaining subcommands drive the
//! same indexing/search pipeline directly, without going through JSON-RPC,
//! for scripting and local debugging.

use clap::{Parser, Subcommand};
use codex_context_core::config::IndexConfig;
use codex_context_core::incremental::run_incremental_sync;
use codex_context_core::metadata::FileMetadataStore;
use codex_context_core::orchestrator::run_full_index;
use codex_context_core::search::{search, SearchOptions};
use codex_context_mcp::mcp::run_mcp;
use codex_context_mcp::AppContext;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Hybrid dense-vector + BM25 codebase indexing and search, exposed as an MCP server.
#[derive(Parser)]
#[command(name = "codex-context", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as an MCP stdio server (for Claude Code and other MCP clients)
    Serve,
    /// Index (or incrementally re-sync) a codebase
    Index {
        /// Codebase root (absolute path)
        path: PathBuf,
        /// Force a full reindex even if the codebase was already indexed
        #[arg(long)]
        force: bool,
    },
    /// Search an already-indexed codebase
    Search {
        /// Search query
        query: String,
        /// Codebase root to search (absolute path)
        #[arg(long)]
        path: PathBuf,
        /// Max results to return
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        /// Re-score candidates with a cross-encoder reranker, when configured
        #[arg(long)]
        rerank: bool,
    },
    /// Report whether a codebase is indexed
    Status {
        /// Codebase root (absolute path)
        path: PathBuf,
    },
    /// Remove a codebase's index entirely
    Clear {
        /// Codebase root (absolute path)
        path: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codex_context=info".parse().unwrap()),
        )
        .with_target(false)
        .init();
}

fn build_context() -> Option<AppContext> {
    match AppContext::from_env() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            error!(error = %e, "Failed to initialize embedder/vector store from environment");
            None
        }
    }
}

fn resolve_path(path: &std::path::Path) -> Option<PathBuf> {
    match path.canonicalize() {
        Ok(p) => Some(p),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Path not found");
            None
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let Some(ctx) = build_context() else { return ExitCode::FAILURE };
            info!("codex-context MCP server starting on stdio");
            run_mcp(ctx);
            ExitCode::SUCCESS
        }
        Commands::Index { path, force } => {
            let Some(ctx) = build_context() else { return ExitCode::FAILURE };
            let Some(root) = resolve_path(&path) else { return ExitCode::FAILURE };

            let config = IndexConfig::load(&root);

            let namespace = match ctx.registry.namespace_for(&root) {
                Ok(ns) => ns,
                Err(e) => {
                    error!(error = %e, "Could not resolve namespace");
                    return ExitCode::FAILURE;
                }
            };

            let already_indexed = !force
                && ctx.store.namespace_exists(&namespace).unwrap_or(false)
                && !FileMetadataStore::for_namespace(&namespace).all().is_empty();

            let lock_service = ctx.lock_service(&config);
            let lock_op = if already_indexed { "incremental" } else { "full" };
            let guard = match lock_service.acquire(lock_op, &root) {
                Ok(g) => g,
                Err(e) => {
                    error!(error = %e, "Could not acquire index lock");
                    return ExitCode::FAILURE;
                }
            };

            let outcome = if already_indexed {
                run_incremental_sync(&root, &namespace, &config, ctx.embedder.as_ref(), ctx.store.as_ref(), None)
                    .map(|r| serde_json::to_string_pretty(&r).unwrap_or_default())
            } else {
                run_full_index(&root, &namespace, &config, ctx.embedder.as_ref(), ctx.store.as_ref())
                    .map(|r| serde_json::to_string_pretty(&r).unwrap_or_default())
            };
            drop(guard);

            match outcome {
                Ok(report) => {
                    println!("{report}");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %e, "Indexing failed");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Search { query, path, top_k, rerank } => {
            let Some(ctx) = build_context() else { return ExitCode::FAILURE };
            let Some(root) = resolve_path(&path) else { return ExitCode::FAILURE };

            let Some(namespace) = ctx.registry.lookup(&root) else {
                error!(path = %root.display(), "Codebase not indexed — run `index` first");
                return ExitCode::FAILURE;
            };

            let config = IndexConfig::load(&root);
            let options = SearchOptions::from_config(&config, top_k, rerank && ctx.reranker.is_some());

            match search(
                &root,
                &namespace,
                &query,
                &options,
                &config,
                ctx.embedder.as_ref(),
                ctx.store.as_ref(),
                ctx.reranker.as_deref(),
            ) {
                Ok(hits) => {
                    println!("{}", serde_json::to_string_pretty(&hits).unwrap_or_default());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(error = %e, "Search failed");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Status { path } => {
            let Some(root) = resolve_path(&path) else { return ExitCode::FAILURE };
            let ctx = match build_context() {
                Some(ctx) => ctx,
                None => return ExitCode::FAILURE,
            };

            let Some(namespace) = ctx.registry.lookup(&root) else {
                println!("{}", serde_json::json!({ "indexed": false, "path": root }));
                return ExitCode::SUCCESS;
            };

            let metadata_store = FileMetadataStore::for_namespace(&namespace);
            let files = metadata_store.all();
            let chunk_count: usize = files.values().map(|e| e.chunk_ids.len()).sum();
            println!(
                "{}",
                serde_json::json!({
                    "indexed": true,
                    "path": root,
                    "namespace": namespace,
                    "fileCount": files.len(),
                    "chunkCount": chunk_count,
                })
            );
            ExitCode::SUCCESS
        }
        Commands::Clear { path } => {
            let Some(root) = resolve_path(&path) else { return ExitCode::FAILURE };
            let ctx = match build_context() {
                Some(ctx) => ctx,
                None => return ExitCode::FAILURE,
            };

            let Some(namespace) = ctx.registry.lookup(&root) else {
                info!(path = %root.display(), "Nothing to clear — codebase was never indexed");
                return ExitCode::SUCCESS;
            };

            if let Err(e) = ctx.store.delete_namespace(&namespace) {
                error!(error = %e, "Failed to delete vector store namespace");
                return ExitCode::FAILURE;
            }
            if let Err(e) = FileMetadataStore::for_namespace(&namespace).clear() {
                error!(error = %e, "Failed to clear file metadata");
                return ExitCode::FAILURE;
            }
            if let Err(e) = ctx.registry.remove(&root) {
                error!(error = %e, "Failed to remove registry entry");
                return ExitCode::FAILURE;
            }

            info!(path = %root.display(), namespace = %namespace, "Index cleared");
            ExitCode::SUCCESS
        }
    }
}
