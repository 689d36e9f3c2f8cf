//! Linguagraph HTTP server binary
//!
//! Configuration comes from the environment:
//! - `LINGUAGRAPH_MODEL_URL`    OpenAI-compatible endpoint (default Ollama)
//! - `LINGUAGRAPH_API_KEY`      bearer token for the endpoint
//! - `LINGUAGRAPH_MODEL`       model name
//! - `LINGUAGRAPH_MEMORY_URL`   translation-memory search service (optional)
//! - `LINGUAGRAPH_OUTPUT_DIR`   output root (default ./output)
//! - `LINGUAGRAPH_RATE_LIMIT`   max model calls per minute (default 20)
//! - `LINGUAGRAPH_PORT`         listen port (default 8082)

use linguagraph::{
    GraphConfig, Generator, HttpGenerator, HttpRetriever, MemoryPair, MockGenerator, RateLimiter,
    Retriever, Stage, StaticRetriever, TranslationGraph,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    println!("Linguagraph translation workflow server");
    println!("  version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let use_mock = std::env::args().any(|arg| arg == "--mock");

    let generator: Arc<dyn Generator> = if use_mock {
        println!("✓ Mode: MOCK generator (use without --mock for a real endpoint)");
        Arc::new(MockGenerator::new())
    } else {
        let model_url = std::env::var("LINGUAGRAPH_MODEL_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:11434/v1".to_string());
        let api_key = std::env::var("LINGUAGRAPH_API_KEY").unwrap_or_default();
        let model =
            std::env::var("LINGUAGRAPH_MODEL").unwrap_or_else(|_| "qwen2.5:7b".to_string());

        println!("✓ Model endpoint: {model_url}");
        println!("✓ Model: {model}");

        let generator = HttpGenerator::new(model_url, api_key, model);
        match generator.health_check().await {
            Ok(true) => println!("✓ Model endpoint is healthy"),
            Ok(false) => eprintln!("warning: model endpoint returned a non-success status"),
            Err(e) => eprintln!("warning: could not reach model endpoint: {e}"),
        }
        Arc::new(generator)
    };

    let retriever: Arc<dyn Retriever> = match std::env::var("LINGUAGRAPH_MEMORY_URL") {
        Ok(url) if !use_mock => {
            println!("✓ Translation memory: {url}");
            let retriever = HttpRetriever::new(url);
            match retriever.health_check().await {
                Ok(true) => println!("✓ Memory service is healthy"),
                Ok(false) => eprintln!("warning: memory service returned a non-success status"),
                Err(e) => eprintln!("warning: could not reach memory service: {e}"),
            }
            Arc::new(retriever)
        }
        _ => {
            println!("✓ Translation memory: none (runs degrade to no-memory lookups)");
            if use_mock {
                Arc::new(StaticRetriever::new(vec![MemoryPair {
                    source: "neural network".to_string(),
                    target: "neural network (mock rendering)".to_string(),
                }]))
            } else {
                Arc::new(StaticRetriever::empty())
            }
        }
    };

    let output_root = std::env::var("LINGUAGRAPH_OUTPUT_DIR")
        .unwrap_or_else(|_| "./output".to_string());
    let rate_limit: usize = std::env::var("LINGUAGRAPH_RATE_LIMIT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);
    let port: u16 = std::env::var("LINGUAGRAPH_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8082);

    println!("✓ Output root: {output_root}");
    println!("✓ Rate limit: {rate_limit} calls/minute");

    let config = GraphConfig {
        output_root: output_root.into(),
        // Suspend for glossary review when a request enables human review.
        pause_after: Some(Stage::SearchAndConsolidate),
        ..GraphConfig::default()
    };

    let graph = Arc::new(TranslationGraph::new(
        generator,
        retriever,
        Arc::new(RateLimiter::new(rate_limit)),
        config,
    ));

    println!("✓ Workflow graph initialized");
    println!();

    linguagraph::server::run_server(graph, port).await
}
