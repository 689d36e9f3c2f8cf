//! Translation-memory retrieval client
//!
//! "No results" is an empty list, never an error; connectivity failures are
//! caught by the calling stage and treated as "no memory available".

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One (source, target) pair from the translation memory index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPair {
    pub source: String,
    pub target: String,
}

/// Pluggable translation-memory lookup.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &'static str;

    /// Top-k ranked pairs for a term or phrase.
    async fn search(&self, term: &str, top_k: usize) -> Result<Vec<MemoryPair>>;
}

/// Render pairs the way translation prompts expect them.
pub fn format_pairs(pairs: &[MemoryPair]) -> String {
    if pairs.is_empty() {
        return "No relevant translation memory found.".to_string();
    }
    pairs
        .iter()
        .map(|p| format!("- {} -> {}", p.source, p.target))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    source: String,
    target: String,
    #[serde(default)]
    score: f64,
}

/// HTTP client for a translation-memory search service.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRetriever {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    fn name(&self) -> &'static str {
        "http_memory"
    }

    async fn search(&self, term: &str, top_k: usize) -> Result<Vec<MemoryPair>> {
        let url = format!(
            "{}/search?q={}&top_k={}",
            self.base_url,
            urlencoding::encode(term),
            top_k
        );
        debug!("searching translation memory: {url}");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("memory service error {status}: {body}");
        }

        let mut parsed: SearchResponse = response.json().await?;
        debug!("{} memory hits for '{term}'", parsed.hits.len());

        // Keep the service's ranking even if it streams hits unordered.
        parsed
            .hits
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        Ok(parsed
            .hits
            .into_iter()
            .map(|h| MemoryPair {
                source: h.source,
                target: h.target,
            })
            .collect())
    }
}

/// In-memory retriever for tests and offline runs: returns the seeded pairs
/// whose source contains the queried term.
pub struct StaticRetriever {
    pairs: Vec<MemoryPair>,
}

impl StaticRetriever {
    pub fn new(pairs: Vec<MemoryPair>) -> Self {
        Self { pairs }
    }

    pub fn empty() -> Self {
        Self { pairs: Vec::new() }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn search(&self, term: &str, top_k: usize) -> Result<Vec<MemoryPair>> {
        let needle = term.to_lowercase();
        Ok(self
            .pairs
            .iter()
            .filter(|p| p.source.to_lowercase().contains(&needle))
            .take(top_k)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_retriever_matches_substrings() {
        let retriever = StaticRetriever::new(vec![
            MemoryPair {
                source: "neural network".to_string(),
                target: "reseau de neurones".to_string(),
            },
            MemoryPair {
                source: "gradient descent".to_string(),
                target: "descente de gradient".to_string(),
            },
        ]);

        let hits = retriever.search("Neural", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target, "reseau de neurones");

        let none = retriever.search("transformer", 5).await.unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn formats_empty_and_filled_memory() {
        assert_eq!(format_pairs(&[]), "No relevant translation memory found.");
        let lines = format_pairs(&[MemoryPair {
            source: "a".to_string(),
            target: "b".to_string(),
        }]);
        assert_eq!(lines, "- a -> b");
    }
}
