//! Cross-chunk translation memory persisted per book
//!
//! One JSON map per book at `{root}/{book_id}/translation_memory.json`,
//! keyed `{book}_ch{chapter}_ck{chunk}`. Read paths tolerate a missing or
//! corrupt file and degrade to an empty memory.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Minimum lexical overlap for a record to count as a similar example.
const MIN_SIMILARITY: f64 = 0.1;

/// One remembered (source, translation) pair with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub book_id: String,
    pub chapter_id: u32,
    pub chunk_id: u32,
    pub source_text: String,
    pub translation: String,
    pub quality_score: Option<i64>,
    pub saved_at: DateTime<Utc>,
}

/// File-backed store of translated chunks, used to feed context and similar
/// examples into later chunks and chapters.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    root: PathBuf,
}

impl MemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn memory_path(&self, book_id: &str) -> PathBuf {
        self.root.join(book_id).join("translation_memory.json")
    }

    fn load_all(&self, book_id: &str) -> BTreeMap<String, MemoryRecord> {
        let path = self.memory_path(book_id);
        if !path.exists() {
            return BTreeMap::new();
        }
        match fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_json::from_str(&text).map_err(anyhow::Error::from))
        {
            Ok(map) => map,
            Err(e) => {
                warn!("failed to load translation memory {}: {e}", path.display());
                BTreeMap::new()
            }
        }
    }

    fn write_all(&self, book_id: &str, memory: &BTreeMap<String, MemoryRecord>) -> Result<()> {
        let path = self.memory_path(book_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating memory dir {}", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(memory)?;
        fs::write(&path, text)
            .with_context(|| format!("writing translation memory {}", path.display()))
    }

    /// Upsert one chunk's translation into the book memory.
    pub fn save_chunk_memory(
        &self,
        book_id: &str,
        chapter_id: u32,
        chunk_id: u32,
        source_text: &str,
        translation: &str,
        quality_score: Option<i64>,
    ) -> Result<()> {
        let mut memory = self.load_all(book_id);
        let key = format!("{book_id}_ch{chapter_id}_ck{chunk_id}");
        memory.insert(
            key,
            MemoryRecord {
                book_id: book_id.to_string(),
                chapter_id,
                chunk_id,
                source_text: source_text.to_string(),
                translation: translation.to_string(),
                quality_score,
                saved_at: Utc::now(),
            },
        );
        self.write_all(book_id, &memory)
    }

    /// All remembered chunks of one chapter, in chunk order.
    pub fn chapter_memory(&self, book_id: &str, chapter_id: u32) -> Vec<MemoryRecord> {
        let mut records: Vec<MemoryRecord> = self
            .load_all(book_id)
            .into_values()
            .filter(|r| r.chapter_id == chapter_id)
            .collect();
        records.sort_by_key(|r| r.chunk_id);
        records
    }

    /// Most recent records from chapters before `before_chapter_id`, newest
    /// first, at most `top_k`.
    pub fn prior_chapters_memory(
        &self,
        book_id: &str,
        before_chapter_id: u32,
        top_k: usize,
    ) -> Vec<MemoryRecord> {
        let mut records: Vec<MemoryRecord> = self
            .load_all(book_id)
            .into_values()
            .filter(|r| r.chapter_id < before_chapter_id)
            .collect();
        records.sort_by_key(|r| std::cmp::Reverse((r.chapter_id, r.chunk_id)));
        records.truncate(top_k);
        records
    }

    /// Remembered chunks most lexically similar to `source_text`, at most
    /// `top_k`, using Jaccard overlap of whitespace-tokenized lowercase words.
    pub fn similar_examples(
        &self,
        source_text: &str,
        book_id: &str,
        top_k: usize,
    ) -> Vec<MemoryRecord> {
        let mut scored: Vec<(f64, MemoryRecord)> = self
            .load_all(book_id)
            .into_values()
            .filter_map(|r| {
                let similarity = jaccard(source_text, &r.source_text);
                (similarity > MIN_SIMILARITY).then_some((similarity, r))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(top_k).map(|(_, r)| r).collect()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn jaccard(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<String> =
        a.to_lowercase().split_whitespace().map(String::from).collect();
    let set_b: std::collections::HashSet<String> =
        b.to_lowercase().split_whitespace().map(String::from).collect();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn upsert_and_chapter_ordering() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new(dir.path());

        store
            .save_chunk_memory("bk", 1, 2, "second chunk", "t2", Some(8))
            .unwrap();
        store
            .save_chunk_memory("bk", 1, 0, "first chunk", "t0", Some(9))
            .unwrap();
        store
            .save_chunk_memory("bk", 0, 5, "earlier chapter", "t5", None)
            .unwrap();

        let chapter = store.chapter_memory("bk", 1);
        assert_eq!(chapter.len(), 2);
        assert_eq!(chapter[0].chunk_id, 0);
        assert_eq!(chapter[1].chunk_id, 2);

        let prior = store.prior_chapters_memory("bk", 1, 10);
        assert_eq!(prior.len(), 1);
        assert_eq!(prior[0].chapter_id, 0);
    }

    #[test]
    fn similar_examples_require_overlap() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new(dir.path());

        store
            .save_chunk_memory("bk", 0, 0, "the quick brown fox jumps", "t0", None)
            .unwrap();
        store
            .save_chunk_memory("bk", 0, 1, "completely unrelated words here", "t1", None)
            .unwrap();

        let similar = store.similar_examples("a quick brown fox runs", "bk", 3);
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].chunk_id, 0);
    }

    #[test]
    fn missing_memory_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::new(dir.path());
        assert!(store.chapter_memory("ghost", 0).is_empty());
    }
}
