//! Reviewed-term store and the chapter-level glossary merge
//!
//! The store is one JSON map at `{root}/reviewed_glossary.json`, keyed by
//! source term, shared across books so a term reviewed once is never asked
//! about again. The merge pushes a reviewed chapter glossary back into every
//! persisted chunk and propagates changed renderings into the stored
//! translation text.

use crate::persistence::{list_chunk_files, load_chunk_record};
use crate::types::TermEntry;
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File-backed map of human-reviewed terms keyed by `src`.
#[derive(Debug, Clone)]
pub struct GlossaryStore {
    path: PathBuf,
}

impl GlossaryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join("reviewed_glossary.json"),
        }
    }

    /// Load the store, tolerating a missing file and both historical layouts
    /// (map keyed by src, or a bare list).
    pub fn load(&self) -> BTreeMap<String, TermEntry> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to read glossary store {}: {e}", self.path.display());
                return BTreeMap::new();
            }
        };
        if let Ok(map) = serde_json::from_str::<BTreeMap<String, TermEntry>>(&text) {
            return map;
        }
        match serde_json::from_str::<Vec<TermEntry>>(&text) {
            Ok(list) => list
                .into_iter()
                .filter(|t| !t.src.is_empty())
                .map(|t| (t.src.clone(), t))
                .collect(),
            Err(e) => {
                warn!("glossary store {} is corrupt: {e}", self.path.display());
                BTreeMap::new()
            }
        }
    }

    /// Upsert reviewed terms, stamping `reviewed_at` where missing. Returns
    /// how many entries were written.
    pub fn save_reviewed(&self, terms: &[TermEntry]) -> Result<usize> {
        if terms.is_empty() {
            return Ok(0);
        }
        let mut store = self.load();
        for term in terms {
            if term.src.is_empty() {
                continue;
            }
            let mut entry = term.clone();
            if entry.reviewed_at.is_none() {
                entry.reviewed_at = Some(Utc::now());
            }
            store.insert(entry.src.clone(), entry);
        }
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(&store)?;
        fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))?;
        info!("saved {} reviewed terms to {}", terms.len(), self.path.display());
        Ok(terms.len())
    }

    /// Split incoming terms into (already reviewed, still unreviewed). The
    /// reviewed half is hydrated from the store so earlier human decisions
    /// carry over; its entries keep the incoming context meaning when the
    /// store has none.
    pub fn filter_reviewed(&self, terms: Vec<TermEntry>) -> (Vec<TermEntry>, Vec<TermEntry>) {
        let store = self.load();
        let mut reviewed = Vec::new();
        let mut unreviewed = Vec::new();
        for term in terms {
            match store.get(&term.src) {
                Some(stored) => {
                    let mut hydrated = stored.clone();
                    hydrated.human_reviewed = true;
                    if hydrated.context_meaning.is_none() {
                        hydrated.context_meaning = term.context_meaning;
                    }
                    reviewed.push(hydrated);
                }
                None => unreviewed.push(term),
            }
        }
        (reviewed, unreviewed)
    }
}

/// Collect a chapter's glossary from its persisted chunk files, de-duplicated
/// by source term (first occurrence wins).
pub fn collect_chapter_glossary(
    root: &Path,
    book_id: &str,
    chapter_id: u32,
) -> Result<Vec<TermEntry>> {
    let mut seen = std::collections::HashSet::new();
    let mut terms = Vec::new();
    for file in list_chunk_files(root, book_id, chapter_id)? {
        let record = load_chunk_record(&file)?;
        for term in record.glossary {
            if !term.src.is_empty() && seen.insert(term.src.clone()) {
                terms.push(term);
            }
        }
    }
    Ok(terms)
}

/// Merge a reviewed glossary back into every persisted chunk of a chapter.
///
/// Each chunk entry whose `src` appears in the reviewed list is replaced by
/// the reviewed version (keeping the chunk's context meaning when the
/// reviewed entry lacks one), and any changed rendering is substituted into
/// the stored translation text, longest previous rendering first so nested
/// terms do not clobber each other. Applying the same reviewed list twice is
/// a no-op the second time.
pub fn apply_reviewed_glossary(
    root: &Path,
    book_id: &str,
    chapter_id: u32,
    reviewed: &[TermEntry],
) -> Result<usize> {
    let reviewed_by_src: BTreeMap<&str, &TermEntry> = reviewed
        .iter()
        .filter(|t| !t.src.is_empty())
        .map(|t| (t.src.as_str(), t))
        .collect();
    if reviewed_by_src.is_empty() {
        return Ok(0);
    }

    let mut updated = 0;
    for file in list_chunk_files(root, book_id, chapter_id)? {
        let mut record = load_chunk_record(&file)?;
        let mut replacements: Vec<(String, String)> = Vec::new();

        for term in record.glossary.iter_mut() {
            let Some(reviewed_term) = reviewed_by_src.get(term.src.as_str()) else {
                continue;
            };
            if reviewed_term.suggested_translation != term.suggested_translation {
                replacements.push((
                    term.suggested_translation.clone(),
                    reviewed_term.suggested_translation.clone(),
                ));
            }
            let chunk_context = term.context_meaning.take();
            *term = (*reviewed_term).clone();
            if term.context_meaning.is_none() {
                term.context_meaning = chunk_context;
            }
        }

        // Longest old rendering first to avoid partial-term collisions.
        replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        for (old, new) in &replacements {
            if !old.is_empty() && old != new {
                record.translation = record.translation.replace(old, new);
            }
        }

        record.human_reviewed = true;
        let text = serde_json::to_string_pretty(&record)?;
        fs::write(&file, text).with_context(|| format!("writing {}", file.display()))?;
        updated += 1;
    }

    info!(
        "reviewed glossary applied to {updated} chunks of {book_id}/chapter_{chapter_id}"
    );
    Ok(updated)
}

/// Locate a term inside the chapter text and return its surrounding
/// sentence with every occurrence highlighted, for display to a reviewer.
pub fn find_term_context(term: &str, source_text: &str, context_window: usize) -> Option<String> {
    let pattern = regex::RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
        .ok()?;
    let found = pattern.find(source_text)?;

    let bytes = source_text.as_bytes();
    let window_start = found.start().saturating_sub(context_window);
    let mut sentence_start = window_start;
    for i in (window_start..found.start()).rev() {
        if matches!(bytes[i], b'.' | b'!' | b'?' | b'\n') {
            sentence_start = i + 1;
            break;
        }
    }
    let window_end = (found.end() + context_window).min(source_text.len());
    let mut sentence_end = window_end;
    for i in found.end()..window_end {
        if matches!(bytes[i], b'.' | b'!' | b'?' | b'\n') {
            sentence_end = i + 1;
            break;
        }
    }

    // Snap to char boundaries in case the window landed mid-codepoint.
    while sentence_start < source_text.len() && !source_text.is_char_boundary(sentence_start) {
        sentence_start += 1;
    }
    while sentence_end > sentence_start && !source_text.is_char_boundary(sentence_end) {
        sentence_end -= 1;
    }

    let sentence = source_text[sentence_start..sentence_end].trim();
    Some(
        pattern
            .replace_all(sentence, |caps: &regex::Captures<'_>| {
                format!("**{}**", &caps[0])
            })
            .into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::write_chunk_record;
    use crate::types::ChunkRecord;
    use tempfile::tempdir;

    fn term(src: &str, translation: &str) -> TermEntry {
        TermEntry {
            src: src.to_string(),
            suggested_translation: translation.to_string(),
            ..TermEntry::fallback(src, "test")
        }
    }

    fn chunk(chunk_id: u32, translation: &str, glossary: Vec<TermEntry>) -> ChunkRecord {
        ChunkRecord {
            chunk_id,
            source_text: "src".to_string(),
            translation: translation.to_string(),
            quality_score: Some(8),
            glossary,
            refinement_history: Vec::new(),
            revision_count: 1,
            human_reviewed: false,
        }
    }

    #[test]
    fn store_roundtrip_and_filtering() {
        let dir = tempdir().unwrap();
        let store = GlossaryStore::new(dir.path());

        store.save_reviewed(&[term("foo", "FOO")]).unwrap();
        let (reviewed, unreviewed) =
            store.filter_reviewed(vec![term("foo", "ignored"), term("bar", "BAR")]);
        assert_eq!(reviewed.len(), 1);
        assert_eq!(reviewed[0].suggested_translation, "FOO");
        assert!(reviewed[0].human_reviewed);
        assert_eq!(unreviewed.len(), 1);
        assert_eq!(unreviewed[0].src, "bar");
    }

    #[test]
    fn chapter_glossary_dedups_first_wins() {
        let dir = tempdir().unwrap();
        write_chunk_record(
            dir.path(),
            "bk",
            0,
            0,
            &chunk(0, "t0", vec![term("alpha", "first")]),
        )
        .unwrap();
        write_chunk_record(
            dir.path(),
            "bk",
            0,
            1,
            &chunk(1, "t1", vec![term("alpha", "second"), term("beta", "b")]),
        )
        .unwrap();

        let terms = collect_chapter_glossary(dir.path(), "bk", 0).unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].suggested_translation, "first");
    }

    #[test]
    fn term_context_highlights_the_containing_sentence() {
        let text = "First sentence here. The neural network converges quickly. Last one.";
        let context = find_term_context("Neural Network", text, 200).unwrap();
        assert_eq!(context, "The **neural network** converges quickly.");

        assert!(find_term_context("absent", text, 200).is_none());
    }

    #[test]
    fn merge_propagates_renderings_and_is_idempotent() {
        let dir = tempdir().unwrap();
        write_chunk_record(
            dir.path(),
            "bk",
            0,
            0,
            &chunk(
                0,
                "uses old rendering and old rendering extended",
                vec![
                    term("a", "old rendering"),
                    term("b", "old rendering extended"),
                ],
            ),
        )
        .unwrap();

        let reviewed = vec![term("a", "new rendering"), term("b", "new rendering extended")];
        apply_reviewed_glossary(dir.path(), "bk", 0, &reviewed).unwrap();

        let path = crate::persistence::chunk_path(dir.path(), "bk", 0, 0);
        let once = load_chunk_record(&path).unwrap();
        // The longer rendering was replaced first, so the shorter one did not
        // partially rewrite it.
        assert_eq!(
            once.translation,
            "uses new rendering and new rendering extended"
        );
        assert!(once.human_reviewed);
        assert_eq!(once.glossary[0].suggested_translation, "new rendering");

        apply_reviewed_glossary(dir.path(), "bk", 0, &reviewed).unwrap();
        let twice = load_chunk_record(&path).unwrap();
        assert_eq!(once, twice);
    }
}
