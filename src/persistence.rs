//! Durable chunk output: the terminal persistence stage plus file helpers
//!
//! One JSON record per chunk at
//! `{root}/{book_id}/chapter_{chapter}/chunk_{chunk:03}.json`. The 3-digit
//! zero-padded chunk id is a committed format detail: chapter-level
//! aggregation enumerates exactly this pattern.

use crate::graph::StageContext;
use crate::types::{ChunkRecord, StateDelta, WorkflowState};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub fn chapter_dir(root: &Path, book_id: &str, chapter_id: u32) -> PathBuf {
    root.join(book_id).join(format!("chapter_{chapter_id}"))
}

pub fn chunk_path(root: &Path, book_id: &str, chapter_id: u32, chunk_id: u32) -> PathBuf {
    chapter_dir(root, book_id, chapter_id).join(format!("chunk_{chunk_id:03}.json"))
}

/// Terminal stage: write the chunk record and upsert the cross-chunk memory.
///
/// An empty or all-whitespace source text is not an error, just a skip: no
/// file is written and no spurious record may overwrite prior output.
pub async fn persist_chunk(state: &WorkflowState, ctx: &StageContext) -> Result<StateDelta> {
    if state.source_text.trim().is_empty() {
        info!(
            "chunk {} has empty source text, skipping persistence",
            state.chunk_id
        );
        return Ok(StateDelta {
            needs_human_review: Some(false),
            ..Default::default()
        });
    }

    let record = ChunkRecord::from_state(state);
    write_chunk_record(
        &ctx.config.output_root,
        &state.book_id,
        state.chapter_id,
        state.chunk_id,
        &record,
    )?;

    ctx.memory.save_chunk_memory(
        &state.book_id,
        state.chapter_id,
        state.chunk_id,
        &record.source_text,
        &record.translation,
        record.quality_score,
    )?;

    info!(
        "chunk {} persisted: {} glossary terms, score {:?}, {} revisions",
        state.chunk_id,
        record.glossary.len(),
        record.quality_score,
        record.revision_count
    );
    Ok(StateDelta {
        needs_human_review: Some(false),
        ..Default::default()
    })
}

pub fn write_chunk_record(
    root: &Path,
    book_id: &str,
    chapter_id: u32,
    chunk_id: u32,
    record: &ChunkRecord,
) -> Result<()> {
    let path = chunk_path(root, book_id, chapter_id, chunk_id);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let text = serde_json::to_string_pretty(record)?;
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
}

pub fn load_chunk_record(path: &Path) -> Result<ChunkRecord> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("decoding {}", path.display()))
}

/// All persisted chunk files of a chapter, sorted by filename (and therefore
/// by zero-padded chunk id).
pub fn list_chunk_files(root: &Path, book_id: &str, chapter_id: u32) -> Result<Vec<PathBuf>> {
    let dir = chapter_dir(root, book_id, chapter_id);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(&dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("chunk_") && n.ends_with(".json"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Concatenate a chapter's persisted translations into a single markdown
/// file, returning its path.
pub fn assemble_chapter(root: &Path, book_id: &str, chapter_id: u32) -> Result<PathBuf> {
    let files = list_chunk_files(root, book_id, chapter_id)?;
    let mut parts = Vec::with_capacity(files.len());
    for file in &files {
        let record = load_chunk_record(file)?;
        parts.push(record.translation);
    }
    let out_path = root
        .join(book_id)
        .join(format!("chapter_{chapter_id}_final.md"));
    fs::write(&out_path, parts.join("\n\n"))
        .with_context(|| format!("writing {}", out_path.display()))?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(chunk_id: u32, translation: &str) -> ChunkRecord {
        ChunkRecord {
            chunk_id,
            source_text: format!("source {chunk_id}"),
            translation: translation.to_string(),
            quality_score: Some(8),
            glossary: Vec::new(),
            refinement_history: Vec::new(),
            revision_count: 1,
            human_reviewed: false,
        }
    }

    #[test]
    fn chunk_ids_are_zero_padded() {
        let path = chunk_path(Path::new("/out"), "bk", 2, 7);
        assert!(path.ends_with("bk/chapter_2/chunk_007.json"));
    }

    #[test]
    fn listing_returns_chunks_in_id_order() {
        let dir = tempdir().unwrap();
        for id in [10u32, 2, 0] {
            write_chunk_record(dir.path(), "bk", 0, id, &record(id, "t")).unwrap();
        }
        let files = list_chunk_files(dir.path(), "bk", 0).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["chunk_000.json", "chunk_002.json", "chunk_010.json"]);
    }

    #[test]
    fn assembles_chapter_in_order() {
        let dir = tempdir().unwrap();
        write_chunk_record(dir.path(), "bk", 1, 1, &record(1, "second")).unwrap();
        write_chunk_record(dir.path(), "bk", 1, 0, &record(0, "first")).unwrap();

        let path = assemble_chapter(dir.path(), "bk", 1).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, "first\n\nsecond");
    }
}
