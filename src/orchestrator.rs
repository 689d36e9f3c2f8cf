//! Chapter-level orchestration: sequential chunk runs, then batch review
//!
//! Chunks run strictly in document order, one at a time. Human review
//! happens once per chapter: the de-duplicated chapter glossary goes to the
//! reviewer, and the reviewed terms are merged back into every persisted
//! chunk and into the long-lived glossary store.

use crate::book::{split_chapter_into_chunks, ChapterSource, CHUNK_OVERLAP_CHARS, MAX_CHUNK_CHARS};
use crate::glossary::{apply_reviewed_glossary, collect_chapter_glossary, GlossaryStore};
use crate::graph::{RunOutcome, TranslationGraph};
use crate::persistence::assemble_chapter;
use crate::types::{ChunkInput, TermEntry};
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// How many prior translations feed the next chunk's context.
const CHAPTER_CONTEXT_CHUNKS: usize = 3;
const PRIOR_CHAPTER_CONTEXT_CHUNKS: usize = 2;

/// External collaborator for the chapter-level review pass.
#[async_trait]
pub trait GlossaryReviewer: Send + Sync {
    /// Review a chapter's de-duplicated glossary. Implementations set
    /// `human_reviewed` on every returned entry and `human_modified` (with
    /// `original_suggested_translation` snapshotted) on the ones they edit.
    async fn review(
        &self,
        terms: Vec<TermEntry>,
        chapter_text: &str,
    ) -> Result<Vec<TermEntry>>;
}

/// Accepts every suggestion unchanged. Stands in for an interactive reviewer
/// in unattended runs.
pub struct AutoAcceptReviewer;

#[async_trait]
impl GlossaryReviewer for AutoAcceptReviewer {
    async fn review(
        &self,
        mut terms: Vec<TermEntry>,
        _chapter_text: &str,
    ) -> Result<Vec<TermEntry>> {
        for term in &mut terms {
            term.human_reviewed = true;
            term.human_modified = false;
        }
        Ok(terms)
    }
}

#[derive(Debug, Clone)]
pub struct ChunkReport {
    pub chunk_id: u32,
    pub thread_id: String,
    pub quality_score: Option<i64>,
    pub revision_count: u32,
}

#[derive(Debug, Clone)]
pub struct ChapterReport {
    pub chapter_id: u32,
    pub title: String,
    pub chunks: Vec<ChunkReport>,
    pub reviewed_terms: usize,
    pub assembled_path: Option<PathBuf>,
}

/// Drives whole books through the workflow graph, one chunk at a time.
pub struct BookOrchestrator {
    graph: TranslationGraph,
    reviewer: Arc<dyn GlossaryReviewer>,
    glossary_store: GlossaryStore,
    use_retrieval: bool,
}

impl BookOrchestrator {
    pub fn new(
        graph: TranslationGraph,
        reviewer: Arc<dyn GlossaryReviewer>,
        use_retrieval: bool,
    ) -> Self {
        let glossary_store = GlossaryStore::new(&graph.config().output_root);
        Self {
            graph,
            reviewer,
            glossary_store,
            use_retrieval,
        }
    }

    pub fn graph(&self) -> &TranslationGraph {
        &self.graph
    }

    pub async fn translate_book(
        &self,
        book_id: &str,
        chapters: &[ChapterSource],
    ) -> Result<Vec<ChapterReport>> {
        let mut reports = Vec::with_capacity(chapters.len());
        for (chapter_id, chapter) in chapters.iter().enumerate() {
            let report = self
                .translate_chapter(book_id, chapter_id as u32, chapter)
                .await?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Phase 1: translate every chunk sequentially. Phase 2: collect the
    /// chapter glossary, run the review pass, merge the result back.
    pub async fn translate_chapter(
        &self,
        book_id: &str,
        chapter_id: u32,
        chapter: &ChapterSource,
    ) -> Result<ChapterReport> {
        let title = if chapter.title.is_empty() {
            format!("Chapter {chapter_id}")
        } else {
            chapter.title.clone()
        };
        info!("translating {book_id} / {title}");

        if chapter.content.trim().is_empty() {
            warn!("chapter {chapter_id} is empty, skipping");
            return Ok(ChapterReport {
                chapter_id,
                title,
                chunks: Vec::new(),
                reviewed_terms: 0,
                assembled_path: None,
            });
        }

        let chunks =
            split_chapter_into_chunks(&chapter.content, MAX_CHUNK_CHARS, CHUNK_OVERLAP_CHARS);
        info!("chapter {chapter_id}: {} chunks", chunks.len());

        let mut chunk_reports = Vec::with_capacity(chunks.len());
        for (chunk_id, chunk_text) in chunks.iter().enumerate() {
            let chunk_id = chunk_id as u32;
            let input = ChunkInput {
                book_id: book_id.to_string(),
                chapter_id,
                chunk_id,
                source_text: chunk_text.clone(),
                thread_id: format!("ch{chapter_id}_ck{chunk_id}"),
                use_retrieval: self.use_retrieval,
                // Review happens per chapter, not per chunk.
                human_review_enabled: false,
                chapter_memory: self.build_context(book_id, chapter_id),
                global_glossary: self.glossary_store.load(),
            };

            match self.graph.run(input).await? {
                RunOutcome::Completed(state) => {
                    info!(
                        "chunk {chunk_id} finished: score {:?}, {} revisions",
                        state.quality_score, state.revision_count
                    );
                    chunk_reports.push(ChunkReport {
                        chunk_id,
                        thread_id: state.thread_id,
                        quality_score: state.quality_score,
                        revision_count: state.revision_count,
                    });
                }
                RunOutcome::Suspended { thread_id, .. } => {
                    // Batch mode disables per-chunk review, so a suspension
                    // means a misconfigured graph; finish the thread as-is.
                    warn!("chunk thread {thread_id} suspended in batch mode, resuming");
                    if let RunOutcome::Completed(state) = self.graph.resume(&thread_id).await? {
                        chunk_reports.push(ChunkReport {
                            chunk_id,
                            thread_id: state.thread_id,
                            quality_score: state.quality_score,
                            revision_count: state.revision_count,
                        });
                    }
                }
            }
        }

        let reviewed_terms = self
            .review_chapter_glossary(book_id, chapter_id, &chapter.content)
            .await?;

        let root = &self.graph.config().output_root;
        let assembled_path = match assemble_chapter(root, book_id, chapter_id) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("could not assemble chapter {chapter_id}: {e:#}");
                None
            }
        };

        info!("chapter {chapter_id} completed ({} chunks)", chunk_reports.len());
        Ok(ChapterReport {
            chapter_id,
            title,
            chunks: chunk_reports,
            reviewed_terms,
            assembled_path,
        })
    }

    async fn review_chapter_glossary(
        &self,
        book_id: &str,
        chapter_id: u32,
        chapter_text: &str,
    ) -> Result<usize> {
        let root = &self.graph.config().output_root;
        let chapter_glossary = collect_chapter_glossary(root, book_id, chapter_id)?;
        if chapter_glossary.is_empty() {
            info!("no terms found in chapter {chapter_id}");
            return Ok(0);
        }
        info!(
            "chapter {chapter_id}: {} unique terms for review",
            chapter_glossary.len()
        );

        let (already_reviewed, unreviewed) = self.glossary_store.filter_reviewed(chapter_glossary);
        let newly_reviewed = if unreviewed.is_empty() {
            Vec::new()
        } else {
            self.reviewer.review(unreviewed, chapter_text).await?
        };
        self.glossary_store.save_reviewed(&newly_reviewed)?;

        let mut merged = already_reviewed;
        merged.extend(newly_reviewed);
        apply_reviewed_glossary(root, book_id, chapter_id, &merged)?;
        Ok(merged.len())
    }

    /// Context lines for the next chunk: the tail of this chapter's
    /// translations plus a little from prior chapters.
    fn build_context(&self, book_id: &str, chapter_id: u32) -> Vec<String> {
        let memory = self.graph.memory();
        let mut context: Vec<String> = memory
            .prior_chapters_memory(book_id, chapter_id, PRIOR_CHAPTER_CONTEXT_CHUNKS)
            .into_iter()
            .rev()
            .map(|r| r.translation)
            .collect();

        let chapter = memory.chapter_memory(book_id, chapter_id);
        let tail_start = chapter.len().saturating_sub(CHAPTER_CONTEXT_CHUNKS);
        context.extend(chapter.into_iter().skip(tail_start).map(|r| r.translation));
        context
    }
}
