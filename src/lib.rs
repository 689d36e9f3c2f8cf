//! Linguagraph - quality-gated translation workflows for long documents
//!
//! Implements a checkpointable translation state machine with:
//! - Style analysis and terminology mining over each chunk
//! - Retrieval-grounded glossary consolidation
//! - Multi-strategy translation fusion
//! - A bounded TEaR loop (translate, evaluate via back-translation, refine)
//! - Thread-keyed suspend/resume for human glossary review
//! - Chapter-level orchestration with batch review and cross-chunk memory

pub mod book;
pub mod checkpoint;
pub mod error;
pub mod evaluator;
pub mod generation;
pub mod glossary;
pub mod graph;
pub mod memory;
pub mod orchestrator;
pub mod persistence;
mod prompts;
pub mod quality;
pub mod rate_limit;
pub mod retrieval;
pub mod server;
pub mod stages;
pub mod translator;
pub mod types;

pub use book::{load_book, split_chapter_into_chunks, ChapterSource};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::{CheckpointError, GenerationError};
pub use generation::{Generator, HttpGenerator, MockGenerator};
pub use glossary::GlossaryStore;
pub use graph::{
    GraphConfig, RunOutcome, Stage, StageContext, TranslationGraph, MAX_REVISIONS,
    QUALITY_PASS_SCORE,
};
pub use memory::{MemoryRecord, MemoryStore};
pub use orchestrator::{AutoAcceptReviewer, BookOrchestrator, GlossaryReviewer};
pub use rate_limit::RateLimiter;
pub use retrieval::{HttpRetriever, MemoryPair, Retriever, StaticRetriever};
pub use types::*;

#[cfg(test)]
mod tests;
