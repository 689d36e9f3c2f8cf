//! Workflow graph: stage wiring, conditional gates, suspend/resume
//!
//! Seven stages in a fixed topology with two conditional transitions:
//! the translate gate (runs without retrieval skip the TEaR loop entirely)
//! and the quality gate (persist on pass or exhausted revision budget,
//! refine otherwise). Every refinement is re-evaluated before the gate
//! re-applies, and the revision cap guarantees termination.

use crate::checkpoint::CheckpointStore;
use crate::error::CheckpointError;
use crate::evaluator::tear_evaluate;
use crate::generation::Generator;
use crate::memory::MemoryStore;
use crate::persistence::persist_chunk;
use crate::rate_limit::RateLimiter;
use crate::retrieval::Retriever;
use crate::stages::{analyze_style, extract_terms, search_and_consolidate};
use crate::translator::{refine_translation, translate_fusion};
use crate::types::{ChunkInput, StateDelta, StatePatch, WorkflowState};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Minimum evaluation score that lets a draft through the quality gate.
pub const QUALITY_PASS_SCORE: i64 = 7;

/// Maximum revisions per run, counting the initial translation.
pub const MAX_REVISIONS: u32 = 3;

/// Graph nodes, in topology order. Doubles as the checkpoint cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    AnalyzeStyle,
    ExtractTerms,
    SearchAndConsolidate,
    TranslateFusion,
    TearEvaluate,
    RefineTranslation,
    Persistence,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::AnalyzeStyle => "analyze_style",
            Stage::ExtractTerms => "extract_terms",
            Stage::SearchAndConsolidate => "search_and_consolidate",
            Stage::TranslateFusion => "translate_fusion",
            Stage::TearEvaluate => "tear_evaluate",
            Stage::RefineTranslation => "refine_translation",
            Stage::Persistence => "persistence",
        }
    }
}

/// Per-graph policy and environment.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub output_root: PathBuf,
    pub source_lang: String,
    pub target_lang: String,
    pub quality_pass_score: i64,
    pub max_revisions: u32,
    /// Suspend after this stage when the run has human review enabled.
    pub pause_after: Option<Stage>,
    pub memory_top_k: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./output"),
            source_lang: "English".to_string(),
            target_lang: "Chinese".to_string(),
            quality_pass_score: QUALITY_PASS_SCORE,
            max_revisions: MAX_REVISIONS,
            pause_after: None,
            memory_top_k: 3,
        }
    }
}

/// Shared collaborators handed to every stage.
pub struct StageContext {
    pub generator: Arc<dyn Generator>,
    pub retriever: Arc<dyn Retriever>,
    pub limiter: Arc<RateLimiter>,
    pub memory: MemoryStore,
    pub config: GraphConfig,
}

/// How one call into the graph ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run reached the terminal stage; the final state is returned.
    Completed(WorkflowState),
    /// The run hit a human-review boundary and checkpointed itself.
    Suspended {
        thread_id: String,
        paused_after: Stage,
    },
}

/// The translation workflow state machine.
///
/// Drives one chunk per call: linear context-building prefix, translate
/// gate, bounded TEaR loop, terminal persistence. State flows through as
/// immutable snapshots updated by stage deltas; suspension snapshots the
/// whole state keyed by thread id.
pub struct TranslationGraph {
    ctx: StageContext,
    checkpoints: CheckpointStore,
}

impl TranslationGraph {
    pub fn new(
        generator: Arc<dyn Generator>,
        retriever: Arc<dyn Retriever>,
        limiter: Arc<RateLimiter>,
        config: GraphConfig,
    ) -> Self {
        let memory = MemoryStore::new(&config.output_root);
        let checkpoints = CheckpointStore::new(&config.output_root);
        Self {
            ctx: StageContext {
                generator,
                retriever,
                limiter,
                memory,
                config,
            },
            checkpoints,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.ctx.config
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.ctx.memory
    }

    /// Run a freshly constructed workflow from the first stage.
    pub async fn run(&self, input: ChunkInput) -> Result<RunOutcome> {
        let state = WorkflowState::new(input);
        info!(
            "starting workflow thread {} (chunk {} of chapter {})",
            state.thread_id, state.chunk_id, state.chapter_id
        );
        self.drive(state, Stage::AnalyzeStyle).await
    }

    /// Continue a suspended thread from its checkpoint, unchanged. Fails with
    /// [`CheckpointError::NotFound`] if the thread was never suspended.
    pub async fn resume(&self, thread_id: &str) -> Result<RunOutcome> {
        let checkpoint = self.checkpoints.load(thread_id)?;
        info!("resuming thread {thread_id} at {}", checkpoint.cursor.label());
        self.drive(checkpoint.state, checkpoint.cursor).await
    }

    /// Merge an external edit (e.g. a human-reviewed glossary) into the
    /// checkpointed state, then continue. The merge happens before any stage
    /// executes and replaces listed fields atomically.
    pub async fn resume_with_patch(
        &self,
        thread_id: &str,
        patch: StatePatch,
    ) -> Result<RunOutcome> {
        let checkpoint = self.checkpoints.patch(thread_id, &patch)?;
        info!(
            "resuming thread {thread_id} at {} with external edits",
            checkpoint.cursor.label()
        );
        self.drive(checkpoint.state, checkpoint.cursor).await
    }

    async fn drive(&self, mut state: WorkflowState, mut cursor: Stage) -> Result<RunOutcome> {
        loop {
            debug!("thread {}: entering {}", state.thread_id, cursor.label());
            let delta = self.execute(cursor, &state).await?;
            delta.apply(&mut state);

            if cursor == Stage::Persistence {
                // Stale checkpoints must not shadow a finished run.
                if let Err(e) = self.checkpoints.remove(&state.thread_id) {
                    debug!("could not drop checkpoint for {}: {e}", state.thread_id);
                }
                info!(
                    "thread {} completed with score {:?} after {} revisions",
                    state.thread_id, state.quality_score, state.revision_count
                );
                return Ok(RunOutcome::Completed(state));
            }

            let next = self.next_stage(cursor, &state);
            if state.human_review_enabled && self.ctx.config.pause_after == Some(cursor) {
                self.checkpoints.save(&state.thread_id, &state, next)?;
                info!(
                    "thread {} suspended after {} awaiting review",
                    state.thread_id,
                    cursor.label()
                );
                return Ok(RunOutcome::Suspended {
                    thread_id: state.thread_id.clone(),
                    paused_after: cursor,
                });
            }
            cursor = next;
        }
    }

    async fn execute(&self, stage: Stage, state: &WorkflowState) -> Result<StateDelta> {
        match stage {
            Stage::AnalyzeStyle => analyze_style(state, &self.ctx).await,
            Stage::ExtractTerms => extract_terms(state, &self.ctx).await,
            Stage::SearchAndConsolidate => search_and_consolidate(state, &self.ctx).await,
            Stage::TranslateFusion => translate_fusion(state, &self.ctx).await,
            Stage::TearEvaluate => tear_evaluate(state, &self.ctx).await,
            Stage::RefineTranslation => refine_translation(state, &self.ctx).await,
            Stage::Persistence => persist_chunk(state, &self.ctx).await,
        }
    }

    /// Static routing plus the two conditional gates.
    fn next_stage(&self, completed: Stage, state: &WorkflowState) -> Stage {
        match completed {
            Stage::AnalyzeStyle => Stage::ExtractTerms,
            Stage::ExtractTerms => Stage::SearchAndConsolidate,
            Stage::SearchAndConsolidate => Stage::TranslateFusion,
            // Translate gate: evaluation is a retrieval-dependent feature.
            Stage::TranslateFusion => {
                if state.use_retrieval {
                    Stage::TearEvaluate
                } else {
                    debug!("retrieval off, skipping evaluation loop");
                    Stage::Persistence
                }
            }
            Stage::TearEvaluate => self.quality_gate(state),
            Stage::RefineTranslation => Stage::TearEvaluate,
            Stage::Persistence => Stage::Persistence,
        }
    }

    fn quality_gate(&self, state: &WorkflowState) -> Stage {
        if state.revision_count >= self.ctx.config.max_revisions {
            info!(
                "gate: revision budget exhausted ({}), forcing persistence",
                state.revision_count
            );
            return Stage::Persistence;
        }
        match state.quality_score {
            Some(score) if score >= self.ctx.config.quality_pass_score => {
                info!("gate: quality verified ({score}), persisting");
                Stage::Persistence
            }
            score => {
                info!("gate: quality insufficient ({score:?}), refining");
                Stage::RefineTranslation
            }
        }
    }

    /// Expose the checkpoint store, mainly for callers that stage external
    /// edits without immediately resuming.
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }
}

/// `CheckpointError` keeps its type through `anyhow` so callers can
/// distinguish resume-before-run from other failures.
pub fn is_unknown_thread(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<CheckpointError>(),
        Some(CheckpointError::NotFound(_))
    )
}
