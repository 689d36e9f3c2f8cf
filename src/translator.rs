//! Translation fusion and targeted refinement
//!
//! The only two stages that bump the revision counter. Fusion falls back to
//! copying the source verbatim when generation is exhausted; refinement keeps
//! the previous draft instead, since it always has a known-good prior.

use crate::generation::generate_text_with_retry;
use crate::graph::StageContext;
use crate::prompts;
use crate::types::{StateDelta, TermEntry, WorkflowState};
use anyhow::Result;
use tracing::{info, warn};

/// How many global-glossary entries may ride along in one prompt.
const MAX_GLOBAL_TERMS: usize = 30;

/// Produce the fused draft translation. Always increments the revision
/// counter, even on degraded output.
pub async fn translate_fusion(state: &WorkflowState, ctx: &StageContext) -> Result<StateDelta> {
    let examples: Vec<String> = if state.use_retrieval {
        ctx.memory
            .similar_examples(&state.source_text, &state.book_id, ctx.config.memory_top_k)
            .into_iter()
            .map(|r| format!("- {} -> {}", r.source_text, r.translation))
            .collect()
    } else {
        Vec::new()
    };

    let glossary = effective_glossary(state);
    let glossary_text = prompts::glossary_lines(&glossary);
    let prompt = prompts::fusion_prompt(
        &state.source_text,
        &glossary_text,
        &state.style_guide,
        state.critique.as_deref(),
        &examples,
        &ctx.config.target_lang,
    );

    info!(
        "translating chunk {} (revision {})",
        state.chunk_id,
        state.revision_count + 1
    );
    let translation =
        match generate_text_with_retry(ctx.generator.as_ref(), &ctx.limiter, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("translation generation exhausted retries, copying source verbatim: {e}");
                state.source_text.clone()
            }
        };

    Ok(StateDelta {
        combined_translation: Some(translation),
        bump_revision: true,
        ..Default::default()
    })
}

/// Revise the current draft against the latest evaluation. Only reachable
/// through the quality gate, so an evaluation record must exist.
pub async fn refine_translation(state: &WorkflowState, ctx: &StageContext) -> Result<StateDelta> {
    let record = state
        .refinement_history
        .last()
        .ok_or_else(|| anyhow::anyhow!("refinement reached without a prior evaluation"))?;
    let current = state
        .combined_translation
        .clone()
        .unwrap_or_else(|| state.source_text.clone());

    let glossary = effective_glossary(state);
    let glossary_text = prompts::glossary_lines(&glossary);
    let prompt = prompts::refine_prompt(
        &current,
        record,
        &glossary_text,
        &state.style_guide,
        &ctx.config.target_lang,
    );

    info!(
        "refining chunk {} (revision {}, last score {})",
        state.chunk_id,
        state.revision_count + 1,
        record.score
    );
    match generate_text_with_retry(ctx.generator.as_ref(), &ctx.limiter, &prompt).await {
        Ok(text) => Ok(StateDelta {
            combined_translation: Some(text),
            bump_revision: true,
            ..Default::default()
        }),
        Err(e) => {
            warn!("refinement generation exhausted retries, keeping previous draft: {e}");
            Ok(StateDelta {
                bump_revision: true,
                ..Default::default()
            })
        }
    }
}

/// The chunk glossary plus any global entries whose source term actually
/// occurs in this chunk, without duplicating a src already covered.
fn effective_glossary(state: &WorkflowState) -> Vec<TermEntry> {
    let mut merged: Vec<TermEntry> = state.glossary.clone();
    let covered: std::collections::HashSet<String> =
        merged.iter().map(|t| t.src.to_lowercase()).collect();
    let source_lower = state.source_text.to_lowercase();

    merged.extend(
        state
            .global_glossary
            .values()
            .filter(|t| !covered.contains(&t.src.to_lowercase()))
            .filter(|t| source_lower.contains(&t.src.to_lowercase()))
            .take(MAX_GLOBAL_TERMS)
            .cloned(),
    );
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkInput, WorkflowState};

    #[test]
    fn effective_glossary_pulls_matching_global_terms() {
        let mut state = WorkflowState::new(ChunkInput {
            book_id: "bk".to_string(),
            source_text: "A neural network learns weights.".to_string(),
            thread_id: "t".to_string(),
            ..Default::default()
        });
        state.glossary = vec![TermEntry::fallback("weights", "seed")];
        state.global_glossary.insert(
            "neural network".to_string(),
            TermEntry::fallback("neural network", "global"),
        );
        state.global_glossary.insert(
            "transformer".to_string(),
            TermEntry::fallback("transformer", "global"),
        );
        // Already covered by the chunk glossary; must not duplicate.
        state.global_glossary.insert(
            "weights".to_string(),
            TermEntry::fallback("weights", "global"),
        );

        let merged = effective_glossary(&state);
        let srcs: Vec<&str> = merged.iter().map(|t| t.src.as_str()).collect();
        assert_eq!(srcs, vec!["weights", "neural network"]);
    }
}
