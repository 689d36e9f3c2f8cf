//! Context-building stages: style analysis, term mining, consolidation
//!
//! All three are advisory and never fatal: each degrades to a safe default
//! when generation or retrieval misbehaves.

use crate::generation::{generate_json_with_retry, generate_text_with_retry};
use crate::graph::StageContext;
use crate::prompts;
use crate::retrieval::format_pairs;
use crate::types::{StateDelta, StyleGuide, TermEntry, WorkflowState};
use anyhow::Result;
use futures::future::join_all;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

/// Classify domain/tone/complexity of the source text. Style is an advisory
/// signal: any failure falls back to the fixed defaults.
pub async fn analyze_style(state: &WorkflowState, ctx: &StageContext) -> Result<StateDelta> {
    let prompt = prompts::style_prompt(&state.source_text, &state.chapter_memory);
    let style = match generate_json_with_retry(ctx.generator.as_ref(), &ctx.limiter, &prompt).await
    {
        Ok(value) => match serde_json::from_value::<StyleGuide>(value) {
            Ok(style) => style,
            Err(e) => {
                warn!("style metadata did not parse, using defaults: {e}");
                StyleGuide::default()
            }
        },
        Err(e) => {
            warn!("style analysis unavailable, using defaults: {e}");
            StyleGuide::default()
        }
    };
    info!(
        "style: domain={} tone={} complexity={}",
        style.domain, style.tone, style.complexity
    );
    Ok(StateDelta {
        style_guide: Some(style),
        ..Default::default()
    })
}

/// Mine the terms that need verification or a consistent rendering.
///
/// Structured output first; on failure, a free-text pass salvaged with a
/// JSON-array scan and a quoted-substring heuristic; on total failure, an
/// empty list.
pub async fn extract_terms(state: &WorkflowState, ctx: &StageContext) -> Result<StateDelta> {
    let prompt = prompts::terms_prompt(&state.source_text, &state.style_guide.domain);
    let mut terms =
        match generate_json_with_retry(ctx.generator.as_ref(), &ctx.limiter, &prompt).await {
            Ok(value) => parse_term_list(&value),
            Err(e) => {
                warn!("structured term mining failed ({e}), trying free-text salvage");
                let freeform =
                    prompts::terms_prompt_freeform(&state.source_text, &state.style_guide.domain);
                match generate_text_with_retry(ctx.generator.as_ref(), &ctx.limiter, &freeform)
                    .await
                {
                    Ok(text) => extract_terms_from_text(&text),
                    Err(e) => {
                        warn!("term mining failed entirely, continuing without terms: {e}");
                        Vec::new()
                    }
                }
            }
        };

    dedup_in_order(&mut terms);
    info!("mined {} terms", terms.len());
    Ok(StateDelta {
        raw_terms: Some(terms),
        ..Default::default()
    })
}

/// For each mined term: look up translation memory (skipped entirely when the
/// run is not retrieval-augmented), then ask for a grounded glossary entry.
/// A failed term gets a fallback entry; one term never aborts the batch.
pub async fn search_and_consolidate(
    state: &WorkflowState,
    ctx: &StageContext,
) -> Result<StateDelta> {
    let lookups: Vec<String> = if state.use_retrieval {
        join_all(state.raw_terms.iter().map(|term| async move {
            match ctx.retriever.search(term, ctx.config.memory_top_k).await {
                Ok(pairs) => format_pairs(&pairs),
                Err(e) => {
                    warn!("memory lookup failed for '{term}', continuing without memory: {e:#}");
                    format_pairs(&[])
                }
            }
        }))
        .await
    } else {
        vec![format_pairs(&[]); state.raw_terms.len()]
    };

    let mut glossary = Vec::with_capacity(state.raw_terms.len());
    for (term, memory) in state.raw_terms.iter().zip(lookups.iter()) {
        let prompt = prompts::consolidate_prompt(
            term,
            &state.source_text,
            memory,
            &ctx.config.target_lang,
        );
        let entry =
            match generate_json_with_retry(ctx.generator.as_ref(), &ctx.limiter, &prompt).await {
                Ok(value) => match serde_json::from_value::<TermEntry>(value) {
                    Ok(mut entry) => {
                        if entry.src.trim().is_empty() {
                            entry.src = term.clone();
                        }
                        entry
                    }
                    Err(e) => {
                        warn!("glossary entry for '{term}' did not parse: {e}");
                        TermEntry::fallback(term, &e.to_string())
                    }
                },
                Err(e) => {
                    warn!("glossary consolidation failed for '{term}': {e}");
                    TermEntry::fallback(term, &e.to_string())
                }
            };
        glossary.push(entry);
    }

    info!("consolidated {} glossary entries", glossary.len());
    Ok(StateDelta {
        glossary: Some(glossary),
        ..Default::default()
    })
}

fn parse_term_list(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("terms") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };
    items
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Best-effort term salvage from a free-text completion: first a JSON array
/// anywhere in the text, then quoted substrings.
pub(crate) fn extract_terms_from_text(text: &str) -> Vec<String> {
    if let Ok(array_re) = Regex::new(r"\[[^\[\]]*\]") {
        for found in array_re.find_iter(text) {
            if let Ok(value) = serde_json::from_str::<Value>(found.as_str()) {
                let terms = parse_term_list(&value);
                if !terms.is_empty() {
                    return terms;
                }
            }
        }
    }
    if let Ok(quoted_re) = Regex::new(r#""([^"\n]{2,60})""#) {
        return quoted_re
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    Vec::new()
}

fn dedup_in_order(terms: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    terms.retain(|t| seen.insert(t.to_lowercase()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salvages_json_array_from_prose() {
        let text = "Sure! Here are the terms: [\"neural network\", \"backprop\"] hope that helps";
        let terms = extract_terms_from_text(text);
        assert_eq!(terms, vec!["neural network", "backprop"]);
    }

    #[test]
    fn salvages_quoted_substrings_without_array() {
        let text = "The key terms are \"gradient descent\" and \"loss surface\".";
        let terms = extract_terms_from_text(text);
        assert_eq!(terms, vec!["gradient descent", "loss surface"]);
    }

    #[test]
    fn empty_salvage_yields_empty_list() {
        assert!(extract_terms_from_text("no structure here at all").is_empty());
    }

    #[test]
    fn term_list_accepts_bare_array_and_wrapper() {
        let wrapped = serde_json::json!({"terms": ["a", " b ", ""]});
        assert_eq!(parse_term_list(&wrapped), vec!["a", "b"]);
        let bare = serde_json::json!(["x", "y"]);
        assert_eq!(parse_term_list(&bare), vec!["x", "y"]);
    }
}
