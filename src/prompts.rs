//! Prompt templates for the generation-backed stages
//!
//! Kept as plain builders so stage code stays readable and the mock
//! generator can route on the stable role lines.

use crate::types::{EvaluationRecord, StyleGuide, TermEntry};

pub(crate) const STYLE_ROLE: &str = "You are a literary analyst";
pub(crate) const TERMS_ROLE: &str = "You are a terminology miner";
pub(crate) const CONSOLIDATE_ROLE: &str = "You are a terminology expert";
pub(crate) const FUSION_ROLE: &str = "You are a senior translation engine";
pub(crate) const BACK_TRANSLATION_ROLE: &str = "You are a back-translator";
pub(crate) const EVALUATION_ROLE: &str = "You are a translation quality assessor";
pub(crate) const REFINE_ROLE: &str = "You are a translation reviser";

/// "- src -> rendering (rationale)" lines for embedding a glossary in a prompt.
pub(crate) fn glossary_lines(glossary: &[TermEntry]) -> String {
    if glossary.is_empty() {
        return "(no glossary)".to_string();
    }
    glossary
        .iter()
        .map(|t| {
            format!(
                "- {} -> {} ({})",
                t.src, t.suggested_translation, t.rationale
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn style_prompt(source_text: &str, chapter_memory: &[String]) -> String {
    let context = if chapter_memory.is_empty() {
        "(none)".to_string()
    } else {
        chapter_memory.join("\n")
    };
    format!(
        "{STYLE_ROLE}. Classify the domain, tone and complexity of the text below.\n\
         Respond with a JSON object: {{\"domain\": string, \"tone\": string, \"complexity\": string}}.\n\n\
         Preceding context:\n{context}\n\n\
         Text:\n{source_text}"
    )
}

pub(crate) fn terms_prompt(source_text: &str, domain: &str) -> String {
    format!(
        "{TERMS_ROLE}. Identify in the text below:\n\
         1. named entities\n\
         2. domain terms\n\
         3. culture-bound words, idioms and slang\n\n\
         List only the words that need verification or a consistent rendering.\n\
         Respond with a JSON object: {{\"terms\": [string, ...]}}.\n\n\
         Domain: {domain}\n\
         Text:\n{source_text}"
    )
}

/// Free-text variant used when structured term mining fails; the caller
/// salvages a list from whatever comes back.
pub(crate) fn terms_prompt_freeform(source_text: &str, domain: &str) -> String {
    format!(
        "{TERMS_ROLE}. List the named entities, domain terms and culture-bound \
         words in the text below that need a consistent rendering, one per line, \
         each in double quotes.\n\n\
         Domain: {domain}\n\
         Text:\n{source_text}"
    )
}

pub(crate) fn consolidate_prompt(
    term: &str,
    source_text: &str,
    memory: &str,
    target_lang: &str,
) -> String {
    format!(
        "{CONSOLIDATE_ROLE}.\n\n\
         Term: \"{term}\"\n\
         Source text: \"{source_text}\"\n\
         Target language: {target_lang}\n\n\
         Retrieved translation memory:\n{memory}\n\n\
         Respond with a JSON object with ALL fields:\n\
         {{\"src\": string, \"suggested_translation\": string, \"type\": string, \
         \"context_meaning\": string, \"rationale\": string}}"
    )
}

pub(crate) fn fusion_prompt(
    source_text: &str,
    glossary_text: &str,
    style: &StyleGuide,
    critique: Option<&str>,
    examples: &[String],
    target_lang: &str,
) -> String {
    let feedback = critique.unwrap_or("(none)");
    let examples_text = if examples.is_empty() {
        "(none)".to_string()
    } else {
        examples.join("\n")
    };
    format!(
        "{FUSION_ROLE}. Translate into {target_lang} in three steps:\n\
         1. Analyze the sentence structure.\n\
         2. Draft a literal version and a liberal version.\n\
         3. Fuse the best of both into a final polished translation.\n\n\
         Constraints:\n\
         - Style: domain={}, tone={}, complexity={}\n\
         - Glossary (mandatory renderings):\n{glossary_text}\n\
         - Feedback from the previous round: {feedback}\n\
         - Similar past translations for reference:\n{examples_text}\n\n\
         Source text:\n{source_text}\n\n\
         Output only the final fused translation.",
        style.domain, style.tone, style.complexity
    )
}

pub(crate) fn back_translation_prompt(translation: &str, source_lang: &str) -> String {
    format!(
        "{BACK_TRANSLATION_ROLE}. Translate the following text back to \
         {source_lang} strictly, without commentary:\n{translation}"
    )
}

pub(crate) fn evaluation_prompt(
    source_text: &str,
    translation: &str,
    back_translation: &str,
) -> String {
    format!(
        "{EVALUATION_ROLE}. Compare the source, the translation and the \
         round-trip back-translation, then respond with exactly this JSON object \
         and nothing else:\n\
         {{\"score\": integer 0-10, \"pass_flag\": boolean, \"critique\": string, \
         \"error_types\": [string], \"specific_issues\": [string], \
         \"improvement_suggestions\": [string]}}\n\n\
         [Source]\n{source_text}\n\n\
         [Translation]\n{translation}\n\n\
         [Back-translation]\n{back_translation}"
    )
}

pub(crate) fn refine_prompt(
    translation: &str,
    record: &EvaluationRecord,
    glossary_text: &str,
    style: &StyleGuide,
    target_lang: &str,
) -> String {
    let issues = if record.specific_issues.is_empty() {
        "(none listed)".to_string()
    } else {
        record.specific_issues.join("\n- ")
    };
    let suggestions = if record.improvement_suggestions.is_empty() {
        "(none listed)".to_string()
    } else {
        record.improvement_suggestions.join("\n- ")
    };
    format!(
        "{REFINE_ROLE}. Revise the {target_lang} translation below to address \
         the critique. Keep what already works; change only what is wrong.\n\n\
         Critique: {}\n\
         Specific issues:\n- {issues}\n\
         Suggestions:\n- {suggestions}\n\n\
         Constraints:\n\
         - Style: domain={}, tone={}, complexity={}\n\
         - Glossary (mandatory renderings):\n{glossary_text}\n\n\
         Current translation:\n{translation}\n\n\
         Output only the revised translation.",
        record.critique, style.domain, style.tone, style.complexity
    )
}
