//! Core type definitions for the translation workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Style metadata produced by the analysis stage and consumed by every
/// translation prompt. Advisory only: failures fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleGuide {
    pub domain: String,
    pub tone: String,
    pub complexity: String,
}

impl Default for StyleGuide {
    fn default() -> Self {
        Self {
            domain: "general".to_string(),
            tone: "formal".to_string(),
            complexity: "medium".to_string(),
        }
    }
}

/// Category of a mined term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TermType {
    #[serde(rename = "NER")]
    Ner,
    DomainTerm,
    Idiom,
    Slang,
    Acronym,
    ProperNoun,
    Unknown,
}

impl TermType {
    /// Forgiving mapping from whatever label the model emitted.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "ner" | "named entity" | "entity" => TermType::Ner,
            "domainterm" | "domain term" | "domain_term" | "term" => TermType::DomainTerm,
            "idiom" | "idioms" => TermType::Idiom,
            "slang" => TermType::Slang,
            "acronym" | "abbreviation" => TermType::Acronym,
            "propernoun" | "proper noun" | "proper_noun" => TermType::ProperNoun,
            _ => TermType::Unknown,
        }
    }
}

impl Default for TermType {
    fn default() -> Self {
        TermType::Unknown
    }
}

impl<'de> Deserialize<'de> for TermType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(TermType::from_label(&label))
    }
}

/// One glossary record: a source-language term with its agreed rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermEntry {
    pub src: String,
    #[serde(rename = "type", default)]
    pub term_type: TermType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_meaning: Option<String>,
    pub suggested_translation: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub human_reviewed: bool,
    #[serde(default)]
    pub human_modified: bool,
    /// Snapshot of the machine suggestion, kept only once a human edits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_suggested_translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl TermEntry {
    /// Substitute entry for a term whose consolidation call failed.
    /// The source term stands in as its own translation.
    pub fn fallback(src: &str, reason: &str) -> Self {
        Self {
            src: src.to_string(),
            term_type: TermType::Unknown,
            context_meaning: Some("Insufficient context from retrieval.".to_string()),
            suggested_translation: src.to_string(),
            rationale: format!("Fallback due to error: {reason}"),
            human_reviewed: false,
            human_modified: false,
            original_suggested_translation: None,
            reviewed_at: None,
        }
    }
}

/// One TEaR iteration's outcome. Immutable once appended to the
/// refinement history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub iteration: u32,
    pub score: i64,
    pub critique: String,
    #[serde(default)]
    pub error_types: Vec<String>,
    #[serde(default)]
    pub specific_issues: Vec<String>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    pub back_translation_snapshot: String,
}

/// Caller-supplied inputs for one chunk's workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkInput {
    pub book_id: String,
    pub chapter_id: u32,
    pub chunk_id: u32,
    pub source_text: String,
    pub thread_id: String,
    #[serde(default)]
    pub use_retrieval: bool,
    #[serde(default)]
    pub human_review_enabled: bool,
    #[serde(default)]
    pub chapter_memory: Vec<String>,
    #[serde(default)]
    pub global_glossary: BTreeMap<String, TermEntry>,
}

/// The single unit of mutable context threaded through every stage.
///
/// Stages never write this directly: each returns a [`StateDelta`] and the
/// graph runtime applies it, so the data flow stays auditable and the whole
/// snapshot serializes cleanly for checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    // Identity, immutable after creation.
    pub book_id: String,
    pub chapter_id: u32,
    pub chunk_id: u32,
    pub thread_id: String,
    pub source_text: String,

    // Context, populated early and read-mostly afterwards.
    #[serde(default)]
    pub style_guide: StyleGuide,
    #[serde(default)]
    pub chapter_memory: Vec<String>,
    #[serde(default)]
    pub global_glossary: BTreeMap<String, TermEntry>,

    // Working set, mutated by stages in sequence.
    #[serde(default)]
    pub raw_terms: Vec<String>,
    #[serde(default)]
    pub glossary: Vec<TermEntry>,
    #[serde(default)]
    pub combined_translation: Option<String>,
    #[serde(default)]
    pub back_translation: Option<String>,

    // Control signals.
    #[serde(default)]
    pub quality_score: Option<i64>,
    #[serde(default)]
    pub critique: Option<String>,
    #[serde(default)]
    pub revision_count: u32,
    #[serde(default)]
    pub refinement_history: Vec<EvaluationRecord>,
    #[serde(default)]
    pub use_retrieval: bool,
    #[serde(default)]
    pub human_review_enabled: bool,
    #[serde(default)]
    pub needs_human_review: bool,
}

impl WorkflowState {
    pub fn new(input: ChunkInput) -> Self {
        let needs_human_review = input.human_review_enabled;
        Self {
            book_id: input.book_id,
            chapter_id: input.chapter_id,
            chunk_id: input.chunk_id,
            thread_id: input.thread_id,
            source_text: input.source_text,
            style_guide: StyleGuide::default(),
            chapter_memory: input.chapter_memory,
            global_glossary: input.global_glossary,
            raw_terms: Vec::new(),
            glossary: Vec::new(),
            combined_translation: None,
            back_translation: None,
            quality_score: None,
            critique: None,
            revision_count: 0,
            refinement_history: Vec::new(),
            use_retrieval: input.use_retrieval,
            human_review_enabled: input.human_review_enabled,
            needs_human_review,
        }
    }
}

/// Changed-fields record returned by a stage.
///
/// The graph runtime is the single writer: stages get a read-only view of the
/// state and emit only the fields they changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDelta {
    pub style_guide: Option<StyleGuide>,
    pub raw_terms: Option<Vec<String>>,
    pub glossary: Option<Vec<TermEntry>>,
    pub combined_translation: Option<String>,
    pub back_translation: Option<String>,
    pub quality_score: Option<i64>,
    pub critique: Option<String>,
    /// Set by translate-fusion and refine only.
    pub bump_revision: bool,
    /// Appended by the evaluation stage only.
    pub evaluation: Option<EvaluationRecord>,
    pub needs_human_review: Option<bool>,
}

impl StateDelta {
    /// Apply this delta to a state snapshot, producing the next snapshot
    /// in place.
    pub fn apply(self, state: &mut WorkflowState) {
        if let Some(style) = self.style_guide {
            state.style_guide = style;
        }
        if let Some(terms) = self.raw_terms {
            state.raw_terms = terms;
        }
        if let Some(glossary) = self.glossary {
            state.glossary = glossary;
        }
        if let Some(translation) = self.combined_translation {
            state.combined_translation = Some(translation);
        }
        if let Some(back) = self.back_translation {
            state.back_translation = Some(back);
        }
        if let Some(score) = self.quality_score {
            state.quality_score = Some(score);
        }
        if let Some(critique) = self.critique {
            state.critique = Some(critique);
        }
        if self.bump_revision {
            state.revision_count += 1;
        }
        if let Some(record) = self.evaluation {
            state.refinement_history.push(record);
        }
        if let Some(flag) = self.needs_human_review {
            state.needs_human_review = flag;
        }
    }
}

/// Externally-supplied edit merged into a checkpointed state before
/// execution continues. Listed fields replace their counterpart wholesale;
/// everything else is untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossary: Option<Vec<TermEntry>>,
}

impl StatePatch {
    pub fn apply(&self, state: &mut WorkflowState) {
        if let Some(ref glossary) = self.glossary {
            state.glossary = glossary.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.glossary.is_none()
    }
}

/// The persisted per-chunk output record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: u32,
    pub source_text: String,
    pub translation: String,
    pub quality_score: Option<i64>,
    #[serde(default)]
    pub glossary: Vec<TermEntry>,
    #[serde(default)]
    pub refinement_history: Vec<EvaluationRecord>,
    #[serde(default)]
    pub revision_count: u32,
    #[serde(default)]
    pub human_reviewed: bool,
}

impl ChunkRecord {
    pub fn from_state(state: &WorkflowState) -> Self {
        Self {
            chunk_id: state.chunk_id,
            source_text: state.source_text.clone(),
            translation: state
                .combined_translation
                .clone()
                .unwrap_or_else(|| state.source_text.clone()),
            quality_score: state.quality_score,
            glossary: state.glossary.clone(),
            refinement_history: state.refinement_history.clone(),
            revision_count: state.revision_count,
            human_reviewed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_type_labels_are_forgiving() {
        assert_eq!(TermType::from_label("NER"), TermType::Ner);
        assert_eq!(TermType::from_label("proper noun"), TermType::ProperNoun);
        assert_eq!(TermType::from_label("Domain Term"), TermType::DomainTerm);
        assert_eq!(TermType::from_label("something else"), TermType::Unknown);
    }

    #[test]
    fn delta_apply_is_field_wise() {
        let mut state = WorkflowState::new(ChunkInput {
            book_id: "b".to_string(),
            chapter_id: 0,
            chunk_id: 0,
            source_text: "hello".to_string(),
            thread_id: "t".to_string(),
            ..Default::default()
        });

        let delta = StateDelta {
            combined_translation: Some("bonjour".to_string()),
            bump_revision: true,
            ..Default::default()
        };
        delta.apply(&mut state);

        assert_eq!(state.combined_translation.as_deref(), Some("bonjour"));
        assert_eq!(state.revision_count, 1);
        // Untouched fields keep their values.
        assert_eq!(state.source_text, "hello");
        assert!(state.refinement_history.is_empty());
    }

    #[test]
    fn patch_replaces_glossary_wholesale() {
        let mut state = WorkflowState::new(ChunkInput {
            book_id: "b".to_string(),
            source_text: "hello".to_string(),
            thread_id: "t".to_string(),
            ..Default::default()
        });
        state.glossary = vec![TermEntry::fallback("old", "seed")];

        let patch = StatePatch {
            glossary: Some(vec![TermEntry::fallback("new", "edited")]),
        };
        patch.apply(&mut state);

        assert_eq!(state.glossary.len(), 1);
        assert_eq!(state.glossary[0].src, "new");
    }
}
