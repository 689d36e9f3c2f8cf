//! Offline quality metrics over persisted chunk records
//!
//! Unsupervised checks that need no model: round-trip consistency,
//! terminology adherence, length ratio and number preservation, aggregated
//! per chunk and per chapter. Scores live on the same 0-10 scale as the
//! in-loop evaluator.

use crate::persistence::{list_chunk_files, load_chunk_record};
use crate::types::{ChunkRecord, TermEntry};
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

/// Source-to-target length ratio considered ideal for prose.
const IDEAL_LENGTH_RATIO: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct MetricResult {
    pub method: &'static str,
    pub score: f64,
    pub details: String,
}

#[derive(Debug, Clone)]
pub struct ChunkQualityReport {
    pub chunk_id: u32,
    pub metrics: Vec<MetricResult>,
    pub overall_score: f64,
}

#[derive(Debug, Clone)]
pub struct ChapterQualityReport {
    pub chapter_id: u32,
    pub num_chunks: usize,
    pub average_score: f64,
    pub chunk_scores: Vec<f64>,
}

/// Round-trip consistency: character-bigram overlap between the source and
/// the back-translation, scaled to 0-10.
pub fn back_translation_consistency(source: &str, back_translation: &str) -> MetricResult {
    if back_translation.trim().is_empty() || back_translation == source {
        return MetricResult {
            method: "back_translation_consistency",
            score: 0.0,
            details: "back-translation unavailable".to_string(),
        };
    }
    let similarity = bigram_dice(&source.to_lowercase(), &back_translation.to_lowercase());
    MetricResult {
        method: "back_translation_consistency",
        score: round2(similarity * 10.0),
        details: format!("round-trip overlap {:.0}%", similarity * 100.0),
    }
}

/// Terminology adherence: did the translation use the agreed renderings?
/// A source term surviving untranslated counts as a violation.
pub fn terminology_consistency(translation: &str, glossary: &[TermEntry]) -> MetricResult {
    if glossary.is_empty() {
        return MetricResult {
            method: "terminology_consistency",
            score: 10.0,
            details: "no glossary, check skipped".to_string(),
        };
    }
    let translation_lower = translation.to_lowercase();
    let mut total = 0usize;
    let mut correct = 0usize;
    let mut violations = Vec::new();

    for term in glossary {
        let src = term.src.trim();
        let rendering = term.suggested_translation.trim();
        if src.is_empty() || rendering.is_empty() {
            continue;
        }
        total += 1;
        if translation_lower.contains(&src.to_lowercase()) && src != rendering {
            violations.push(src.to_string());
        } else if translation.contains(rendering) {
            correct += 1;
        }
    }

    let score = if total == 0 {
        10.0
    } else {
        correct as f64 / total as f64 * 10.0
    };
    let details = if violations.is_empty() {
        format!("{correct}/{total} terms rendered as agreed")
    } else {
        format!(
            "{correct}/{total} terms rendered as agreed; left untranslated: {}",
            violations.join(", ")
        )
    };
    MetricResult {
        method: "terminology_consistency",
        score: round2(score),
        details,
    }
}

/// Source-words to target-chars ratio, scored by distance from the ideal.
pub fn length_ratio(source: &str, translation: &str) -> MetricResult {
    let source_len = source.split_whitespace().count();
    let translation_len = translation.chars().count();
    if source_len == 0 {
        return MetricResult {
            method: "length_ratio",
            score: 0.0,
            details: "empty source".to_string(),
        };
    }
    let ratio = translation_len as f64 / source_len as f64;
    let deviation = ((ratio - IDEAL_LENGTH_RATIO) / IDEAL_LENGTH_RATIO).abs();
    let score = (10.0 * (1.0 - deviation.min(1.0))).max(0.0);
    MetricResult {
        method: "length_ratio",
        score: round2(score),
        details: format!("ratio {ratio:.2} (ideal {IDEAL_LENGTH_RATIO})"),
    }
}

/// Numbers in the source must survive translation verbatim.
pub fn number_preservation(source: &str, translation: &str) -> MetricResult {
    let number_re = match Regex::new(r"\d+\.?\d*") {
        Ok(re) => re,
        Err(_) => {
            return MetricResult {
                method: "number_preservation",
                score: 10.0,
                details: "pattern unavailable".to_string(),
            }
        }
    };
    let source_numbers: HashSet<&str> =
        number_re.find_iter(source).map(|m| m.as_str()).collect();
    if source_numbers.is_empty() {
        return MetricResult {
            method: "number_preservation",
            score: 10.0,
            details: "no numbers in source".to_string(),
        };
    }
    let translation_numbers: HashSet<&str> =
        number_re.find_iter(translation).map(|m| m.as_str()).collect();
    let preserved = source_numbers.intersection(&translation_numbers).count();
    let missing: Vec<&&str> = source_numbers.difference(&translation_numbers).collect();
    let score = preserved as f64 / source_numbers.len() as f64 * 10.0;
    MetricResult {
        method: "number_preservation",
        score: round2(score),
        details: format!(
            "{preserved}/{} numbers preserved{}",
            source_numbers.len(),
            if missing.is_empty() {
                String::new()
            } else {
                format!(
                    ", missing: {}",
                    missing
                        .iter()
                        .take(5)
                        .map(|s| s.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        ),
    }
}

/// All applicable metrics for one persisted record, averaged into an
/// overall score. The in-loop quality score, when present, participates as
/// its own metric.
pub fn evaluate_chunk(record: &ChunkRecord) -> ChunkQualityReport {
    let mut metrics = Vec::new();

    if let Some(score) = record.quality_score {
        metrics.push(MetricResult {
            method: "quality_score",
            score: score as f64,
            details: format!("in-loop evaluation {score}/10"),
        });
    }
    if let Some(last) = record.refinement_history.last() {
        metrics.push(back_translation_consistency(
            &record.source_text,
            &last.back_translation_snapshot,
        ));
    }
    metrics.push(terminology_consistency(&record.translation, &record.glossary));
    metrics.push(length_ratio(&record.source_text, &record.translation));
    metrics.push(number_preservation(&record.source_text, &record.translation));

    let overall_score = if metrics.is_empty() {
        0.0
    } else {
        round2(metrics.iter().map(|m| m.score).sum::<f64>() / metrics.len() as f64)
    };

    ChunkQualityReport {
        chunk_id: record.chunk_id,
        metrics,
        overall_score,
    }
}

/// Aggregate every persisted chunk of a chapter.
pub fn evaluate_chapter(
    root: &Path,
    book_id: &str,
    chapter_id: u32,
) -> Result<ChapterQualityReport> {
    let mut chunk_scores = Vec::new();
    for file in list_chunk_files(root, book_id, chapter_id)? {
        let record = load_chunk_record(&file)?;
        chunk_scores.push(evaluate_chunk(&record).overall_score);
    }
    let average_score = if chunk_scores.is_empty() {
        0.0
    } else {
        round2(chunk_scores.iter().sum::<f64>() / chunk_scores.len() as f64)
    };
    Ok(ChapterQualityReport {
        chapter_id,
        num_chunks: chunk_scores.len(),
        average_score,
        chunk_scores,
    })
}

fn bigram_dice(a: &str, b: &str) -> f64 {
    let bigrams = |s: &str| -> HashSet<(char, char)> {
        let chars: Vec<char> = s.chars().collect();
        chars.windows(2).map(|w| (w[0], w[1])).collect()
    };
    let set_a = bigrams(a);
    let set_b = bigrams(b);
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let shared = set_a.intersection(&set_b).count();
    2.0 * shared as f64 / (set_a.len() + set_b.len()) as f64
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
