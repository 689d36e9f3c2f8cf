//! Workflow-level tests against mock collaborators

use crate::book::ChapterSource;
use crate::generation::{Generator, MockGenerator};
use crate::graph::{GraphConfig, RunOutcome, Stage, TranslationGraph};
use crate::orchestrator::{AutoAcceptReviewer, BookOrchestrator};
use crate::persistence::{chunk_path, load_chunk_record};
use crate::prompts;
use crate::rate_limit::RateLimiter;
use crate::retrieval::{MemoryPair, Retriever, StaticRetriever};
use crate::types::{ChunkInput, StatePatch, TermEntry};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn build_graph(
    root: &Path,
    generator: Arc<MockGenerator>,
    pause_after: Option<Stage>,
) -> TranslationGraph {
    let retriever: Arc<dyn Retriever> = Arc::new(StaticRetriever::new(vec![MemoryPair {
        source: "neural network".to_string(),
        target: "reseau de neurones".to_string(),
    }]));
    let config = GraphConfig {
        output_root: root.to_path_buf(),
        pause_after,
        ..GraphConfig::default()
    };
    TranslationGraph::new(generator as Arc<dyn Generator>, retriever, Arc::new(RateLimiter::new(10_000)), config)
}

fn input(root_text: &str, use_retrieval: bool, human_review: bool) -> ChunkInput {
    ChunkInput {
        book_id: "test_book".to_string(),
        chapter_id: 0,
        chunk_id: 0,
        source_text: root_text.to_string(),
        thread_id: "ch0_ck0".to_string(),
        use_retrieval,
        human_review_enabled: human_review,
        ..Default::default()
    }
}

fn completed(outcome: RunOutcome) -> crate::types::WorkflowState {
    match outcome {
        RunOutcome::Completed(state) => state,
        RunOutcome::Suspended { thread_id, .. } => {
            panic!("expected completion, thread {thread_id} suspended")
        }
    }
}

#[tokio::test]
async fn retrieval_off_skips_the_evaluation_loop() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new());
    let graph = build_graph(dir.path(), generator.clone(), None);

    let state = completed(
        graph
            .run(input("The quick brown fox.", false, false))
            .await
            .unwrap(),
    );

    assert_eq!(state.revision_count, 1);
    assert!(state.quality_score.is_none());
    assert!(state.refinement_history.is_empty());
    assert_eq!(generator.calls_containing(prompts::FUSION_ROLE), 1);
    assert_eq!(generator.calls_containing(prompts::EVALUATION_ROLE), 0);

    let record =
        load_chunk_record(&chunk_path(dir.path(), "test_book", 0, 0)).unwrap();
    assert_eq!(record.quality_score, None);
    assert_eq!(record.revision_count, 1);
    assert_eq!(record.translation, "mock translation v1");
}

#[tokio::test]
async fn passing_score_persists_after_first_evaluation() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::with_scores(vec![8]));
    let graph = build_graph(dir.path(), generator.clone(), None);

    let state = completed(
        graph
            .run(input("A neural network learns.", true, false))
            .await
            .unwrap(),
    );

    assert_eq!(state.revision_count, 1);
    assert_eq!(state.quality_score, Some(8));
    assert_eq!(state.refinement_history.len(), 1);
    assert_eq!(state.refinement_history[0].iteration, 1);
    assert_eq!(generator.calls_containing(prompts::REFINE_ROLE), 0);
}

#[tokio::test]
async fn low_scores_exhaust_the_revision_budget() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::with_scores(vec![5]));
    let graph = build_graph(dir.path(), generator.clone(), None);

    let state = completed(
        graph
            .run(input("A neural network learns.", true, false))
            .await
            .unwrap(),
    );

    // Initial translation plus two refinements, each re-evaluated.
    assert_eq!(state.revision_count, 3);
    assert_eq!(state.refinement_history.len(), 3);
    let iterations: Vec<u32> = state
        .refinement_history
        .iter()
        .map(|r| r.iteration)
        .collect();
    assert_eq!(iterations, vec![1, 2, 3]);
    assert_eq!(state.refinement_history.last().unwrap().score, 5);
    assert_eq!(generator.calls_containing(prompts::REFINE_ROLE), 2);

    let record =
        load_chunk_record(&chunk_path(dir.path(), "test_book", 0, 0)).unwrap();
    assert_eq!(record.revision_count, 3);
    assert_eq!(record.quality_score, Some(5));
}

#[tokio::test]
async fn improving_score_stops_the_loop_early() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::with_scores(vec![5, 9]));
    let graph = build_graph(dir.path(), generator.clone(), None);

    let state = completed(
        graph
            .run(input("A neural network learns.", true, false))
            .await
            .unwrap(),
    );

    assert_eq!(state.revision_count, 2);
    assert_eq!(state.refinement_history.len(), 2);
    assert_eq!(state.quality_score, Some(9));
    assert_eq!(state.combined_translation.as_deref(), Some("mock refined translation"));
}

#[tokio::test(start_paused = true)]
async fn dead_generator_still_produces_output() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::failing());
    let graph = build_graph(dir.path(), generator.clone(), None);

    let source = "Fallbacks must keep the pipeline moving.";
    let state = completed(graph.run(input(source, false, false)).await.unwrap());

    // Degraded, not dead: the source text stands in for the translation and
    // the revision counter still advanced exactly once.
    assert_eq!(state.combined_translation.as_deref(), Some(source));
    assert_eq!(state.revision_count, 1);
    assert!(state.glossary.is_empty());
    assert!(state.raw_terms.is_empty());

    let record =
        load_chunk_record(&chunk_path(dir.path(), "test_book", 0, 0)).unwrap();
    assert_eq!(record.translation, source);
}

#[tokio::test(start_paused = true)]
async fn dead_generator_fails_open_through_the_gate() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::failing());
    let graph = build_graph(dir.path(), generator, None);

    let state = completed(
        graph
            .run(input("Retrieval-augmented run.", true, false))
            .await
            .unwrap(),
    );

    // The evaluator's fail-open default lets the run persist immediately.
    assert_eq!(state.quality_score, Some(7));
    assert_eq!(state.revision_count, 1);
    assert_eq!(state.refinement_history.len(), 1);
    assert_eq!(
        state.back_translation.as_deref(),
        Some("Retrieval-augmented run.")
    );
}

#[tokio::test]
async fn empty_source_completes_without_writing() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new());
    let graph = build_graph(dir.path(), generator, None);

    let state = completed(graph.run(input("   \n  ", false, false)).await.unwrap());

    assert!(!state.needs_human_review);
    assert!(!chunk_path(dir.path(), "test_book", 0, 0).exists());
}

#[tokio::test]
async fn suspend_then_resume_with_edited_glossary() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new());
    let graph = build_graph(
        dir.path(),
        generator.clone(),
        Some(Stage::SearchAndConsolidate),
    );

    let outcome = graph
        .run(input("A neural network learns.", true, true))
        .await
        .unwrap();
    let thread_id = match outcome {
        RunOutcome::Suspended {
            thread_id,
            paused_after,
        } => {
            assert_eq!(paused_after, Stage::SearchAndConsolidate);
            thread_id
        }
        RunOutcome::Completed(_) => panic!("expected suspension at the review boundary"),
    };
    // No translation happened before the review boundary.
    assert_eq!(generator.calls_containing(prompts::FUSION_ROLE), 0);

    let edited = TermEntry {
        suggested_translation: "reseau neuronal".to_string(),
        human_reviewed: true,
        human_modified: true,
        original_suggested_translation: Some("neural network (translated)".to_string()),
        ..TermEntry::fallback("neural network", "reviewed")
    };
    let state = completed(
        graph
            .resume_with_patch(
                &thread_id,
                StatePatch {
                    glossary: Some(vec![edited]),
                },
            )
            .await
            .unwrap(),
    );

    assert_eq!(state.glossary.len(), 1);
    assert!(state.glossary[0].human_modified);

    let record =
        load_chunk_record(&chunk_path(dir.path(), "test_book", 0, 0)).unwrap();
    assert_eq!(record.glossary[0].suggested_translation, "reseau neuronal");
    // The edited rendering reached the translation prompt.
    let fusion_prompts: Vec<String> = generator
        .prompt_log()
        .into_iter()
        .filter(|p| p.contains(prompts::FUSION_ROLE))
        .collect();
    assert_eq!(fusion_prompts.len(), 1);
    assert!(fusion_prompts[0].contains("reseau neuronal"));
}

#[tokio::test]
async fn resume_without_checkpoint_is_an_error() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new());
    let graph = build_graph(dir.path(), generator, None);

    let err = graph.resume("never-started").await.unwrap_err();
    assert!(crate::graph::is_unknown_thread(&err));
}

#[tokio::test]
async fn plain_resume_continues_a_suspended_thread() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new());
    let graph = build_graph(
        dir.path(),
        generator,
        Some(Stage::SearchAndConsolidate),
    );

    let outcome = graph
        .run(input("A neural network learns.", true, true))
        .await
        .unwrap();
    let thread_id = match outcome {
        RunOutcome::Suspended { thread_id, .. } => thread_id,
        RunOutcome::Completed(_) => panic!("expected suspension"),
    };

    let state = completed(graph.resume(&thread_id).await.unwrap());
    // The machine suggestion survived untouched.
    assert_eq!(
        state.glossary[0].suggested_translation,
        "neural network (translated)"
    );
    assert!(state.combined_translation.is_some());

    // The checkpoint was dropped on completion.
    let err = graph.resume(&thread_id).await.unwrap_err();
    assert!(crate::graph::is_unknown_thread(&err));
}

#[tokio::test]
async fn orchestrator_translates_reviews_and_assembles() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::new());
    let graph = build_graph(dir.path(), generator, None);
    let orchestrator = BookOrchestrator::new(graph, Arc::new(AutoAcceptReviewer), true);

    let chapters = vec![
        ChapterSource {
            title: "Intro".to_string(),
            content: "A neural network learns weights.".to_string(),
        },
        ChapterSource {
            title: "Empty".to_string(),
            content: "   ".to_string(),
        },
    ];

    let reports = orchestrator.translate_book("mock_book", &chapters).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].chunks.len(), 1);
    assert!(reports[0].reviewed_terms > 0);
    assert!(reports[1].chunks.is_empty());

    // The reviewed glossary was pushed back into the persisted chunk.
    let record =
        load_chunk_record(&chunk_path(dir.path(), "mock_book", 0, 0)).unwrap();
    assert!(record.human_reviewed);
    assert!(record.glossary.iter().all(|t| t.human_reviewed));

    // The chapter markdown was assembled from the persisted translations.
    let assembled = reports[0].assembled_path.as_ref().unwrap();
    let text = std::fs::read_to_string(assembled).unwrap();
    assert_eq!(text, record.translation);

    // The long-lived glossary store remembers the reviewed terms.
    let store = crate::glossary::GlossaryStore::new(dir.path());
    assert!(!store.load().is_empty());

    // Cross-chunk memory recorded the chapter.
    let memory = crate::memory::MemoryStore::new(dir.path());
    assert_eq!(memory.chapter_memory("mock_book", 0).len(), 1);
}

#[tokio::test]
async fn quality_report_covers_persisted_chapter() {
    let dir = tempdir().unwrap();
    let generator = Arc::new(MockGenerator::with_scores(vec![8]));
    let graph = build_graph(dir.path(), generator, None);

    completed(
        graph
            .run(input("Layer 12 has 4.2 million parameters.", true, false))
            .await
            .unwrap(),
    );

    let report = crate::quality::evaluate_chapter(dir.path(), "test_book", 0).unwrap();
    assert_eq!(report.num_chunks, 1);
    assert!(report.average_score > 0.0);
}
