//! Thread-keyed checkpoint store for suspend/resume
//!
//! One JSON file per workflow thread under `{root}/checkpoints/`. Writes
//! replace the whole snapshot; the store does no locking (callers re-entering
//! the same thread must serialize themselves).

use crate::error::CheckpointError;
use crate::graph::Stage;
use crate::types::{StatePatch, WorkflowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// A suspended run: the full state snapshot plus the next stage to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: WorkflowState,
    pub cursor: Stage,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, thread_id: &str) -> PathBuf {
        let safe: String = thread_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join("checkpoints").join(format!("{safe}.json"))
    }

    /// Persist (or overwrite) the checkpoint for a thread.
    pub fn save(
        &self,
        thread_id: &str,
        state: &WorkflowState,
        cursor: Stage,
    ) -> Result<(), CheckpointError> {
        let checkpoint = Checkpoint {
            state: state.clone(),
            cursor,
            saved_at: Utc::now(),
        };
        let path = self.path(thread_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let text = serde_json::to_string_pretty(&checkpoint)?;
        fs::write(&path, text)?;
        debug!("checkpoint saved for thread {thread_id} at {:?}", cursor);
        Ok(())
    }

    /// Load the checkpoint for a thread, or `NotFound` if it was never
    /// suspended.
    pub fn load(&self, thread_id: &str) -> Result<Checkpoint, CheckpointError> {
        let path = self.path(thread_id);
        if !path.exists() {
            return Err(CheckpointError::NotFound(thread_id.to_string()));
        }
        let text = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Merge an external edit into the stored snapshot and write it back.
    /// The merge replaces listed fields wholesale, leaving everything else
    /// untouched.
    pub fn patch(
        &self,
        thread_id: &str,
        patch: &StatePatch,
    ) -> Result<Checkpoint, CheckpointError> {
        let mut checkpoint = self.load(thread_id)?;
        patch.apply(&mut checkpoint.state);
        self.save(thread_id, &checkpoint.state, checkpoint.cursor)?;
        Ok(checkpoint)
    }

    /// Drop a thread's checkpoint, typically after its run completed.
    pub fn remove(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let path = self.path(thread_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkInput, TermEntry};
    use tempfile::tempdir;

    fn state() -> WorkflowState {
        WorkflowState::new(ChunkInput {
            book_id: "bk".to_string(),
            chapter_id: 0,
            chunk_id: 1,
            source_text: "text".to_string(),
            thread_id: "ch0_ck1".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        store
            .save("ch0_ck1", &state(), Stage::TranslateFusion)
            .unwrap();
        let loaded = store.load("ch0_ck1").unwrap();
        assert_eq!(loaded.cursor, Stage::TranslateFusion);
        assert_eq!(loaded.state.thread_id, "ch0_ck1");
    }

    #[test]
    fn load_without_save_is_not_found() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert!(matches!(
            store.load("never-ran"),
            Err(CheckpointError::NotFound(_))
        ));
    }

    #[test]
    fn patch_replaces_glossary_and_persists() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        store
            .save("ch0_ck1", &state(), Stage::TranslateFusion)
            .unwrap();

        let patch = StatePatch {
            glossary: Some(vec![TermEntry::fallback("edited", "human")]),
        };
        let patched = store.patch("ch0_ck1", &patch).unwrap();
        assert_eq!(patched.state.glossary.len(), 1);

        // The edit survived the write-back.
        let reloaded = store.load("ch0_ck1").unwrap();
        assert_eq!(reloaded.state.glossary[0].src, "edited");
        assert_eq!(reloaded.cursor, Stage::TranslateFusion);
    }
}
