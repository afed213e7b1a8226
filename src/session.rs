//! One end-to-end run of the pipeline for a single input mesh.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::stage::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(String),
    Timeout,
}

/// Mutable run record: every component updates it as the run progresses.
/// Nothing persists across runs beyond the artifacts written to disk; a
/// restarted run starts over from the upload modal.
#[derive(Debug)]
pub struct RigSession {
    pub id: Uuid,
    /// Assigned by the service once the upload is accepted.
    pub character_id: Option<String>,
    pub stage: Stage,
    pub landmark_attempts: u32,
    pub outcome: Option<Outcome>,
    pub artifacts: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
}

impl RigSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            character_id: None,
            stage: Stage::Idle,
            landmark_attempts: 0,
            outcome: None,
            artifacts: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn confirm_stage(&mut self, stage: Stage) {
        info!(session = %self.id, ?stage, "stage confirmed");
        self.stage = stage;
    }

    pub fn record_artifact(&mut self, path: PathBuf) {
        self.artifacts.push(path);
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, Some(Outcome::Success))
    }
}

impl Default for RigSession {
    fn default() -> Self {
        Self::new()
    }
}
