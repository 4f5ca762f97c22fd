use serde::Serialize;

use docqa_core::types::{AnswerResult, CostEstimate};

/// States a run passes through. `Skipped`, `Answered` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Init,
    Ingested,
    CostChecked,
    IndexReady,
    Skipped,
    Answered,
    Failed,
}

/// Whether the index used for retrieval came from disk or was built in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    Loaded,
    Built,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Answered { result: AnswerResult, origin: IndexOrigin },
    /// The projected cost exceeded the budget; nothing was embedded.
    Skipped { budget: f64 },
}

/// What a successful run did. Failed runs surface their error instead.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub stages: Vec<Stage>,
    pub estimate: CostEstimate,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn answer(&self) -> Option<&AnswerResult> {
        match &self.outcome {
            RunOutcome::Answered { result, .. } => Some(result),
            RunOutcome::Skipped { .. } => None,
        }
    }

    pub fn origin(&self) -> Option<IndexOrigin> {
        match self.outcome {
            RunOutcome::Answered { origin, .. } => Some(origin),
            RunOutcome::Skipped { .. } => None,
        }
    }
}
