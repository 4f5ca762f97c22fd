//! Answering pipeline: ingest, cost gate, build-or-load the index, retrieve, answer.

mod pipeline;
mod prompt;
mod report;

pub use pipeline::Pipeline;
pub use prompt::compose_prompt;
pub use report::{IndexOrigin, RunOutcome, RunReport, Stage};
