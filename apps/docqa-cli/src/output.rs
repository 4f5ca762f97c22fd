use std::fmt::Write;

use docqa_core::types::{AnswerResult, CostEstimate, RetrievedChunk};
use docqa_pipeline::IndexOrigin;

const PREVIEW_CHARS: usize = 200;

pub fn format_answer(result: &AnswerResult, origin: IndexOrigin) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Q: {}", result.question);
    let _ = writeln!(out, "A: {}", result.answer_text);
    let source = match origin {
        IndexOrigin::Loaded => "loaded index",
        IndexOrigin::Built => "new index",
    };
    let _ = write!(out, "\nSources ({source}):");
    for (i, hit) in result.retrieved_chunks.iter().enumerate() {
        let _ = write!(out, "\n  {}. {} (score {:.4})", i + 1, hit.chunk.id(), hit.score);
    }
    out
}

pub fn format_skipped(estimate: &CostEstimate, budget: f64) -> String {
    format!(
        "Skipped: projected embedding cost {:.4} for {} tokens exceeds the budget of {:.4}.",
        estimate.projected_cost, estimate.token_count, budget
    )
}

pub fn format_estimate(documents: usize, estimate: &CostEstimate, budget: f64) -> String {
    let verdict = if estimate.within(budget) { "within budget" } else { "over budget" };
    format!(
        "{documents} documents, {} tokens, projected cost {:.4} ({verdict}, budget {:.4})",
        estimate.token_count, estimate.projected_cost, budget
    )
}

pub fn format_hits(query: &str, hits: &[RetrievedChunk]) -> String {
    let mut out = format!("Found {} results for \"{query}\"", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let _ = write!(out, "\n\n  {}. score={:.4}  {}", i + 1, hit.score, hit.chunk.id());
        let _ = write!(out, "\n     {}", preview(&hit.chunk.text));
    }
    out
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
