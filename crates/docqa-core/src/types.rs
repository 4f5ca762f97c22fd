//! Domain types passed between the pipeline stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered so that serialized documents (and therefore token counts) are stable.
pub type Meta = BTreeMap<String, String>;

/// A source file loaded from the documents directory.
///
/// - `id`: the source path, as walked from the documents root
/// - `content`: the decoded text
/// - `metadata`: at least `source` and `extension`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: Meta,
}

/// Stable identity of a chunk: its document plus its position inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub document_id: String,
    pub sequence: usize,
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document_id, self.sequence)
    }
}

/// A bounded window of a document's text; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub sequence: usize,
    pub text: String,
    #[serde(default)]
    pub metadata: Meta,
}

impl Chunk {
    pub fn id(&self) -> ChunkId {
        ChunkId { document_id: self.document_id.clone(), sequence: self.sequence }
    }
}

/// A vector produced by the embedding service for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub chunk_id: ChunkId,
    pub vector: Vec<f32>,
}

/// Projected cost of embedding the current corpus. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    pub token_count: usize,
    pub projected_cost: f64,
}

impl CostEstimate {
    pub fn within(&self, budget: f64) -> bool {
        self.projected_cost <= budget
    }
}

/// A chunk returned by a similarity query. Higher `score` is more similar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// The product of one retrieval-augmented answer.
///
/// `retrieved_chunks` is ordered from most to least similar.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerResult {
    pub question: String,
    pub retrieved_chunks: Vec<RetrievedChunk>,
    pub answer_text: String,
}

/// Similarity used for nearest-neighbor ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    InnerProduct,
}

impl SimilarityMetric {
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self {
            Self::InnerProduct => dot,
            Self::Cosine => {
                let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
            }
        }
    }
}
