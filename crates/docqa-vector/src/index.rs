//! In-memory exact nearest-neighbor index over chunk embeddings.

use tracing::debug;

use docqa_core::retry::{retry, RetryExhausted, RetryPolicy};
use docqa_core::traits::Embedder;
use docqa_core::types::{Chunk, RetrievedChunk, SimilarityMetric};
use docqa_core::{Error, Result};

/// A stored chunk and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Chunks plus their vectors, searched by brute force.
///
/// All vectors share one dimension, fixed by the first insert. The index
/// remembers which embedding model produced them so that queries made with a
/// different model are refused.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    model_id: String,
    metric: SimilarityMetric,
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(model_id: impl Into<String>, metric: SimilarityMetric) -> Self {
        Self { model_id: model_id.into(), metric, dimension: None, entries: Vec::new() }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// `None` until the first vector is inserted.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn insert(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(Error::DimensionMismatch { expected, actual: vector.len() });
            }
            None if vector.is_empty() => {
                return Err(Error::EmbeddingService { attempts: 1, message: "embedding service returned an empty vector".into() });
            }
            None => self.dimension = Some(vector.len()),
            _ => {}
        }
        self.entries.push(IndexEntry { chunk, vector });
        Ok(())
    }

    /// Rank every entry against `query` and keep the best `k`.
    ///
    /// Scores are sorted descending; equal scores keep insertion order.
    pub fn search_vector(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let Some(expected) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(Error::DimensionMismatch { expected, actual: query.len() });
        }
        // NaN ranks below every real score.
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let score = self.metric.score(query, &e.vector);
                (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();
        // sort_by is stable
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(i, score)| RetrievedChunk { chunk: self.entries[i].chunk.clone(), score })
            .collect())
    }

    /// Embed `question` and return its `k` nearest chunks.
    ///
    /// The embedder must report the same model id the index was built with;
    /// mixing models is a configuration error and no embedding call is made.
    pub async fn query(
        &self,
        embedder: &dyn Embedder,
        question: &str,
        k: usize,
        policy: &RetryPolicy,
    ) -> Result<Vec<RetrievedChunk>> {
        if embedder.model_id() != self.model_id {
            return Err(Error::Config(format!(
                "index was built with embedding model `{}` but the configured model is `{}`",
                self.model_id,
                embedder.model_id()
            )));
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let vector = retry(policy, "embed question", move || embedder.embed(question))
            .await
            .map_err(RetryExhausted::into_embedding_error)?;
        let hits = self.search_vector(&vector, k)?;
        debug!(k, hits = hits.len(), top = hits.first().map(|h| h.score), "similarity query");
        Ok(hits)
    }

    pub(crate) fn from_parts(
        model_id: String,
        metric: SimilarityMetric,
        dimension: Option<usize>,
        entries: Vec<IndexEntry>,
    ) -> Self {
        Self { model_id, metric, dimension, entries }
    }
}
