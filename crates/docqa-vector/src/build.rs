//! Embedding a chunk set into a fresh [`VectorIndex`].

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use docqa_core::config::Settings;
use docqa_core::retry::{retry, RetryExhausted, RetryPolicy};
use docqa_core::traits::Embedder;
use docqa_core::types::{Chunk, ChunkId, Embedding, SimilarityMetric};
use docqa_core::{Error, Result};

use crate::index::VectorIndex;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub batch_size: usize,
    /// Embedding requests allowed in flight at once.
    pub concurrency: usize,
    pub metric: SimilarityMetric,
    pub retry: RetryPolicy,
    pub show_progress: bool,
}

impl BuildOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            batch_size: settings.embedding.batch_size,
            concurrency: settings.embedding.concurrency,
            metric: settings.index.metric,
            retry: RetryPolicy::from_settings(&settings.retry)
                .with_attempt_timeout(Duration::from_secs(settings.embedding.timeout_secs)),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Embed every chunk and collect the results into an index.
///
/// Batches are sent concurrently and may complete in any order; vectors are
/// matched back to their chunk by [`ChunkId`], and the index keeps the input
/// chunk order. Any batch that still fails after retries fails the whole
/// build and nothing is returned.
pub async fn build_index(chunks: Vec<Chunk>, embedder: &dyn Embedder, options: &BuildOptions) -> Result<VectorIndex> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for chunk in &chunks {
        let id = chunk.id();
        if !seen.insert(id.clone()) {
            return Err(Error::Config(format!("duplicate chunk id {id} in build input")));
        }
    }

    let batch_size = options.batch_size.max(1);
    let concurrency = options.concurrency.max(1);
    let batches: Vec<Vec<(ChunkId, String)>> = chunks
        .chunks(batch_size)
        .map(|batch| batch.iter().map(|c| (c.id(), c.text.clone())).collect())
        .collect();
    info!(
        chunks = chunks.len(),
        batches = batches.len(),
        concurrency,
        model = embedder.model_id(),
        "building vector index"
    );

    let start = Instant::now();
    let pb = progress_bar(chunks.len() as u64, options.show_progress);
    let mut vectors: HashMap<ChunkId, Vec<f32>> = HashMap::with_capacity(chunks.len());
    let mut pending = stream::iter(batches.into_iter().enumerate())
        .map(|(n, batch)| embed_batch(embedder, n, batch, &options.retry))
        .buffer_unordered(concurrency);
    while let Some(done) = pending.next().await {
        let embeddings = match done {
            Ok(embeddings) => embeddings,
            Err(e) => {
                pb.abandon_with_message("embedding failed");
                return Err(e);
            }
        };
        pb.inc(embeddings.len() as u64);
        for Embedding { chunk_id, vector } in embeddings {
            vectors.insert(chunk_id, vector);
        }
    }
    drop(pending);
    pb.finish_and_clear();

    let mut index = VectorIndex::new(embedder.model_id(), options.metric);
    for chunk in chunks {
        let id = chunk.id();
        let vector = vectors.remove(&id).ok_or_else(|| Error::EmbeddingService {
            attempts: 1,
            message: format!("no embedding returned for chunk {id}"),
        })?;
        index.insert(chunk, vector)?;
    }
    info!(
        entries = index.len(),
        dimension = index.dimension(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "vector index built"
    );
    Ok(index)
}

async fn embed_batch(
    embedder: &dyn Embedder,
    n: usize,
    batch: Vec<(ChunkId, String)>,
    policy: &RetryPolicy,
) -> Result<Vec<Embedding>> {
    let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
    let inputs = &texts;
    let label = format!("embed batch {n}");
    let vectors = retry(policy, &label, move || embedder.embed_batch(inputs))
        .await
        .map_err(RetryExhausted::into_embedding_error)?;
    if vectors.len() != batch.len() {
        return Err(Error::EmbeddingService {
            attempts: 1,
            message: format!("batch {n}: sent {} texts, received {} vectors", batch.len(), vectors.len()),
        });
    }
    debug!(batch = n, size = batch.len(), "batch embedded");
    Ok(batch
        .into_iter()
        .zip(vectors)
        .map(|((chunk_id, _), vector)| Embedding { chunk_id, vector })
        .collect())
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}
