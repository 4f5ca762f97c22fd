use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use docqa_core::retry::{RetryPolicy, ServiceFailure};
use docqa_core::traits::Embedder;
use docqa_core::types::{Chunk, SimilarityMetric};
use docqa_core::Error;
use docqa_embed::HashEmbedder;
use docqa_vector::schema::{DOCSTORE_FILE, MANIFEST_FILE};
use docqa_vector::{build_index, index_exists, read_manifest, BuildOptions, VectorIndex};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        attempt_timeout: None,
    }
}

fn options(batch_size: usize, concurrency: usize) -> BuildOptions {
    BuildOptions {
        batch_size,
        concurrency,
        metric: SimilarityMetric::Cosine,
        retry: fast_retry(),
        show_progress: false,
    }
}

fn chunk(doc: &str, seq: usize, text: &str) -> Chunk {
    Chunk { document_id: doc.into(), sequence: seq, text: text.into(), metadata: Default::default() }
}

fn corpus() -> Vec<Chunk> {
    vec![
        chunk("a.txt", 0, "the lighthouse keeper lit the lamp every evening"),
        chunk("a.txt", 1, "storms battered the rocky coast all winter"),
        chunk("b.txt", 0, "the baker kneaded bread before dawn"),
        chunk("b.txt", 1, "fresh bread and pastries filled the shop window"),
        chunk("c.txt", 0, "the keeper of the lighthouse kept a logbook"),
    ]
}

/// Encodes the chunk sequence in the vector and finishes early batches last.
struct SlowFirstEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for SlowFirstEmbedder {
    fn model_id(&self) -> &str {
        "slow-first"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
        tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(call * 10))).await;
        Ok(texts.iter().map(|t| vec![t.parse::<f32>().unwrap_or(-1.0), 1.0]).collect())
    }
}

/// Fails transiently a fixed number of times, then embeds with a hash.
struct FlakyEmbedder {
    remaining_failures: AtomicUsize,
    inner: HashEmbedder,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceFailure> {
        let left = self.remaining_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.remaining_failures.store(left - 1, Ordering::SeqCst);
            return Err(ServiceFailure::transient("429 Too Many Requests"));
        }
        self.inner.embed_batch(texts).await
    }
}

/// Rejects any batch that contains the word "poison".
struct PoisonEmbedder;

#[async_trait]
impl Embedder for PoisonEmbedder {
    fn model_id(&self) -> &str {
        "poison"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceFailure> {
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(ServiceFailure::permanent("400 Bad Request"));
        }
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

/// Reports a fixed model id and dimension, and counts calls.
struct FixedEmbedder {
    model: &'static str,
    dim: usize,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_id(&self) -> &str {
        self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|_| vec![0.5; self.dim]).collect())
    }
}

#[tokio::test]
async fn out_of_order_batches_keep_chunk_identity() {
    let chunks: Vec<Chunk> = (0..8).map(|i| chunk("n.txt", i, &i.to_string())).collect();
    let embedder = SlowFirstEmbedder { calls: AtomicUsize::new(0) };
    let index = build_index(chunks.clone(), &embedder, &options(2, 4)).await.unwrap();

    assert_eq!(index.len(), 8);
    for (entry, original) in index.entries().iter().zip(&chunks) {
        assert_eq!(entry.chunk, *original);
        assert_eq!(entry.vector[0], original.sequence as f32);
    }
}

#[tokio::test]
async fn transient_failures_are_retried_during_build() {
    let embedder = FlakyEmbedder { remaining_failures: AtomicUsize::new(2), inner: HashEmbedder::new(32) };
    let index = build_index(corpus(), &embedder, &options(10, 1)).await.unwrap();
    assert_eq!(index.len(), 5);
    assert_eq!(index.dimension(), Some(32));
}

#[tokio::test]
async fn one_failed_batch_fails_the_whole_build() {
    let mut chunks = corpus();
    chunks.push(chunk("z.txt", 0, "poison pill"));
    let err = build_index(chunks, &PoisonEmbedder, &options(2, 2)).await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingService { attempts: 1, .. }), "{err:?}");
}

#[tokio::test]
async fn duplicate_chunk_ids_are_rejected() {
    let chunks = vec![chunk("a.txt", 0, "one"), chunk("a.txt", 0, "two")];
    let err = build_index(chunks, &HashEmbedder::new(8), &options(4, 1)).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn query_ranks_related_chunks_first() {
    let embedder = HashEmbedder::new(256);
    let index = build_index(corpus(), &embedder, &options(2, 2)).await.unwrap();
    let hits = index.query(&embedder, "who kept the lighthouse logbook", 2, &fast_retry()).await.unwrap();

    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score);
    let docs: Vec<&str> = hits.iter().map(|h| h.chunk.document_id.as_str()).collect();
    assert!(docs.contains(&"c.txt"), "{docs:?}");
    assert!(!docs.contains(&"b.txt"), "{docs:?}");
}

#[tokio::test]
async fn query_with_another_model_is_refused_without_embedding() {
    let index = build_index(corpus(), &HashEmbedder::new(16), &options(8, 1)).await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let other = FixedEmbedder { model: "text-embedding-3-small", dim: 16, calls: calls.clone() };

    let err = index.query(&other, "anything", 3, &fast_retry()).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn query_vector_of_wrong_width_is_a_dimension_mismatch() {
    let index = build_index(corpus(), &HashEmbedder::new(16), &options(8, 1)).await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let narrow = FixedEmbedder { model: "hash:d16", dim: 8, calls: calls.clone() };

    let err = index.query(&narrow, "anything", 3, &fast_retry()).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 16, actual: 8 }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn saved_index_loads_back_with_identical_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Documents.index");
    let embedder = HashEmbedder::new(64);
    let index = build_index(corpus(), &embedder, &options(2, 3)).await.unwrap();

    assert!(!index_exists(&path));
    index.save(&path).await.unwrap();
    assert!(index_exists(&path));

    let manifest = read_manifest(&path).unwrap();
    assert_eq!(manifest.embedding_model, "hash:d64");
    assert_eq!(manifest.count, 5);
    assert_eq!(manifest.dimension, Some(64));

    let loaded = VectorIndex::load(&path).await.unwrap();
    assert_eq!(loaded, index);
    let question = "fresh bread from the baker";
    let before = index.query(&embedder, question, 3, &fast_retry()).await.unwrap();
    let after = loaded.query(&embedder, question, 3, &fast_retry()).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_index_round_trips_and_answers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.index");
    let embedder = HashEmbedder::new(8);
    let index = build_index(Vec::new(), &embedder, &options(4, 1)).await.unwrap();
    index.save(&path).await.unwrap();

    let loaded = VectorIndex::load(&path).await.unwrap();
    assert!(loaded.is_empty());
    assert!(loaded.query(&embedder, "anything", 4, &fast_retry()).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn saving_over_an_existing_index_replaces_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Documents.index");
    let embedder = HashEmbedder::new(16);
    build_index(corpus(), &embedder, &options(8, 1)).await.unwrap().save(&path).await.unwrap();

    let smaller = build_index(corpus()[..2].to_vec(), &embedder, &options(8, 1)).await.unwrap();
    smaller.save(&path).await.unwrap();

    assert_eq!(VectorIndex::load(&path).await.unwrap().len(), 2);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|name| name != "Documents.index")
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_docstore_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Documents.index");
    build_index(corpus(), &HashEmbedder::new(16), &options(8, 1)).await.unwrap().save(&path).await.unwrap();

    let docstore = path.join(DOCSTORE_FILE);
    let edited = std::fs::read_to_string(&docstore).unwrap().replace("baker", "butcher");
    std::fs::write(&docstore, edited).unwrap();

    assert!(matches!(VectorIndex::load(&path).await.unwrap_err(), Error::Persistence { .. }));
}

#[tokio::test]
async fn missing_manifest_or_directory_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(VectorIndex::load(&dir.path().join("nope")).await.unwrap_err(), Error::Persistence { .. }));

    std::fs::write(dir.path().join(DOCSTORE_FILE), "[]").unwrap();
    assert!(!dir.path().join(MANIFEST_FILE).exists());
    assert!(matches!(VectorIndex::load(dir.path()).await.unwrap_err(), Error::Persistence { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_vectors_table_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Documents.index");
    build_index(corpus(), &HashEmbedder::new(16), &options(8, 1)).await.unwrap().save(&path).await.unwrap();

    for entry in std::fs::read_dir(&path).unwrap() {
        let entry = entry.unwrap();
        if entry.file_type().unwrap().is_dir() {
            std::fs::remove_dir_all(entry.path()).unwrap();
        }
    }
    assert!(matches!(VectorIndex::load(&path).await.unwrap_err(), Error::Persistence { .. }));
}
