use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use docqa_core::chunker::Chunker;
use docqa_core::config::Settings;
use docqa_core::cost::CostEstimator;
use docqa_core::retry::{retry, RetryExhausted, RetryPolicy};
use docqa_core::source::DocumentSource;
use docqa_core::traits::{Embedder, LanguageModel, TokenCounter};
use docqa_core::types::{AnswerResult, CostEstimate, Document};
use docqa_core::{Error, Result};
use docqa_embed::{embedder_from_settings, HfTokenCounter};
use docqa_llm::language_model_from_settings;
use docqa_vector::{build_index, index_exists, BuildOptions, VectorIndex};

use crate::prompt::compose_prompt;
use crate::report::{IndexOrigin, RunOutcome, RunReport, Stage};

/// One end-to-end question answering run over the configured corpus.
///
/// The pipeline owns no mutable state; each [`Pipeline::run`] re-reads the
/// documents and either loads the index at `index.path` or builds and saves
/// it. Whether to load is decided only by the path existing, so an index
/// built from an older document set is reused as is.
///
/// Nothing guards the index path against a concurrent run; callers that
/// share a path must serialize runs themselves.
pub struct Pipeline {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    language_model: Arc<dyn LanguageModel>,
    token_counter: Arc<dyn TokenCounter>,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        language_model: Arc<dyn LanguageModel>,
        token_counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self { settings, embedder, language_model, token_counter, show_progress: false }
    }

    /// Validate `settings` and construct every service it names.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let token_counter: Arc<dyn TokenCounter> = Arc::new(HfTokenCounter::for_settings(&settings)?);
        let embedder = embedder_from_settings(&settings)?;
        let language_model = language_model_from_settings(&settings)?;
        Ok(Self::new(settings, embedder, language_model, token_counter))
    }

    /// Show an embedding progress bar on stderr while building.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn run(&self, question: &str) -> Result<RunReport> {
        let mut stages = vec![Stage::Init];
        let outcome = self.run_stages(question, &mut stages).await;
        if let Err(e) = &outcome {
            stages.push(Stage::Failed);
            error!(error = %e, stages = ?stages, "pipeline failed");
        }
        outcome
    }

    async fn run_stages(&self, question: &str, stages: &mut Vec<Stage>) -> Result<RunReport> {
        let start = Instant::now();
        let documents = self.ingest()?;
        stages.push(Stage::Ingested);

        let estimate = self.estimate(&documents)?;
        stages.push(Stage::CostChecked);
        let budget = self.settings.cost.budget;
        if !estimate.within(budget) {
            stages.push(Stage::Skipped);
            warn!(
                tokens = estimate.token_count,
                cost = estimate.projected_cost,
                budget,
                "projected embedding cost exceeds budget, skipping"
            );
            return Ok(RunReport { stages: stages.clone(), estimate, outcome: RunOutcome::Skipped { budget } });
        }

        let (index, origin) = self.prepare_index(&documents).await?;
        stages.push(Stage::IndexReady);

        let result = self.answer(&index, question).await?;
        stages.push(Stage::Answered);
        info!(
            ?origin,
            retrieved = result.retrieved_chunks.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "question answered"
        );
        Ok(RunReport { stages: stages.clone(), estimate, outcome: RunOutcome::Answered { result, origin } })
    }

    pub fn ingest(&self) -> Result<Vec<Document>> {
        DocumentSource::new(self.settings.documents_dir(), &self.settings.documents.extensions).load()
    }

    pub fn estimate(&self, documents: &[Document]) -> Result<CostEstimate> {
        let estimate = CostEstimator::from_settings(self.token_counter.as_ref(), &self.settings.cost).estimate(documents)?;
        info!(
            documents = documents.len(),
            tokens = estimate.token_count,
            cost = estimate.projected_cost,
            budget = self.settings.cost.budget,
            tokenizer = self.token_counter.family(),
            "embedding cost estimated"
        );
        Ok(estimate)
    }

    /// Load the persisted index if the path exists, otherwise chunk, embed and save.
    pub async fn prepare_index(&self, documents: &[Document]) -> Result<(VectorIndex, IndexOrigin)> {
        let path = self.index_path();
        if index_exists(&path) {
            let index = VectorIndex::load(&path).await?;
            info!(path = %path.display(), entries = index.len(), "loaded existing index");
            return Ok((index, IndexOrigin::Loaded));
        }

        let chunks = Chunker::new(self.settings.chunking)?.split(documents);
        info!(documents = documents.len(), chunks = chunks.len(), "documents chunked");
        let options = BuildOptions::from_settings(&self.settings).with_progress(self.show_progress);
        let index = build_index(chunks, self.embedder.as_ref(), &options).await?;
        index.save(&path).await?;
        Ok((index, IndexOrigin::Built))
    }

    /// Retrieve the `k` nearest chunks for `question` and ask the language model.
    pub async fn answer(&self, index: &VectorIndex, question: &str) -> Result<AnswerResult> {
        let retrieved = index.query(self.embedder.as_ref(), question, self.settings.index.k, &self.retry_policy()).await?;
        let prompt = compose_prompt(question, &retrieved);

        let model = self.language_model.as_ref();
        let policy = RetryPolicy::from_settings(&self.settings.retry)
            .with_attempt_timeout(Duration::from_secs(self.settings.completion.timeout_secs));
        let prompt_ref = prompt.as_str();
        let answer = retry(&policy, "complete", move || model.complete(prompt_ref))
            .await
            .map_err(RetryExhausted::into_language_model_error)?;
        let answer_text = answer.trim().to_string();
        if answer_text.is_empty() {
            return Err(Error::LanguageModel { attempts: 1, message: "language model returned an empty answer".into() });
        }
        Ok(AnswerResult { question: question.to_string(), retrieved_chunks: retrieved, answer_text })
    }

    pub fn index_path(&self) -> PathBuf {
        self.settings.index_path()
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_settings(&self.settings.retry)
            .with_attempt_timeout(Duration::from_secs(self.settings.embedding.timeout_secs))
    }
}
