//! Cost Estimator and the budget gate in front of any embedding work.

use tracing::debug;

use crate::config::CostSettings;
use crate::error::{Error, Result};
use crate::traits::TokenCounter;
use crate::types::{CostEstimate, Document};

pub struct CostEstimator<'a> {
    counter: &'a dyn TokenCounter,
    rate_per_thousand_tokens: f64,
}

impl<'a> CostEstimator<'a> {
    pub fn new(counter: &'a dyn TokenCounter, rate_per_thousand_tokens: f64) -> Self {
        Self { counter, rate_per_thousand_tokens }
    }

    pub fn from_settings(counter: &'a dyn TokenCounter, settings: &CostSettings) -> Self {
        Self::new(counter, settings.rate_per_thousand_tokens)
    }

    /// Tokenize the JSON form of every document and price the total.
    ///
    /// Documents are measured one by one and summed, so adding a document
    /// can never lower the count.
    pub fn estimate(&self, documents: &[Document]) -> Result<CostEstimate> {
        let mut token_count = 0usize;
        for doc in documents {
            let serialized = serde_json::to_string(doc)
                .map_err(|e| Error::Tokenization(format!("cannot serialize {}: {}", doc.id, e)))?;
            let tokens = self.counter.count_tokens(&serialized)?;
            debug!(document = %doc.id, tokens, "document measured");
            token_count += tokens;
        }
        let projected_cost = (token_count as f64 / 1000.0) * self.rate_per_thousand_tokens;
        Ok(CostEstimate { token_count, projected_cost })
    }
}
