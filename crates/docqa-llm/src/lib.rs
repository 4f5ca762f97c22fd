//! Language-model completion service.

use std::sync::Arc;

use docqa_core::config::Settings;
use docqa_core::traits::LanguageModel;
use docqa_core::Result;

mod openai;

pub use openai::OpenAiCompletion;

pub fn language_model_from_settings(settings: &Settings) -> Result<Arc<dyn LanguageModel>> {
    let model = OpenAiCompletion::new(settings.require_api_key()?, &settings.openai.base_url, &settings.completion)?;
    Ok(Arc::new(model))
}
