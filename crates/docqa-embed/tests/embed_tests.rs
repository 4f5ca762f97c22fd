use std::fs;

use docqa_core::config::{Config, Settings};
use docqa_core::traits::{Embedder, TokenCounter};
use docqa_core::Error;
use docqa_embed::tokenize::tokenizer_family;
use docqa_embed::{embedder_from_settings, resolve_model_dir, HashEmbedder, HfTokenCounter};

/// Word-level vocabulary with a whitespace pre-tokenizer; every word is one token.
const WORD_TOKENIZER: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": { "type": "Whitespace" },
  "post_processor": null,
  "decoder": null,
  "model": { "type": "WordLevel", "vocab": { "[UNK]": 0, "hello": 1, "world": 2 }, "unk_token": "[UNK]" }
}"#;

#[tokio::test]
async fn hash_embedder_shapes_and_determinism() {
    let settings = Config::from_toml_str("[embedding]\nprovider = \"hash\"\nhash_dim = 64\n").settings().expect("settings");
    let embedder = embedder_from_settings(&settings).expect("embedder");
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).await.expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 64);
    assert_eq!(embedder.model_id(), "hash:d64");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn hash_embedder_ranks_shared_words_higher() {
    let e = HashEmbedder::new(256);
    let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let q = e.embed_text("who is the captain of the ship");
    let near = e.embed_text("The captain paced the deck of his ship.");
    let far = e.embed_text("Bananas are rich in potassium.");
    assert!(dot(&q, &near) > dot(&q, &far));
}

#[test]
fn openai_provider_without_key_is_config_error() {
    let err = embedder_from_settings(&Settings::default()).err().expect("missing key rejected");
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn word_level_tokenizer_counts_tokens() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("words.json");
    fs::write(&path, WORD_TOKENIZER).unwrap();

    let counter = HfTokenCounter::from_file("words", &path).expect("load tokenizer");
    assert_eq!(counter.family(), "words");
    assert_eq!(counter.count_tokens("hello world").unwrap(), 2);
    assert_eq!(counter.count_tokens("hello, unknown world!").unwrap(), 5);
    assert_eq!(counter.count_tokens("").unwrap(), 0);
}

#[test]
fn tokenizer_truncation_does_not_cap_the_count() {
    let capped = WORD_TOKENIZER.replace(
        r#""truncation": null"#,
        r#""truncation": { "direction": "Right", "max_length": 2, "strategy": "LongestFirst", "stride": 0 }"#,
    );
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("tokenizer.json");
    fs::write(&path, capped).unwrap();

    let counter = HfTokenCounter::from_file("capped", &path).expect("load tokenizer");
    assert_eq!(counter.count_tokens("hello world hello world hello world").unwrap(), 6);
}

#[test]
fn tokenizer_resolved_from_family_directory() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("cl100k_base.json"), WORD_TOKENIZER).unwrap();
    let mut settings = Settings::default();
    settings.cost.tokenizer_dir = tmp.path().to_string_lossy().into_owned();

    let counter = HfTokenCounter::for_settings(&settings).expect("tokenizer for ada-002");
    assert_eq!(counter.family(), "cl100k_base");
}

#[test]
fn explicit_tokenizer_file_overrides_family() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bge-m3.json");
    fs::write(&path, WORD_TOKENIZER).unwrap();
    let mut settings = Settings::default();
    settings.cost.tokenizer_file = Some(path.to_string_lossy().into_owned());

    let counter = HfTokenCounter::for_settings(&settings).expect("explicit tokenizer");
    assert_eq!(counter.family(), "bge-m3");
}

#[test]
fn missing_tokenizer_is_tokenization_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = HfTokenCounter::from_file("cl100k_base", &tmp.path().join("absent.json")).err().expect("missing file");
    assert!(matches!(err, Error::Tokenization(_)), "got {err:?}");
}

#[test]
fn openai_embedding_models_map_to_cl100k() {
    assert_eq!(tokenizer_family("text-embedding-ada-002"), Some("cl100k_base"));
    assert_eq!(tokenizer_family("text-embedding-3-small"), Some("cl100k_base"));
    assert_eq!(tokenizer_family("nomic-embed-text"), None);
}

#[test]
fn model_dir_comes_from_settings_only() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_str().unwrap();
    assert_eq!(resolve_model_dir(Some(dir), "BAAI/bge-m3").unwrap(), tmp.path());

    let missing = tmp.path().join("absent");
    let err = resolve_model_dir(missing.to_str(), "BAAI/bge-m3").unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");

    // Without a setting only models/<name> relative to the working directory is consulted.
    let err = resolve_model_dir(None, "org/no-such-model-here").unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}
