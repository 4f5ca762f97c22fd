use std::fs;
use std::io::Write;
use tempfile::TempDir;

use docqa_core::chunker::{reassemble, Chunker};
use docqa_core::config::ChunkingSettings;
use docqa_core::source::DocumentSource;
use docqa_core::Error;

fn txt() -> Vec<String> {
    vec!["txt".to_string()]
}

#[test]
fn load_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let file_path = dir.join("a.txt");
    let mut f = fs::File::create(&file_path).unwrap();
    writeln!(f, "Short text").unwrap();

    let docs = DocumentSource::new(dir, &txt()).load().expect("load");

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].content.trim(), "Short text");
    assert_eq!(docs[0].id, file_path.to_string_lossy());
    assert_eq!(docs[0].metadata.get("source"), Some(&docs[0].id));
    assert_eq!(docs[0].metadata.get("extension").map(String::as_str), Some("txt"));
}

#[test]
fn load_is_recursive_sorted_and_skips_unrecognized() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("nested/deeper")).unwrap();
    fs::write(dir.join("b.txt"), "bravo").unwrap();
    fs::write(dir.join("a.TXT"), "alpha").unwrap();
    fs::write(dir.join("notes.md"), "ignored").unwrap();
    fs::write(dir.join("nested/deeper/c.txt"), "charlie").unwrap();
    fs::write(dir.join("nested/data.csv"), "x,y").unwrap();

    let docs = DocumentSource::new(dir, &txt()).load().expect("load");
    let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();

    assert_eq!(contents, vec!["alpha", "bravo", "charlie"]);
}

#[test]
fn extensions_accept_leading_dot() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.md"), "markdown").unwrap();
    fs::write(tmp.path().join("b.txt"), "text").unwrap();

    let docs = DocumentSource::new(tmp.path(), &[".md".to_string()]).load().expect("load");

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].content, "markdown");
}

#[test]
fn invalid_utf8_is_decoded_lossily() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("bin.txt"), [b'o', b'k', 0xff, b'!']).unwrap();

    let docs = DocumentSource::new(tmp.path(), &txt()).load().expect("load");

    assert_eq!(docs[0].content, "ok\u{fffd}!");
}

#[test]
fn missing_directory_is_ingest_error() {
    let tmp = TempDir::new().unwrap();
    let err = DocumentSource::new(tmp.path().join("nope"), &txt()).load().unwrap_err();
    assert!(matches!(err, Error::Ingest { .. }), "got {err:?}");
}

#[test]
fn file_instead_of_directory_is_ingest_error() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("a.txt");
    fs::write(&file, "x").unwrap();
    let err = DocumentSource::new(&file, &txt()).load().unwrap_err();
    assert!(matches!(err, Error::Ingest { .. }), "got {err:?}");
}

#[test]
fn chunks_of_loaded_corpus_reassemble_per_document() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("one.txt"), "It was a bright cold day in April, and the clocks were striking thirteen.").unwrap();
    fs::write(tmp.path().join("two.txt"), "Call me Ishmael.").unwrap();
    fs::write(tmp.path().join("empty.txt"), "").unwrap();
    let docs = DocumentSource::new(tmp.path(), &txt()).load().expect("load");

    let chunker = Chunker::new(ChunkingSettings { chunk_size: 16, overlap: 5 }).expect("chunker");
    let chunks = chunker.split(&docs);

    for doc in &docs {
        let own: Vec<_> = chunks.iter().filter(|c| c.document_id == doc.id).cloned().collect();
        assert_eq!(reassemble(&own, chunker.overlap()), doc.content);
        for (i, c) in own.iter().enumerate() {
            assert_eq!(c.sequence, i);
            assert!(c.text.chars().count() <= 16);
        }
    }
    assert!(chunks.iter().all(|c| !c.document_id.ends_with("empty.txt")));
}

#[test]
fn invalid_overlap_is_config_error() {
    let err = Chunker::new(ChunkingSettings { chunk_size: 8, overlap: 9 }).err().expect("rejected");
    assert!(matches!(err, Error::Config(_)));
}
