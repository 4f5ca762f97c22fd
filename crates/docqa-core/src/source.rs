//! Document Source: walks a directory and loads files with recognized extensions.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::{Document, Meta};

pub struct DocumentSource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DocumentSource {
    /// `extensions` may be given with or without a leading dot; matching ignores case.
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { root: root.into(), extensions }
    }

    /// Load every recognized file under the root, recursively, in path order.
    pub fn load(&self) -> Result<Vec<Document>> {
        let meta = fs::metadata(&self.root).map_err(|e| Error::ingest(&self.root, e))?;
        if !meta.is_dir() {
            return Err(Error::ingest(&self.root, "not a directory"));
        }

        let mut documents = Vec::new();
        let mut skipped = 0usize;
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                Error::ingest(path, e)
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Some(extension) = self.recognized_extension(path) else {
                skipped += 1;
                continue;
            };
            documents.push(self.read_document(path, extension)?);
        }
        info!(root = %self.root.display(), loaded = documents.len(), skipped, "documents loaded");
        Ok(documents)
    }

    fn recognized_extension(&self, path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.extensions.contains(&ext).then_some(ext)
    }

    fn read_document(&self, path: &Path, extension: String) -> Result<Document> {
        let bytes = fs::read(path).map_err(|e| Error::ingest(path, e))?;
        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %path.display(), "file is not valid UTF-8, decoding lossily");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        let id = path.to_string_lossy().into_owned();
        let mut metadata = Meta::new();
        metadata.insert("source".to_string(), id.clone());
        metadata.insert("extension".to_string(), extension);
        Ok(Document { id, content, metadata })
    }
}
