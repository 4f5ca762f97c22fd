//! On-disk form of a [`VectorIndex`].
//!
//! An index directory holds:
//! - `manifest.json`: format version, embedding model, metric, dimension,
//!   entry count and the BLAKE3 checksum of the docstore
//! - `docstore.json`: the chunks, keyed by their position in the index
//! - a LanceDB dataset with one `vectors` table (absent when the index is empty)
//!
//! Saving writes into a sibling staging directory and renames it into place,
//! so a reader never sees a half-written index at the target path.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use docqa_core::types::{Chunk, SimilarityMetric};
use docqa_core::{Error, Result};

use crate::index::{IndexEntry, VectorIndex};
use crate::schema::{DOCSTORE_FILE, FORMAT_VERSION, MANIFEST_FILE};
use crate::table::{open_db, read_vectors, write_vectors, VectorRow};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub metric: SimilarityMetric,
    pub dimension: Option<usize>,
    pub count: usize,
    pub created_at: DateTime<Utc>,
    pub docstore_blake3: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocstoreEntry {
    position: usize,
    chunk: Chunk,
}

/// Whether something is present at `path`. This is the only signal used to
/// choose between loading and rebuilding; contents are not compared with the
/// current documents.
pub fn index_exists(path: &Path) -> bool {
    path.exists()
}

pub fn read_manifest(path: &Path) -> Result<IndexManifest> {
    let file = path.join(MANIFEST_FILE);
    let raw = fs::read(&file).map_err(|e| Error::persistence(&file, e))?;
    serde_json::from_slice(&raw).map_err(|e| Error::persistence(&file, format!("malformed manifest: {e}")))
}

impl VectorIndex {
    /// Persist the index at `path`, replacing whatever is there.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| Error::persistence(&parent, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".docqa-index-")
            .tempdir_in(&parent)
            .map_err(|e| Error::persistence(&parent, format!("cannot create staging directory: {e}")))?;

        self.write_contents(staging.path()).await?;
        replace_dir(staging.path(), path, &parent)?;
        info!(path = %path.display(), entries = self.len(), "vector index saved");
        Ok(())
    }

    async fn write_contents(&self, dir: &Path) -> Result<()> {
        let entries: Vec<DocstoreEntry> = self
            .entries()
            .iter()
            .enumerate()
            .map(|(position, e)| DocstoreEntry { position, chunk: e.chunk.clone() })
            .collect();
        let docstore = serde_json::to_vec_pretty(&entries).map_err(|e| Error::persistence(dir, e))?;
        let docstore_path = dir.join(DOCSTORE_FILE);
        fs::write(&docstore_path, &docstore).map_err(|e| Error::persistence(&docstore_path, e))?;

        if let Some(dimension) = self.dimension() {
            let rows: Vec<VectorRow> = self
                .entries()
                .iter()
                .enumerate()
                .map(|(position, e)| VectorRow { position, chunk_id: e.chunk.id().to_string(), vector: e.vector.clone() })
                .collect();
            let conn = open_db(dir).await?;
            write_vectors(&conn, dir, &rows, dimension).await?;
        }

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedding_model: self.model_id().to_string(),
            metric: self.metric(),
            dimension: self.dimension(),
            count: self.len(),
            created_at: Utc::now(),
            docstore_blake3: blake3::hash(&docstore).to_hex().to_string(),
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = serde_json::to_vec_pretty(&manifest).map_err(|e| Error::persistence(&manifest_path, e))?;
        fs::write(&manifest_path, raw).map_err(|e| Error::persistence(&manifest_path, e))?;
        Ok(())
    }

    /// Load and validate an index saved by [`VectorIndex::save`].
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(Error::persistence(path, "not an index directory"));
        }
        let manifest = read_manifest(path)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::persistence(
                path,
                format!("unsupported index format {} (expected {FORMAT_VERSION})", manifest.format_version),
            ));
        }

        let docstore_path = path.join(DOCSTORE_FILE);
        let raw = fs::read(&docstore_path).map_err(|e| Error::persistence(&docstore_path, e))?;
        if blake3::hash(&raw).to_hex().as_str() != manifest.docstore_blake3 {
            return Err(Error::persistence(&docstore_path, "checksum does not match manifest"));
        }
        let docstore: Vec<DocstoreEntry> =
            serde_json::from_slice(&raw).map_err(|e| Error::persistence(&docstore_path, format!("malformed docstore: {e}")))?;
        if docstore.len() != manifest.count {
            return Err(Error::persistence(
                &docstore_path,
                format!("{} chunks stored, manifest says {}", docstore.len(), manifest.count),
            ));
        }
        if let Some(bad) = docstore.iter().enumerate().find(|(i, e)| e.position != *i) {
            return Err(Error::persistence(&docstore_path, format!("unexpected position {} at slot {}", bad.1.position, bad.0)));
        }

        let entries = match manifest.dimension {
            None if manifest.count == 0 => Vec::new(),
            None => return Err(Error::persistence(path, "manifest has entries but no dimension")),
            Some(dimension) => {
                let conn = open_db(path).await?;
                let mut rows = read_vectors(&conn, path, dimension).await?;
                if rows.len() != manifest.count {
                    return Err(Error::persistence(
                        path,
                        format!("{} vectors stored, manifest says {}", rows.len(), manifest.count),
                    ));
                }
                rows.sort_by_key(|r| r.position);
                let mut entries = Vec::with_capacity(rows.len());
                for (slot, (row, stored)) in rows.into_iter().zip(docstore).enumerate() {
                    let expected_id = stored.chunk.id().to_string();
                    if row.position != slot || row.chunk_id != expected_id {
                        return Err(Error::persistence(
                            path,
                            format!("vector row {} ({}) does not match chunk {expected_id}", row.position, row.chunk_id),
                        ));
                    }
                    if row.vector.len() != dimension {
                        return Err(Error::persistence(
                            path,
                            format!("vector for {expected_id} has dimension {}, expected {dimension}", row.vector.len()),
                        ));
                    }
                    entries.push(IndexEntry { chunk: stored.chunk, vector: row.vector });
                }
                entries
            }
        };
        debug!(path = %path.display(), entries = entries.len(), model = %manifest.embedding_model, "vector index loaded");
        Ok(VectorIndex::from_parts(manifest.embedding_model, manifest.metric, manifest.dimension, entries))
    }
}

/// Move `staging` to `target`. An existing target is set aside first and only
/// deleted once the new directory is in place.
fn replace_dir(staging: &Path, target: &Path, parent: &Path) -> Result<()> {
    if !target.exists() {
        return fs::rename(staging, target).map_err(|e| Error::persistence(target, e));
    }
    let graveyard = tempfile::Builder::new()
        .prefix(".docqa-index-old-")
        .tempdir_in(parent)
        .map_err(|e| Error::persistence(parent, e))?;
    let previous = graveyard.path().join("previous");
    fs::rename(target, &previous).map_err(|e| Error::persistence(target, format!("cannot move old index aside: {e}")))?;
    if let Err(e) = fs::rename(staging, target) {
        let _ = fs::rename(&previous, target);
        return Err(Error::persistence(target, e));
    }
    // dropping `graveyard` removes the old index
    Ok(())
}
