//! Chunker: fixed-width character windows with overlap.
//!
//! A document of `n` characters yields windows starting at `0, step, 2*step, ...`
//! with `step = chunk_size - overlap`, stopping after the first window that
//! reaches the end of the text. Every window but the last is exactly
//! `chunk_size` characters, so each chunk after the first repeats precisely
//! `overlap` characters of its predecessor.

use crate::config::ChunkingSettings;
use crate::error::Result;
use crate::types::{Chunk, Document};

pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails with a configuration error unless `overlap < chunk_size`.
    pub fn new(settings: ChunkingSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { chunk_size: settings.chunk_size, overlap: settings.overlap })
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn split(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|doc| self.split_document(doc)).collect()
    }

    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        self.windows(&document.content)
            .into_iter()
            .enumerate()
            .map(|(sequence, text)| Chunk {
                document_id: document.id.clone(),
                sequence,
                text: text.to_string(),
                metadata: document.metadata.clone(),
            })
            .collect()
    }

    fn windows<'a>(&self, text: &'a str) -> Vec<&'a str> {
        // Byte offset of every char boundary, plus the end of the string.
        let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let chars = bounds.len() - 1;
        let step = self.chunk_size - self.overlap;

        let mut out = Vec::new();
        let mut start = 0usize;
        while start < chars {
            let end = (start + self.chunk_size).min(chars);
            out.push(&text[bounds[start]..bounds[end]]);
            if end == chars {
                break;
            }
            start += step;
        }
        out
    }
}

/// Rebuild a document's text from its chunks by dropping each repeated prefix.
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(&chunk.text);
        } else {
            out.extend(chunk.text.chars().skip(overlap));
        }
    }
    out
}
