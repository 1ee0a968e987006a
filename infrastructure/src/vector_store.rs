use crate::search::SearchEngine;
use domain::error::RagError;
use domain::models::{EmbeddedChunk, ScoredChunk};
use shared::types::Result;
use std::collections::HashSet;

/// In-memory store of chunk vectors. Exact scan, lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    entries: Vec<EmbeddedChunk>,
    ids: HashSet<String>,
    dimension: Option<usize>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<EmbeddedChunk>) -> Result<Self> {
        let mut store = Self::new();
        store.add(entries)?;
        Ok(store)
    }

    /// Insert entries. All-or-nothing: on error the store is unchanged.
    pub fn add(&mut self, entries: Vec<EmbeddedChunk>) -> Result<()> {
        let mut dimension = self.dimension;
        let mut batch_ids = HashSet::with_capacity(entries.len());
        for entry in &entries {
            let actual = entry.vector.len();
            match dimension {
                Some(expected) if expected != actual => {
                    return Err(RagError::DimensionMismatch { expected, actual }.into());
                }
                None => dimension = Some(actual),
                _ => {}
            }
            if self.ids.contains(&entry.chunk.id) || !batch_ids.insert(entry.chunk.id.clone()) {
                return Err(RagError::DuplicateChunk(entry.chunk.id.clone()).into());
            }
        }

        self.dimension = dimension;
        self.ids.extend(batch_ids);
        self.entries.extend(entries);
        Ok(())
    }

    /// The `k` most similar chunks, best first. Fewer when the store is smaller.
    pub fn similarity_search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if let Some(expected) = self.dimension {
            if expected != query_embedding.len() {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query_embedding.len(),
                }
                .into());
            }
        }
        Ok(SearchEngine::rank(query_embedding, &self.entries, k)
            .into_iter()
            .map(|(idx, score)| ScoredChunk {
                chunk: self.entries[idx].chunk.clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn entries(&self) -> &[EmbeddedChunk] {
        &self.entries
    }
}
