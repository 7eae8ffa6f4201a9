//! Ephemeral, named collections of chunk vectors with cosine ranking.
//!
//! A collection lives for one pipeline run and is cleared explicitly by the
//! caller afterwards. The index itself is an owned value, so each
//! coordinator (and each test) has its own backing store.

use crate::embeddings::{cosine_similarity, Embedder, HashedBagOfWordsEmbedder};
use crate::models::Chunk;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

pub struct SimilarityIndex<E = HashedBagOfWordsEmbedder> {
    embedder: E,
    collections: RwLock<HashMap<String, Vec<IndexedChunk>>>,
}

impl Default for SimilarityIndex {
    fn default() -> Self {
        Self::new(HashedBagOfWordsEmbedder::default())
    }
}

impl<E: Embedder> SimilarityIndex<E> {
    pub fn new(embedder: E) -> Self {
        Self {
            embedder,
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_chunks(&self, collection: &str, chunks: &[Chunk]) {
        let indexed = chunks
            .iter()
            .map(|chunk| IndexedChunk {
                vector: self.embedder.embed(&chunk.text),
                chunk: chunk.clone(),
            })
            .collect::<Vec<_>>();

        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(indexed);
    }

    /// Returns at most `top_k` chunks ordered by descending cosine score.
    pub fn search(&self, collection: &str, query: &str, top_k: usize) -> Vec<ScoredChunk> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(stored) = collections.get(collection) else {
            return Vec::new();
        };
        if stored.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let query_vector = self.embedder.embed(query);
        let mut scored = stored
            .iter()
            .map(|item| ScoredChunk {
                chunk: item.chunk.clone(),
                score: cosine_similarity(&query_vector, &item.vector),
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        scored
    }

    pub fn clear_collection(&self, collection: &str) {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(collection);
    }

    pub fn collection_len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub fn collection_count(&self) -> usize {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
