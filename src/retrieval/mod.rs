// Retrieval engine
// Nearest-neighbor search over stored document chunks


use std::sync::Arc;
use tracing::debug;

use crate::Result;
use crate::database::Database;
use crate::database::sqlite::models::Chunk;
use crate::database::sqlite::queries::ChunkQueries;
use crate::providers::EmbeddingProvider;

pub const DEFAULT_SEARCH_LIMIT: usize = 3;

/// A chunk scored against a query vector
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Embeds queries and ranks stored chunks by L2 distance. Read-only; failed
/// provider calls propagate without retries here.
pub struct Retriever {
    database: Database,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    #[inline]
    pub fn new(database: Database, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { database, embedder }
    }

    /// Return the `k` chunks nearest to `query`, optionally restricted to
    /// chunks whose metadata title contains `title_filter`
    /// (case-insensitive). Results are ordered nearest first; ties keep
    /// insertion order.
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        title_filter: Option<&str>,
        k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let query_vector = self.embedder.embed_one(query).await?;

        let candidates = ChunkQueries::candidates(self.database.pool(), title_filter).await?;
        debug!(
            "Ranking {} candidate chunks for query (filter: {:?})",
            candidates.len(),
            title_filter
        );

        Ok(rank_nearest(&query_vector, candidates, k))
    }
}

/// Order chunks by ascending L2 distance to `query_vector`, stably, and
/// keep the first `k`
pub(crate) fn rank_nearest(query_vector: &[f32], candidates: Vec<Chunk>, k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|chunk| {
            let distance = l2_distance(query_vector, &chunk.vector());
            ScoredChunk { chunk, distance }
        })
        .collect();

    scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    scored.truncate(k);
    scored
}

/// Euclidean distance between two vectors. Trailing elements of the longer
/// vector are ignored; dimensionality is fixed at configuration time.
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let delta = x - y;
            delta * delta
        })
        .sum::<f32>()
        .sqrt()
}
