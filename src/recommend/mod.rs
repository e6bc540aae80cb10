// Recommendation engine
// Ranks unseen books against a user's taste vector, with a popularity
// fallback for users without a taste signal


use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::Result;
use crate::database::Database;
use crate::database::sqlite::models::Book;
use crate::database::sqlite::queries::{BookQueries, ChunkQueries, ReviewQueries};
use crate::retrieval::l2_distance;

pub const DEFAULT_RECOMMEND_LIMIT: usize = 5;

/// Reviews feeding the taste vector: most recent first, at most this many
const TASTE_REVIEW_CAP: i64 = 10;

/// Ratings below this carry no positive taste signal
const MIN_POSITIVE_RATING: i64 = 4;

/// Chunk candidates fetched per requested book, compensating for multiple
/// chunks of one book crowding the neighborhood
const CANDIDATE_FACTOR: usize = 3;

pub struct Recommender {
    database: Database,
}

impl Recommender {
    #[inline]
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Recommend up to `limit` books the user has not reviewed, best first.
    /// Personalized when the user has recent positive reviews with
    /// embeddings; otherwise ranked by average rating.
    #[inline]
    pub async fn recommend(&self, user_id: i64, limit: usize) -> Result<Vec<Book>> {
        let pool = self.database.pool();

        let qualifying = ReviewQueries::recent_positive_with_embedding(
            pool,
            user_id,
            MIN_POSITIVE_RATING,
            TASTE_REVIEW_CAP,
        )
        .await?;

        let excluded: HashSet<i64> = ReviewQueries::reviewed_book_ids(pool, user_id)
            .await?
            .into_iter()
            .collect();

        let vectors: Vec<Vec<f32>> = qualifying
            .iter()
            .filter_map(|review| review.vector())
            .collect();

        if vectors.is_empty() {
            debug!("No taste signal for user {}, using popularity fallback", user_id);
            return self.top_rated_fallback(&excluded, limit).await;
        }

        let taste = mean_vector(&vectors);
        self.nearest_books(&taste, &excluded, limit).await
    }

    async fn nearest_books(
        &self,
        taste: &[f32],
        excluded: &HashSet<i64>,
        limit: usize,
    ) -> Result<Vec<Book>> {
        let pool = self.database.pool();

        let excluded_ids: Vec<i64> = excluded.iter().copied().collect();
        let candidates = ChunkQueries::candidates_by_book_excluding(pool, &excluded_ids).await?;

        // Rank chunks by distance, over-fetching before the per-book dedup
        let mut scored: Vec<(i64, f32)> = candidates
            .iter()
            .filter_map(|chunk| {
                chunk
                    .book_id
                    .map(|book_id| (book_id, l2_distance(taste, &chunk.vector())))
            })
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(limit * CANDIDATE_FACTOR);

        // First occurrence wins: it is the book's nearest chunk
        let mut seen = HashSet::new();
        let mut book_ids = Vec::new();
        for (book_id, _) in scored {
            if seen.insert(book_id) {
                book_ids.push(book_id);
                if book_ids.len() == limit {
                    break;
                }
            }
        }

        debug!("Taste ranking produced {} candidate books", book_ids.len());

        let mut books = Vec::with_capacity(book_ids.len());
        for book_id in book_ids {
            if let Some(book) = BookQueries::get_by_id(pool, book_id).await? {
                books.push(book);
            }
        }

        Ok(books)
    }

    /// Cold start: every unseen book ranked by average rating, descending,
    /// with a randomized tie-break among equal averages
    async fn top_rated_fallback(
        &self,
        excluded: &HashSet<i64>,
        limit: usize,
    ) -> Result<Vec<Book>> {
        let pool = self.database.pool();

        let averages: HashMap<i64, f64> = ReviewQueries::average_ratings(pool)
            .await?
            .into_iter()
            .collect();

        let mut ranked: Vec<Book> = BookQueries::list_all(pool)
            .await?
            .into_iter()
            .filter(|book| !excluded.contains(&book.id))
            .collect();

        // Shuffle first; the stable sort then only orders by average, so
        // equal averages keep a random relative order
        ranked.shuffle(&mut rand::thread_rng());
        ranked.sort_by(|a, b| {
            let rating_a = averages.get(&a.id).copied().unwrap_or(0.0);
            let rating_b = averages.get(&b.id).copied().unwrap_or(0.0);
            rating_b.total_cmp(&rating_a)
        });

        ranked.truncate(limit);
        Ok(ranked)
    }
}

/// Element-wise arithmetic mean of equal-length vectors
pub(crate) fn mean_vector(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };

    let mut mean = vec![0.0; first.len()];
    for vector in vectors {
        for (slot, value) in mean.iter_mut().zip(vector.iter()) {
            *slot += value;
        }
    }

    let count = vectors.len() as f32;
    for slot in &mut mean {
        *slot /= count;
    }

    mean
}
