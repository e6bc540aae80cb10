// Review mutations and the cached AI review summary
// Any review create or delete invalidates the owning book's cached summary
// within the same transaction; the summary itself is regenerated lazily

#[cfg(test)]
mod tests;

use anyhow::anyhow;
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::Database;
use crate::database::sqlite::models::{NewReview, Review};
use crate::database::sqlite::queries::{BookQueries, ReviewQueries};
use crate::providers::{EmbeddingProvider, LanguageModel};
use crate::{BookragError, Result};

/// Returned when a book has no reviews with text; the model is not invoked
/// and the cache is left untouched
pub const NO_REVIEWS_PLACEHOLDER: &str = "There are no reviews for this book yet.";

pub struct ReviewSummarizer {
    database: Database,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModel>,
}

impl ReviewSummarizer {
    #[inline]
    pub fn new(
        database: Database,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            database,
            embedder,
            llm,
        }
    }

    /// Create a review for a book. The review text, when present, is
    /// embedded once at creation for the recommendation engine; the insert
    /// and the summary-cache invalidation commit as one unit.
    #[inline]
    pub async fn create_review(
        &self,
        book_id: i64,
        user_id: i64,
        review_text: Option<String>,
        rating: i64,
    ) -> Result<Review> {
        if !(1..=5).contains(&rating) {
            return Err(BookragError::Other(anyhow!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }

        let pool = self.database.pool();
        if BookQueries::get_by_id(pool, book_id).await?.is_none() {
            return Err(BookragError::NotFound(format!("book {book_id}")));
        }

        let text = review_text.filter(|text| !text.trim().is_empty());
        let embedding = match &text {
            Some(text) => Some(self.embedder.embed_one(text).await?),
            None => None,
        };

        let review = ReviewQueries::create(
            pool,
            NewReview {
                book_id,
                user_id,
                review_text: text,
                rating,
                embedding,
            },
        )
        .await?;

        info!("Created review {} for book {}", review.id, book_id);
        Ok(review)
    }

    /// Delete a review, invalidating the book's cached summary in the same
    /// transaction
    #[inline]
    pub async fn delete_review(&self, review_id: i64) -> Result<()> {
        let deleted = ReviewQueries::delete(self.database.pool(), review_id).await?;
        if !deleted {
            return Err(BookragError::NotFound(format!("review {review_id}")));
        }

        info!("Deleted review {}", review_id);
        Ok(())
    }

    /// Lazy summary read: return the cached summary when it is still valid,
    /// otherwise generate from the book's review texts and persist before
    /// returning
    #[inline]
    pub async fn summary(&self, book_id: i64) -> Result<String> {
        let pool = self.database.pool();

        let Some(book) = BookQueries::get_by_id(pool, book_id).await? else {
            return Err(BookragError::NotFound(format!("book {book_id}")));
        };

        if let Some(cached) = book.ai_review_summary {
            debug!("Serving cached review summary for book {}", book_id);
            return Ok(cached);
        }

        let texts = ReviewQueries::texts_for_book(pool, book_id).await?;
        if texts.is_empty() {
            return Ok(NO_REVIEWS_PLACEHOLDER.to_string());
        }

        let summary = self
            .llm
            .complete(&review_summary_prompt(&texts))
            .await?
            .trim()
            .to_string();

        BookQueries::set_ai_review_summary(pool, book_id, &summary).await?;
        info!("Cached review summary for book {}", book_id);

        Ok(summary)
    }
}

fn review_summary_prompt(texts: &[String]) -> String {
    let reviews = texts.iter().map(|text| format!("- {}", text)).join("\n");
    format!(
        "Summarize the general sentiment and key points from the following book \
         reviews:\n\n{}",
        reviews
    )
}
