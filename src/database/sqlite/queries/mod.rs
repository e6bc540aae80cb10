
use super::models::{
    Book, Chunk, Document, DocumentStatus, NewBook, NewChunk, NewDocument, NewReview, Review,
    vec_to_blob,
};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

pub struct BookQueries;

impl BookQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_book: NewBook) -> Result<Book> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO books (title, author, genre, year_published, created_date) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&new_book.title)
        .bind(&new_book.author)
        .bind(&new_book.genre)
        .bind(new_book.year_published)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create book")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created book"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Book>> {
        let result = sqlx::query_as::<_, Book>(
            r#"
            SELECT id,
                   title,
                   author,
                   genre,
                   year_published,
                   summary,
                   ai_review_summary,
                   created_date
            FROM books WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get book by id")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT id,
                   title,
                   author,
                   genre,
                   year_published,
                   summary,
                   ai_review_summary,
                   created_date
            FROM books ORDER BY created_date DESC, id DESC
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list all books")?;

        Ok(books)
    }

    /// List books matching optional case-insensitive substring filters on
    /// genre and author, capped at `limit` rows
    #[inline]
    pub async fn list_filtered(
        pool: &SqlitePool,
        genre: Option<&str>,
        author: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Book>> {
        let mut query_str = String::from(
            r#"
            SELECT id,
                   title,
                   author,
                   genre,
                   year_published,
                   summary,
                   ai_review_summary,
                   created_date
            FROM books
            "#,
        );

        let mut conditions = Vec::new();
        let mut patterns = Vec::new();

        if let Some(genre) = genre {
            conditions.push("genre LIKE ?");
            patterns.push(format!("%{}%", genre));
        }

        if let Some(author) = author {
            conditions.push("author LIKE ?");
            patterns.push(format!("%{}%", author));
        }

        if !conditions.is_empty() {
            query_str.push_str(" WHERE ");
            query_str.push_str(&conditions.join(" AND "));
        }

        query_str.push_str(" ORDER BY title ASC LIMIT ?");

        let mut query = sqlx::query_as::<_, Book>(&query_str);
        for pattern in &patterns {
            query = query.bind(pattern);
        }
        query = query.bind(limit.max(0));

        let books = query
            .fetch_all(pool)
            .await
            .context("Failed to list filtered books")?;

        Ok(books)
    }

    #[inline]
    pub async fn set_summary(pool: &SqlitePool, id: i64, summary: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE books SET summary = ? WHERE id = ?")
            .bind(summary)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to set book summary")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn set_ai_review_summary(pool: &SqlitePool, id: i64, summary: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE books SET ai_review_summary = ? WHERE id = ?")
            .bind(summary)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to set AI review summary")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete book")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            r#"
            INSERT INTO documents (book_id, filename, file_path, status, upload_date)
            VALUES (?, ?, ?, 'uploaded', ?)
            "#,
        )
        .bind(new_document.book_id)
        .bind(&new_document.filename)
        .bind(&new_document.file_path)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create document")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
        let result = sqlx::query_as::<_, Document>(
            r#"
            SELECT id,
                   book_id,
                   filename,
                   file_path,
                   status,
                   upload_date
            FROM documents WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by id")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            r#"
            SELECT id,
                   book_id,
                   filename,
                   file_path,
                   status,
                   upload_date
            FROM documents ORDER BY upload_date DESC, id DESC
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list all documents")?;

        Ok(documents)
    }

    #[inline]
    pub async fn update_status(
        pool: &SqlitePool,
        id: i64,
        status: DocumentStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to update document status")?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct ChunkQueries;

impl ChunkQueries {
    /// Insert all chunks of one ingestion attempt and flip the owning
    /// document to `ready` in a single transaction, so a concurrent reader
    /// never observes `ready` alongside a partial chunk set.
    #[inline]
    pub async fn insert_batch_marking_ready(
        pool: &SqlitePool,
        document_id: i64,
        chunks: Vec<NewChunk>,
    ) -> Result<usize> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for chunk batch insert")?;

        let mut inserted = 0;

        for chunk in &chunks {
            let blob = vec_to_blob(&chunk.embedding);
            sqlx::query(
                r#"
                INSERT INTO document_chunks (document_id, chunk_index, content, book_id, title, author, genre, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.metadata.book_id)
            .bind(&chunk.metadata.title)
            .bind(&chunk.metadata.author)
            .bind(&chunk.metadata.genre)
            .bind(blob)
            .execute(&mut *transaction)
            .await
            .context("Failed to insert chunk in batch")?;

            inserted += 1;
        }

        sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(DocumentStatus::Ready)
            .bind(document_id)
            .execute(&mut *transaction)
            .await
            .context("Failed to mark document ready")?;

        transaction
            .commit()
            .await
            .context("Failed to commit chunk batch insert transaction")?;

        debug!("Committed {} chunks for document {}", inserted, document_id);
        Ok(inserted)
    }

    #[inline]
    pub async fn list_by_document(pool: &SqlitePool, document_id: i64) -> Result<Vec<Chunk>> {
        let chunks = sqlx::query_as::<_, Chunk>(
            r#"
            SELECT id,
                   document_id,
                   chunk_index,
                   content,
                   book_id,
                   title,
                   author,
                   genre,
                   embedding
            FROM document_chunks WHERE document_id = ? ORDER BY chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chunks by document")?;

        Ok(chunks)
    }

    #[inline]
    pub async fn count_by_document(pool: &SqlitePool, document_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(pool)
                .await
                .context("Failed to count chunks by document")?;

        Ok(count)
    }

    #[inline]
    pub async fn count_all(pool: &SqlitePool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks")
            .fetch_one(pool)
            .await
            .context("Failed to count chunks")?;

        Ok(count)
    }

    /// Fetch nearest-neighbor candidates in insertion order, optionally
    /// restricted to chunks whose metadata title contains `title_filter`
    /// (case-insensitive)
    #[inline]
    pub async fn candidates(pool: &SqlitePool, title_filter: Option<&str>) -> Result<Vec<Chunk>> {
        let chunks = if let Some(filter) = title_filter {
            sqlx::query_as::<_, Chunk>(
                r#"
                SELECT id,
                       document_id,
                       chunk_index,
                       content,
                       book_id,
                       title,
                       author,
                       genre,
                       embedding
                FROM document_chunks WHERE title LIKE ? ORDER BY id ASC
                "#,
            )
            .bind(format!("%{}%", filter))
            .fetch_all(pool)
            .await
        } else {
            sqlx::query_as::<_, Chunk>(
                r#"
                SELECT id,
                       document_id,
                       chunk_index,
                       content,
                       book_id,
                       title,
                       author,
                       genre,
                       embedding
                FROM document_chunks ORDER BY id ASC
                "#,
            )
            .fetch_all(pool)
            .await
        }
        .context("Failed to fetch chunk candidates")?;

        Ok(chunks)
    }

    /// Fetch recommendation candidates: chunks attributed to a book, with
    /// the given book ids excluded
    #[inline]
    pub async fn candidates_by_book_excluding(
        pool: &SqlitePool,
        excluded_book_ids: &[i64],
    ) -> Result<Vec<Chunk>> {
        let base = r#"
            SELECT id,
                   document_id,
                   chunk_index,
                   content,
                   book_id,
                   title,
                   author,
                   genre,
                   embedding
            FROM document_chunks WHERE book_id IS NOT NULL
            "#;

        let query_str = if excluded_book_ids.is_empty() {
            format!("{} ORDER BY id ASC", base)
        } else {
            let placeholders = vec!["?"; excluded_book_ids.len()].join(", ");
            format!("{} AND book_id NOT IN ({}) ORDER BY id ASC", base, placeholders)
        };

        let mut query = sqlx::query_as::<_, Chunk>(&query_str);
        for book_id in excluded_book_ids {
            query = query.bind(book_id);
        }

        let chunks = query
            .fetch_all(pool)
            .await
            .context("Failed to fetch recommendation candidates")?;

        Ok(chunks)
    }
}

pub struct ReviewQueries;

impl ReviewQueries {
    /// Insert a review and null out the book's cached AI review summary in
    /// one transaction
    #[inline]
    pub async fn create(pool: &SqlitePool, new_review: NewReview) -> Result<Review> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for review insert")?;

        let now = Utc::now().naive_utc();
        let blob = new_review.embedding.as_deref().map(vec_to_blob);

        let id = sqlx::query(
            r#"
            INSERT INTO reviews (book_id, user_id, review_text, rating, embedding, created_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(new_review.book_id)
        .bind(new_review.user_id)
        .bind(&new_review.review_text)
        .bind(new_review.rating)
        .bind(blob)
        .bind(now)
        .execute(&mut *transaction)
        .await
        .context("Failed to insert review")?
        .last_insert_rowid();

        sqlx::query("UPDATE books SET ai_review_summary = NULL WHERE id = ?")
            .bind(new_review.book_id)
            .execute(&mut *transaction)
            .await
            .context("Failed to invalidate review summary")?;

        transaction
            .commit()
            .await
            .context("Failed to commit review insert transaction")?;

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created review"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Review>> {
        let result = sqlx::query_as::<_, Review>(
            r#"
            SELECT id,
                   book_id,
                   user_id,
                   review_text,
                   rating,
                   embedding,
                   created_date
            FROM reviews WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get review by id")?;

        Ok(result)
    }

    /// Delete a review and null out the book's cached AI review summary in
    /// one transaction. Returns false when the review does not exist.
    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for review delete")?;

        let book_id: Option<i64> = sqlx::query_scalar("SELECT book_id FROM reviews WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *transaction)
            .await
            .context("Failed to look up review for delete")?;

        let Some(book_id) = book_id else {
            return Ok(false);
        };

        sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id)
            .execute(&mut *transaction)
            .await
            .context("Failed to delete review")?;

        sqlx::query("UPDATE books SET ai_review_summary = NULL WHERE id = ?")
            .bind(book_id)
            .execute(&mut *transaction)
            .await
            .context("Failed to invalidate review summary")?;

        transaction
            .commit()
            .await
            .context("Failed to commit review delete transaction")?;

        Ok(true)
    }

    #[inline]
    pub async fn list_by_book(pool: &SqlitePool, book_id: i64) -> Result<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(
            r#"
            SELECT id,
                   book_id,
                   user_id,
                   review_text,
                   rating,
                   embedding,
                   created_date
            FROM reviews WHERE book_id = ? ORDER BY created_date DESC, id DESC
            "#,
        )
        .bind(book_id)
        .fetch_all(pool)
        .await
        .context("Failed to list reviews by book")?;

        Ok(reviews)
    }

    /// Review texts for a book, oldest first, skipping reviews without text
    #[inline]
    pub async fn texts_for_book(pool: &SqlitePool, book_id: i64) -> Result<Vec<String>> {
        let texts: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT review_text FROM reviews
            WHERE book_id = ? AND review_text IS NOT NULL AND TRIM(review_text) != ''
            ORDER BY id ASC
            "#,
        )
        .bind(book_id)
        .fetch_all(pool)
        .await
        .context("Failed to fetch review texts for book")?;

        Ok(texts)
    }

    /// The user's most recent positively-rated reviews that carry an
    /// embedding, newest first, capped at `limit`
    #[inline]
    pub async fn recent_positive_with_embedding(
        pool: &SqlitePool,
        user_id: i64,
        min_rating: i64,
        limit: i64,
    ) -> Result<Vec<Review>> {
        let reviews = sqlx::query_as::<_, Review>(
            r#"
            SELECT id,
                   book_id,
                   user_id,
                   review_text,
                   rating,
                   embedding,
                   created_date
            FROM reviews
            WHERE user_id = ? AND rating >= ? AND embedding IS NOT NULL
            ORDER BY created_date DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(min_rating)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to fetch positive reviews for user")?;

        Ok(reviews)
    }

    /// Every book id the user has reviewed, at any rating
    #[inline]
    pub async fn reviewed_book_ids(pool: &SqlitePool, user_id: i64) -> Result<Vec<i64>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT book_id FROM reviews WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(pool)
                .await
                .context("Failed to fetch reviewed book ids")?;

        Ok(ids)
    }

    /// Average rating per book across all reviews
    #[inline]
    pub async fn average_ratings(pool: &SqlitePool) -> Result<Vec<(i64, f64)>> {
        let averages: Vec<(i64, f64)> = sqlx::query_as(
            "SELECT book_id, AVG(rating) FROM reviews GROUP BY book_id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to compute average ratings")?;

        Ok(averages)
    }
}
