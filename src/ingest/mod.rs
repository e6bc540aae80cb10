// Ingestion pipeline
// Turns an uploaded document into searchable, embedded chunks

#[cfg(test)]
mod tests;

pub mod chunking;
pub mod extract;

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::database::Database;
use crate::database::sqlite::models::{Book, ChunkMetadata, Document, DocumentStatus, NewChunk};
use crate::database::sqlite::queries::{BookQueries, ChunkQueries, DocumentQueries};
use crate::providers::{EmbeddingProvider, LanguageModel};
use crate::{BookragError, Result};

pub use chunking::{ChunkingConfig, split_text};
pub use extract::extract_text;

/// Characters of extracted text fed to the book summary prompt
const SUMMARY_PREFIX_CAP: usize = 10_000;

/// Processes an uploaded document into embedded chunks and maintains the
/// document lifecycle state along the way
pub struct IngestionPipeline {
    database: Database,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModel>,
    chunking: ChunkingConfig,
}

impl IngestionPipeline {
    #[inline]
    pub fn new(
        database: Database,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            database,
            embedder,
            llm,
            chunking,
        }
    }

    /// Run the full ingestion for a document. On failure the document is
    /// marked `failed` before the error propagates; on success it is
    /// `ready` with its chunk set committed atomically.
    #[inline]
    pub async fn ingest(&self, document_id: i64) -> Result<usize> {
        let document = self.begin(document_id).await?;
        self.run(&document).await
    }

    /// Validate the document and commit the `processing` status before any
    /// extraction work starts, so readers observe it immediately. A caller
    /// dispatching ingestion as a detached task should await this first and
    /// hand the returned document to [`IngestionPipeline::run`].
    #[inline]
    pub async fn begin(&self, document_id: i64) -> Result<Document> {
        let pool = self.database.pool();

        let Some(mut document) = DocumentQueries::get_by_id(pool, document_id).await? else {
            return Err(BookragError::NotFound(format!("document {document_id}")));
        };

        DocumentQueries::update_status(pool, document.id, DocumentStatus::Processing).await?;
        document.status = DocumentStatus::Processing;

        info!("Document {} marked processing", document.id);
        Ok(document)
    }

    /// The remainder of an ingestion run after [`IngestionPipeline::begin`]
    #[inline]
    pub async fn run(&self, document: &Document) -> Result<usize> {
        match self.process(document).await {
            Ok(chunk_count) => {
                info!(
                    "Ingested document {} into {} chunks",
                    document.id, chunk_count
                );
                Ok(chunk_count)
            }
            Err(e) => {
                error!("Ingestion failed for document {}: {}", document.id, e);

                if let Err(update_error) = DocumentQueries::update_status(
                    self.database.pool(),
                    document.id,
                    DocumentStatus::Failed,
                )
                .await
                {
                    error!(
                        "Failed to mark document {} failed: {}",
                        document.id, update_error
                    );
                }

                Err(e)
            }
        }
    }

    async fn process(&self, document: &Document) -> Result<usize> {
        let pool = self.database.pool();

        let file_path = PathBuf::from(&document.file_path);
        let filename = document.filename.clone();
        let text =
            tokio::task::spawn_blocking(move || extract::extract_text(&file_path, &filename))
                .await
                .context("Extraction task failed")??;

        let book = match document.book_id {
            Some(book_id) => BookQueries::get_by_id(pool, book_id).await?,
            None => None,
        };

        // Summarization is best-effort: a provider hiccup here must not
        // block chunk ingestion.
        if let Some(book) = &book {
            if let Err(e) = self.refresh_book_summary(book, &text).await {
                warn!("Skipping summary for book {}: {}", book.id, e);
            }
        }

        let pieces = split_text(&text, &self.chunking);
        if pieces.is_empty() {
            debug!("Document {} produced no chunks", document.id);
            DocumentQueries::update_status(pool, document.id, DocumentStatus::Ready).await?;
            return Ok(0);
        }

        // One batched call for the whole document bounds provider round-trips
        let embeddings = self.embedder.embed_many(&pieces).await?;
        if embeddings.len() != pieces.len() {
            return Err(BookragError::Other(anyhow::anyhow!(
                "embedding count mismatch: {} chunks, {} embeddings",
                pieces.len(),
                embeddings.len()
            )));
        }

        let metadata = book.as_ref().map(chunk_metadata_for).unwrap_or_default();

        let chunks: Vec<NewChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (content, embedding))| NewChunk {
                document_id: document.id,
                chunk_index: index as i64,
                content,
                metadata: metadata.clone(),
                embedding,
            })
            .collect();

        let inserted = ChunkQueries::insert_batch_marking_ready(pool, document.id, chunks).await?;
        Ok(inserted)
    }

    async fn refresh_book_summary(&self, book: &Book, text: &str) -> Result<()> {
        let prefix = char_prefix(text, SUMMARY_PREFIX_CAP);
        if prefix.trim().is_empty() {
            return Ok(());
        }

        let prompt = format!(
            "Please provide a concise summary of the following book content:\n\n{}",
            prefix
        );
        let summary = self.llm.complete(&prompt).await?;

        BookQueries::set_summary(self.database.pool(), book.id, summary.trim()).await?;
        debug!("Refreshed summary for book {}", book.id);
        Ok(())
    }
}

fn chunk_metadata_for(book: &Book) -> ChunkMetadata {
    ChunkMetadata {
        book_id: Some(book.id),
        title: Some(book.title.clone()),
        author: Some(book.author.clone()),
        genre: book.genre.clone(),
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters
fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => text.get(..byte_offset).unwrap_or(text),
        None => text,
    }
}
