use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::chat::{ChatRouter, ChatTurn};
use crate::config::Config;
use crate::database::Database;
use crate::database::sqlite::models::{NewBook, NewDocument};
use crate::database::sqlite::queries::{BookQueries, ChunkQueries, DocumentQueries};
use crate::ingest::IngestionPipeline;
use crate::providers::{EmbeddingProvider, LanguageModel, OpenAiClient};
use crate::recommend::Recommender;
use crate::retrieval::Retriever;
use crate::reviews::ReviewSummarizer;

fn load_config(data_dir: Option<&Path>) -> Result<Config> {
    let base_dir = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => Config::default_base_dir()?,
    };
    Config::load(base_dir)
}

async fn open_database(config: &Config) -> Result<Database> {
    Ok(Database::initialize_from_base_dir(&config.base_dir).await?)
}

fn build_client(config: &Config) -> Result<OpenAiClient> {
    let api_key = std::env::var(&config.provider.api_key_env).map_err(|_| {
        crate::BookragError::Config(format!(
            "No API key found: set the {} environment variable",
            config.provider.api_key_env
        ))
    })?;

    Ok(OpenAiClient::new(&config.provider, api_key))
}

/// Show the active configuration, or write the default config file
#[inline]
pub fn configure(data_dir: Option<&Path>, show: bool) -> Result<()> {
    let config = load_config(data_dir)?;

    if show {
        println!("Data directory: {}", config.base_dir.display());
        println!();
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let config_path = config.config_file_path();
    if config_path.exists() {
        println!("Configuration already exists: {}", config_path.display());
        println!("Edit the file directly, or run 'bookrag config --show' to inspect it.");
        return Ok(());
    }

    config.save()?;
    println!("Wrote default configuration to {}", config_path.display());
    Ok(())
}

/// Add a book to the catalog
#[inline]
pub async fn add_book(
    data_dir: Option<&Path>,
    title: String,
    author: String,
    genre: Option<String>,
    year: Option<i64>,
) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;

    let book = BookQueries::create(
        database.pool(),
        NewBook {
            title,
            author,
            genre,
            year_published: year,
        },
    )
    .await?;

    println!("Created book: {} by {} (ID: {})", book.title, book.author, book.id);
    Ok(())
}

/// List every book in the catalog
#[inline]
pub async fn list_books(data_dir: Option<&Path>) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;

    let books = BookQueries::list_all(database.pool()).await?;

    if books.is_empty() {
        println!("No books in the catalog yet.");
        println!("Use 'bookrag add-book <title> --author <author>' to add one.");
        return Ok(());
    }

    println!("Books ({} total):", books.len());
    for book in &books {
        let genre = book
            .genre
            .as_deref()
            .map(|genre| format!(" - {}", genre))
            .unwrap_or_default();
        let year = book
            .year_published
            .map(|year| format!(" ({})", year))
            .unwrap_or_default();
        println!(
            "  [{}] {} by {}{}{}",
            book.id, book.title, book.author, genre, year
        );
    }

    Ok(())
}

/// Delete a book, cascading its documents, chunks, and reviews
#[inline]
pub async fn delete_book(data_dir: Option<&Path>, book_id: i64) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;

    if BookQueries::delete(database.pool(), book_id).await? {
        println!("Deleted book {}", book_id);
    } else {
        println!("No book with ID {}", book_id);
    }

    Ok(())
}

/// Copy a document file into the data directory and register it, optionally
/// linked to a book
#[inline]
pub async fn upload(data_dir: Option<&Path>, file: PathBuf, book_id: Option<i64>) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;

    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .context("Upload path has no usable filename")?
        .to_string();

    if let Some(book_id) = book_id {
        if BookQueries::get_by_id(database.pool(), book_id).await?.is_none() {
            anyhow::bail!("No book with ID {}", book_id);
        }
    }

    let uploads_dir = config.uploads_dir_path();
    std::fs::create_dir_all(&uploads_dir)
        .with_context(|| format!("Failed to create uploads directory: {}", uploads_dir.display()))?;

    let stored_path = uploads_dir.join(&filename);
    std::fs::copy(&file, &stored_path)
        .with_context(|| format!("Failed to copy {} into uploads", file.display()))?;

    let document = DocumentQueries::create(
        database.pool(),
        NewDocument {
            book_id,
            filename,
            file_path: stored_path.to_string_lossy().into_owned(),
        },
    )
    .await?;

    println!(
        "Uploaded {} (document ID: {}, status: {})",
        document.filename, document.id, document.status
    );
    println!("Run 'bookrag ingest {}' to index it.", document.id);
    Ok(())
}

/// Run the ingestion pipeline for an uploaded document
#[inline]
pub async fn ingest(data_dir: Option<&Path>, document_id: i64) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;
    let client = Arc::new(build_client(&config)?);
    let embedder: Arc<dyn EmbeddingProvider> = client.clone();
    let llm: Arc<dyn LanguageModel> = client;

    let pipeline = IngestionPipeline::new(
        database,
        embedder,
        llm,
        config.chunking.clone(),
    );

    info!("Starting ingestion for document {}", document_id);
    let chunk_count = pipeline.ingest(document_id).await?;
    println!("Ingested document {} into {} chunks", document_id, chunk_count);
    Ok(())
}

/// Delete a document and all of its chunks
#[inline]
pub async fn delete_document(data_dir: Option<&Path>, document_id: i64) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;

    if DocumentQueries::delete(database.pool(), document_id).await? {
        println!("Deleted document {} and its chunks", document_id);
    } else {
        println!("No document with ID {}", document_id);
    }

    Ok(())
}

/// Show every document with its lifecycle status and chunk count
#[inline]
pub async fn show_status(data_dir: Option<&Path>) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;

    let documents = DocumentQueries::list_all(database.pool()).await?;

    if documents.is_empty() {
        println!("No documents uploaded yet.");
        return Ok(());
    }

    println!("Documents ({} total):", documents.len());
    for document in &documents {
        let chunk_count = ChunkQueries::count_by_document(database.pool(), document.id).await?;
        let book = match document.book_id {
            Some(book_id) => BookQueries::get_by_id(database.pool(), book_id)
                .await?
                .map(|book| book.title),
            None => None,
        };

        println!(
            "  [{}] {} - {} ({} chunks{})",
            document.id,
            document.filename,
            document.status,
            chunk_count,
            book.map(|title| format!(", book: {}", title)).unwrap_or_default()
        );
    }

    let total_chunks = ChunkQueries::count_all(database.pool()).await?;
    println!();
    println!("Total indexed chunks: {}", total_chunks);
    Ok(())
}

/// Semantic search over indexed chunks
#[inline]
pub async fn search(
    data_dir: Option<&Path>,
    query: String,
    title: Option<String>,
    limit: usize,
) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;
    let client = Arc::new(build_client(&config)?);

    let retriever = Retriever::new(database, client);
    let results = retriever.search(&query, title.as_deref(), limit).await?;

    if results.is_empty() {
        println!("No matching chunks.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let source = result
            .chunk
            .title
            .clone()
            .unwrap_or_else(|| format!("Document {}", result.chunk.document_id));
        println!(
            "{}. {} (distance {:.4})",
            rank + 1,
            source,
            result.distance
        );
        println!("   {}", result.chunk.content.replace('\n', "\n   "));
    }

    Ok(())
}

/// Ask the conversational agent a single question
#[inline]
pub async fn chat(data_dir: Option<&Path>, question: String) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;
    let client = Arc::new(build_client(&config)?);
    let embedder: Arc<dyn EmbeddingProvider> = client.clone();
    let llm: Arc<dyn LanguageModel> = client;

    let retriever = Retriever::new(database.clone(), embedder);
    let router = ChatRouter::new(database, retriever, llm);

    let history: Vec<ChatTurn> = Vec::new();
    let answer = router.answer(&question, &history).await?;

    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources: {}", answer.sources.join(", "));
    }

    Ok(())
}

/// Create a review; the book's cached review summary is invalidated in the
/// same unit of work
#[inline]
pub async fn add_review(
    data_dir: Option<&Path>,
    book_id: i64,
    user_id: i64,
    rating: i64,
    text: Option<String>,
) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;
    let client = Arc::new(build_client(&config)?);
    let embedder: Arc<dyn EmbeddingProvider> = client.clone();
    let llm: Arc<dyn LanguageModel> = client;

    let summarizer = ReviewSummarizer::new(database, embedder, llm);
    let review = summarizer.create_review(book_id, user_id, text, rating).await?;

    println!(
        "Created review {} for book {} ({} stars)",
        review.id, book_id, review.rating
    );
    Ok(())
}

/// Delete a review; the book's cached review summary is invalidated in the
/// same unit of work
#[inline]
pub async fn delete_review(data_dir: Option<&Path>, review_id: i64) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;
    let client = Arc::new(build_client(&config)?);
    let embedder: Arc<dyn EmbeddingProvider> = client.clone();
    let llm: Arc<dyn LanguageModel> = client;

    let summarizer = ReviewSummarizer::new(database, embedder, llm);
    summarizer.delete_review(review_id).await?;

    println!("Deleted review {}", review_id);
    Ok(())
}

/// Show the AI review summary for a book, generating it if stale
#[inline]
pub async fn summary(data_dir: Option<&Path>, book_id: i64) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;
    let client = Arc::new(build_client(&config)?);
    let embedder: Arc<dyn EmbeddingProvider> = client.clone();
    let llm: Arc<dyn LanguageModel> = client;

    let summarizer = ReviewSummarizer::new(database, embedder, llm);
    println!("{}", summarizer.summary(book_id).await?);
    Ok(())
}

/// Recommend books for a user
#[inline]
pub async fn recommend(data_dir: Option<&Path>, user_id: i64, limit: usize) -> Result<()> {
    let config = load_config(data_dir)?;
    let database = open_database(&config).await?;

    let recommender = Recommender::new(database);
    let books = recommender.recommend(user_id, limit).await?;

    if books.is_empty() {
        println!("No recommendations available for user {}.", user_id);
        return Ok(());
    }

    println!("Recommendations for user {}:", user_id);
    for (rank, book) in books.iter().enumerate() {
        println!("  {}. {} by {}", rank + 1, book.title, book.author);
    }

    Ok(())
}
