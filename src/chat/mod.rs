// Conversational router
// Classifies a query's intent and composes a grounded answer


use itertools::Itertools;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::Result;
use crate::database::Database;
use crate::database::sqlite::models::Book;
use crate::database::sqlite::queries::BookQueries;
use crate::providers::LanguageModel;
use crate::retrieval::{DEFAULT_SEARCH_LIMIT, Retriever, ScoredChunk};

/// Reply for queries unrelated to the book catalog
pub const REFUSAL_MESSAGE: &str =
    "I can only help with questions about our book catalog. Ask me about a book's \
     content, or for books by genre or author.";

/// Reply when a branch fails irrecoverably; a best-effort apology is
/// preferred over a hard failure on this surface
pub const FALLBACK_MESSAGE: &str =
    "I'm sorry, I wasn't able to answer that right now. Please try again.";

/// Source label for catalog listings
pub const CATALOG_SOURCE: &str = "Book catalog";

const DEFAULT_CATALOG_LIMIT: i64 = 5;

/// How many prior turns are replayed into prompts
const HISTORY_WINDOW: usize = 2;

/// One prior question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// A composed answer with its source attributions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

/// The three handling strategies a query can route to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    NonBook,
    Metadata,
    Content,
}

impl Intent {
    /// Map raw classifier output to an intent. Unrecognized labels fall
    /// through to `Content`, the broadest strategy.
    #[inline]
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.to_uppercase();
        if normalized.contains("NON_BOOK") {
            Intent::NonBook
        } else if normalized.contains("METADATA") {
            Intent::Metadata
        } else {
            Intent::Content
        }
    }
}

/// Structured criteria extracted from a catalog query
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct CatalogFilter {
    genre: Option<String>,
    author: Option<String>,
    limit: Option<i64>,
}

/// Failure to pull structured output from a model reply. Always recovered
/// locally with a default; never surfaced to the caller.
#[derive(Debug, Error)]
enum ExtractionError {
    #[error("no JSON object in model output")]
    MissingJson,
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub struct ChatRouter {
    database: Database,
    retriever: Retriever,
    llm: Arc<dyn LanguageModel>,
}

impl ChatRouter {
    #[inline]
    pub fn new(database: Database, retriever: Retriever, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            database,
            retriever,
            llm,
        }
    }

    /// Answer a user query. Classification decides the strategy per call;
    /// the router itself is stateless beyond the supplied history.
    #[inline]
    pub async fn answer(&self, query: &str, history: &[ChatTurn]) -> Result<ChatAnswer> {
        let label = self
            .llm
            .complete(&classification_prompt(query, history))
            .await?;
        let intent = Intent::parse(&label);
        debug!("Routed query to {:?} (raw label: {:?})", intent, label.trim());

        match intent {
            // Short-circuit: no retrieval, no further model calls
            Intent::NonBook => Ok(ChatAnswer {
                answer: REFUSAL_MESSAGE.to_string(),
                sources: Vec::new(),
            }),
            Intent::Metadata => Ok(self.answer_metadata(query).await.unwrap_or_else(|e| {
                warn!("Catalog branch failed: {}", e);
                fallback_answer()
            })),
            Intent::Content => Ok(self.answer_content(query, history).await.unwrap_or_else(|e| {
                warn!("Content branch failed: {}", e);
                fallback_answer()
            })),
        }
    }

    async fn answer_metadata(&self, query: &str) -> Result<ChatAnswer> {
        let raw = self.llm.complete(&filter_extraction_prompt(query)).await?;

        // Malformed extraction output degrades to an unfiltered listing
        let filter = match parse_catalog_filter(&raw) {
            Ok(filter) => filter,
            Err(e) => {
                warn!("Catalog filter extraction failed ({}), using empty filter", e);
                CatalogFilter::default()
            }
        };

        let limit = filter.limit.unwrap_or(DEFAULT_CATALOG_LIMIT).max(0);
        let books = BookQueries::list_filtered(
            self.database.pool(),
            filter.genre.as_deref(),
            filter.author.as_deref(),
            limit,
        )
        .await?;

        Ok(ChatAnswer {
            answer: format_catalog_listing(&books),
            sources: vec![CATALOG_SOURCE.to_string()],
        })
    }

    async fn answer_content(&self, query: &str, history: &[ChatTurn]) -> Result<ChatAnswer> {
        let raw = self.llm.complete(&title_extraction_prompt(query)).await?;
        let title = parse_title_mention(&raw);
        debug!("Extracted title mention: {:?}", title);

        let hits = self
            .retriever
            .search(query, title.as_deref(), DEFAULT_SEARCH_LIMIT)
            .await?;

        let context = hits
            .iter()
            .map(|hit| hit.chunk.content.as_str())
            .join("\n\n");
        let sources = source_labels(&hits);

        let answer = self
            .llm
            .complete(&answer_prompt(&context, query, history))
            .await?;

        Ok(ChatAnswer {
            answer: answer.trim().to_string(),
            sources,
        })
    }
}

fn fallback_answer() -> ChatAnswer {
    ChatAnswer {
        answer: FALLBACK_MESSAGE.to_string(),
        sources: Vec::new(),
    }
}

/// Per-chunk source labels from stored metadata titles, deduplicated,
/// retrieval order preserved
fn source_labels(hits: &[ScoredChunk]) -> Vec<String> {
    hits.iter()
        .map(|hit| match &hit.chunk.title {
            Some(title) => title.clone(),
            None => format!("Document {}", hit.chunk.document_id),
        })
        .unique()
        .collect()
}

fn format_history(history: &[ChatTurn]) -> String {
    let recent = history
        .iter()
        .rev()
        .take(HISTORY_WINDOW)
        .rev()
        .collect::<Vec<_>>();

    if recent.is_empty() {
        return "(none)".to_string();
    }

    recent
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}", turn.question, turn.answer))
        .join("\n")
}

fn classification_prompt(query: &str, history: &[ChatTurn]) -> String {
    format!(
        "You are a router for a book catalog assistant. Classify the user's query \
         into exactly one category:\n\
         - NON_BOOK: not about books, authors, or this catalog\n\
         - METADATA: asks to list or find books by attributes such as genre, \
         author, or year\n\
         - CONTENT: asks about the contents, plot, themes, or details of a book\n\n\
         Recent conversation:\n{}\n\n\
         Query: {}\n\n\
         Reply with only the category name.",
        format_history(history),
        query
    )
}

fn filter_extraction_prompt(query: &str) -> String {
    format!(
        "Extract search criteria from this book catalog query. Reply with only a \
         JSON object of the form \
         {{\"genre\": string or null, \"author\": string or null, \"limit\": number}}. \
         Use null for anything the query does not mention and 5 as the default limit.\n\n\
         Query: {}",
        query
    )
}

fn title_extraction_prompt(query: &str) -> String {
    format!(
        "If this query explicitly mentions a book title, reply with only that \
         title. Otherwise reply with only the word None.\n\n\
         Query: {}",
        query
    )
}

fn answer_prompt(context: &str, query: &str, history: &[ChatTurn]) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, don't try to \
         make up an answer.\n\n\
         Context:\n{}\n\n\
         Recent conversation:\n{}\n\n\
         Question: {}\n\
         Answer:",
        context,
        format_history(history),
        query
    )
}

/// Pull a `CatalogFilter` out of raw model output, tolerating code fences
/// and prose around the JSON object
fn parse_catalog_filter(raw: &str) -> std::result::Result<CatalogFilter, ExtractionError> {
    let start = raw.find('{').ok_or(ExtractionError::MissingJson)?;
    let end = raw.rfind('}').ok_or(ExtractionError::MissingJson)?;
    if end < start {
        return Err(ExtractionError::MissingJson);
    }

    let json = raw.get(start..=end).ok_or(ExtractionError::MissingJson)?;
    Ok(serde_json::from_str(json)?)
}

/// Interpret title-extraction output; `None`, quotes, and whitespace are
/// model noise
fn parse_title_mention(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(['"', '\'', '`']).trim();

    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return None;
    }

    Some(trimmed.to_string())
}

fn format_catalog_listing(books: &[Book]) -> String {
    if books.is_empty() {
        return "No books in the catalog match that request.".to_string();
    }

    let listing = books
        .iter()
        .map(|book| {
            let details: Vec<String> = [
                book.genre.clone(),
                book.year_published.map(|year| year.to_string()),
            ]
            .into_iter()
            .flatten()
            .collect();

            if details.is_empty() {
                format!("- {} by {}", book.title, book.author)
            } else {
                format!("- {} by {} ({})", book.title, book.author, details.join(", "))
            }
        })
        .join("\n");

    format!("Here are the matching books:\n{}", listing)
}
