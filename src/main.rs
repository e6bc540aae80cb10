use clap::{Parser, Subcommand};
use std::path::PathBuf;

use bookrag::Result;
use bookrag::commands::{
    add_book, add_review, chat, configure, delete_book, delete_document, delete_review, ingest,
    list_books, recommend, search, show_status, summary, upload,
};
use bookrag::recommend::DEFAULT_RECOMMEND_LIMIT;
use bookrag::retrieval::DEFAULT_SEARCH_LIMIT;

#[derive(Parser)]
#[command(name = "bookrag")]
#[command(about = "Semantic book catalog with retrieval-grounded chat and recommendations")]
#[command(version)]
struct Cli {
    /// Override the data directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Add a book to the catalog
    AddBook {
        /// Book title
        title: String,
        /// Book author
        #[arg(long)]
        author: String,
        /// Optional genre
        #[arg(long)]
        genre: Option<String>,
        /// Optional publication year
        #[arg(long)]
        year: Option<i64>,
    },
    /// List all books in the catalog
    ListBooks,
    /// Delete a book along with its documents, chunks, and reviews
    DeleteBook {
        /// Book ID to delete
        book_id: i64,
    },
    /// Upload a document file, optionally linked to a book
    Upload {
        /// Path to a PDF or plain-text file
        file: PathBuf,
        /// Book ID this document belongs to
        #[arg(long)]
        book: Option<i64>,
    },
    /// Ingest an uploaded document into searchable chunks
    Ingest {
        /// Document ID to ingest
        document_id: i64,
    },
    /// Delete a document and its chunks
    DeleteDocument {
        /// Document ID to delete
        document_id: i64,
    },
    /// Show document ingestion status
    Status,
    /// Search indexed document chunks
    Search {
        /// Search query
        query: String,
        /// Restrict to chunks of books whose title contains this text
        #[arg(long)]
        title: Option<String>,
        /// Maximum number of chunks to return
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Ask the catalog assistant a question
    Chat {
        /// The question to ask
        question: String,
    },
    /// Manage book reviews
    #[command(subcommand)]
    Review(ReviewCommands),
    /// Show the AI-generated review summary for a book
    Summary {
        /// Book ID to summarize reviews for
        book_id: i64,
    },
    /// Recommend books for a user
    Recommend {
        /// User ID to recommend for
        user_id: i64,
        /// Maximum number of recommendations
        #[arg(long, default_value_t = DEFAULT_RECOMMEND_LIMIT)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// Add a review for a book
    Add {
        /// Book ID being reviewed
        book_id: i64,
        /// Reviewing user's ID
        #[arg(long)]
        user: i64,
        /// Rating from 1 to 5
        #[arg(long)]
        rating: i64,
        /// Optional review text
        #[arg(long)]
        text: Option<String>,
    },
    /// Delete a review
    Delete {
        /// Review ID to delete
        review_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir.as_deref();

    match cli.command {
        Commands::Config { show } => {
            configure(data_dir, show)?;
        }
        Commands::AddBook {
            title,
            author,
            genre,
            year,
        } => {
            add_book(data_dir, title, author, genre, year).await?;
        }
        Commands::ListBooks => {
            list_books(data_dir).await?;
        }
        Commands::DeleteBook { book_id } => {
            delete_book(data_dir, book_id).await?;
        }
        Commands::Upload { file, book } => {
            upload(data_dir, file, book).await?;
        }
        Commands::Ingest { document_id } => {
            ingest(data_dir, document_id).await?;
        }
        Commands::DeleteDocument { document_id } => {
            delete_document(data_dir, document_id).await?;
        }
        Commands::Status => {
            show_status(data_dir).await?;
        }
        Commands::Search {
            query,
            title,
            limit,
        } => {
            search(data_dir, query, title, limit).await?;
        }
        Commands::Chat { question } => {
            chat(data_dir, question).await?;
        }
        Commands::Review(ReviewCommands::Add {
            book_id,
            user,
            rating,
            text,
        }) => {
            add_review(data_dir, book_id, user, rating, text).await?;
        }
        Commands::Review(ReviewCommands::Delete { review_id }) => {
            delete_review(data_dir, review_id).await?;
        }
        Commands::Summary { book_id } => {
            summary(data_dir, book_id).await?;
        }
        Commands::Recommend { user_id, limit } => {
            recommend(data_dir, user_id, limit).await?;
        }
    }

    Ok(())
}
