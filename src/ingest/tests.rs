use super::*;
use crate::database::sqlite::models::NewBook;
use crate::database::sqlite::models::NewDocument;
use crate::test_support::{FakeEmbedder, FakeLanguageModel, create_test_database};
use std::fs;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

async fn create_book(database: &Database, title: &str) -> Book {
    BookQueries::create(
        database.pool(),
        NewBook {
            title: title.to_string(),
            author: "Frank Herbert".to_string(),
            genre: Some("Sci-Fi".to_string()),
            year_published: Some(1965),
        },
    )
    .await
    .expect("can create book")
}

async fn create_text_document(
    database: &Database,
    temp_dir: &TempDir,
    book_id: Option<i64>,
    content: &str,
) -> Document {
    let file_path = temp_dir.path().join("novel.txt");
    fs::write(&file_path, content).expect("can write document file");

    DocumentQueries::create(
        database.pool(),
        NewDocument {
            book_id,
            filename: "novel.txt".to_string(),
            file_path: file_path.to_string_lossy().into_owned(),
        },
    )
    .await
    .expect("can create document")
}

fn create_pipeline(
    database: Database,
    embedder: Arc<FakeEmbedder>,
    llm: Arc<FakeLanguageModel>,
) -> IngestionPipeline {
    IngestionPipeline::new(
        database,
        embedder,
        llm,
        ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 20,
        },
    )
}

#[tokio::test]
async fn ingest_missing_document_is_not_found() {
    let (database, _temp_dir) = create_test_database().await;
    let pipeline = create_pipeline(
        database,
        Arc::new(FakeEmbedder::new(3)),
        Arc::new(FakeLanguageModel::new()),
    );

    let error = pipeline.ingest(42).await.expect_err("missing document fails");
    assert!(matches!(error, BookragError::NotFound(_)));
}

#[tokio::test]
async fn begin_commits_processing_status() {
    let (database, temp_dir) = create_test_database().await;
    let document = create_text_document(&database, &temp_dir, None, "Some text.").await;

    let pipeline = create_pipeline(
        database.clone(),
        Arc::new(FakeEmbedder::new(3)),
        Arc::new(FakeLanguageModel::new()),
    );

    let begun = pipeline.begin(document.id).await.expect("can begin");
    assert_eq!(begun.status, DocumentStatus::Processing);

    let fetched = DocumentQueries::get_by_id(database.pool(), document.id)
        .await
        .expect("can fetch document")
        .expect("document exists");
    assert_eq!(fetched.status, DocumentStatus::Processing);
}

#[tokio::test]
async fn ingest_persists_all_chunks_with_book_metadata() {
    let (database, temp_dir) = create_test_database().await;
    let book = create_book(&database, "Dune").await;

    let content =
        "Arrakis is a desert planet. The spice extends life. The spice expands consciousness. "
            .repeat(5);
    let document = create_text_document(&database, &temp_dir, Some(book.id), &content).await;

    let embedder = Arc::new(FakeEmbedder::new(3));
    let llm = Arc::new(FakeLanguageModel::with_replies(&["A spice-soaked epic."]));
    let pipeline = create_pipeline(database.clone(), Arc::clone(&embedder), Arc::clone(&llm));

    let chunk_count = pipeline.ingest(document.id).await.expect("can ingest");

    let expected = split_text(
        &content,
        &ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 20,
        },
    );
    assert_eq!(chunk_count, expected.len());

    let stored = ChunkQueries::list_by_document(database.pool(), document.id)
        .await
        .expect("can list chunks");
    assert_eq!(stored.len(), expected.len());
    for (index, (chunk, piece)) in stored.iter().zip(&expected).enumerate() {
        assert_eq!(chunk.chunk_index, index as i64);
        assert_eq!(&chunk.content, piece);
        assert_eq!(chunk.book_id, Some(book.id));
        assert_eq!(chunk.title.as_deref(), Some("Dune"));
        assert_eq!(chunk.author.as_deref(), Some("Frank Herbert"));
        assert_eq!(chunk.genre.as_deref(), Some("Sci-Fi"));
        assert_eq!(chunk.vector().len(), 3);
    }

    // All chunk embeddings come from a single batched provider call
    assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 1);

    let fetched_document = DocumentQueries::get_by_id(database.pool(), document.id)
        .await
        .expect("can fetch document")
        .expect("document exists");
    assert!(fetched_document.is_ready());

    let fetched_book = BookQueries::get_by_id(database.pool(), book.id)
        .await
        .expect("can fetch book")
        .expect("book exists");
    assert_eq!(fetched_book.summary.as_deref(), Some("A spice-soaked epic."));
}

#[tokio::test]
async fn ingest_without_book_uses_empty_metadata_and_skips_summary() {
    let (database, temp_dir) = create_test_database().await;
    let document = create_text_document(&database, &temp_dir, None, "Unattributed notes.").await;

    let llm = Arc::new(FakeLanguageModel::new());
    let pipeline =
        create_pipeline(database.clone(), Arc::new(FakeEmbedder::new(3)), Arc::clone(&llm));

    pipeline.ingest(document.id).await.expect("can ingest");

    let stored = ChunkQueries::list_by_document(database.pool(), document.id)
        .await
        .expect("can list chunks");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].book_id, None);
    assert_eq!(stored[0].title, None);

    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn summary_failure_does_not_block_chunking() {
    let (database, temp_dir) = create_test_database().await;
    let book = create_book(&database, "Dune").await;
    let document =
        create_text_document(&database, &temp_dir, Some(book.id), "The sleeper must awaken.")
            .await;

    let pipeline = create_pipeline(
        database.clone(),
        Arc::new(FakeEmbedder::new(3)),
        Arc::new(FakeLanguageModel::failing()),
    );

    let chunk_count = pipeline.ingest(document.id).await.expect("can ingest");
    assert_eq!(chunk_count, 1);

    let fetched_book = BookQueries::get_by_id(database.pool(), book.id)
        .await
        .expect("can fetch book")
        .expect("book exists");
    assert_eq!(fetched_book.summary, None);

    let fetched_document = DocumentQueries::get_by_id(database.pool(), document.id)
        .await
        .expect("can fetch document")
        .expect("document exists");
    assert!(fetched_document.is_ready());
}

#[tokio::test]
async fn extraction_failure_marks_document_failed_with_no_chunks() {
    let (database, _temp_dir) = create_test_database().await;

    let document = DocumentQueries::create(
        database.pool(),
        NewDocument {
            book_id: None,
            filename: "ghost.txt".to_string(),
            file_path: "/nonexistent/ghost.txt".to_string(),
        },
    )
    .await
    .expect("can create document");

    let pipeline = create_pipeline(
        database.clone(),
        Arc::new(FakeEmbedder::new(3)),
        Arc::new(FakeLanguageModel::new()),
    );

    assert!(pipeline.ingest(document.id).await.is_err());

    let fetched = DocumentQueries::get_by_id(database.pool(), document.id)
        .await
        .expect("can fetch document")
        .expect("document exists");
    assert!(fetched.is_failed());

    let chunk_count = ChunkQueries::count_by_document(database.pool(), document.id)
        .await
        .expect("can count chunks");
    assert_eq!(chunk_count, 0);
}

#[tokio::test]
async fn embedding_failure_marks_document_failed() {
    let (database, temp_dir) = create_test_database().await;
    let document = create_text_document(&database, &temp_dir, None, "Some content.").await;

    let pipeline = create_pipeline(
        database.clone(),
        Arc::new(FakeEmbedder::failing(3)),
        Arc::new(FakeLanguageModel::new()),
    );

    let error = pipeline.ingest(document.id).await.expect_err("embedding failure propagates");
    assert!(matches!(error, BookragError::Provider(_)));

    let fetched = DocumentQueries::get_by_id(database.pool(), document.id)
        .await
        .expect("can fetch document")
        .expect("document exists");
    assert!(fetched.is_failed());
}

#[test]
fn char_prefix_respects_char_boundaries() {
    assert_eq!(char_prefix("abcdef", 3), "abc");
    assert_eq!(char_prefix("ab", 10), "ab");
    assert_eq!(char_prefix("äöüß", 2), "äö");
}
