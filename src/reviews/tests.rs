use super::*;
use crate::database::sqlite::models::NewBook;
use crate::test_support::{FakeEmbedder, FakeLanguageModel, create_test_database};
use std::sync::atomic::Ordering;

struct SummarizerFixture {
    summarizer: ReviewSummarizer,
    embedder: Arc<FakeEmbedder>,
    llm: Arc<FakeLanguageModel>,
    database: Database,
}

async fn create_summarizer(llm: FakeLanguageModel) -> (SummarizerFixture, tempfile::TempDir) {
    let (database, temp_dir) = create_test_database().await;
    let embedder = Arc::new(FakeEmbedder::new(2));
    let llm = Arc::new(llm);

    let summarizer = ReviewSummarizer::new(
        database.clone(),
        embedder.clone() as Arc<dyn crate::providers::EmbeddingProvider>,
        llm.clone() as Arc<dyn crate::providers::LanguageModel>,
    );

    (
        SummarizerFixture {
            summarizer,
            embedder,
            llm,
            database,
        },
        temp_dir,
    )
}

async fn seed_book(database: &Database) -> i64 {
    BookQueries::create(
        database.pool(),
        NewBook {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            genre: None,
            year_published: None,
        },
    )
    .await
    .expect("can create book")
    .id
}

#[tokio::test]
async fn create_review_embeds_text_once() {
    let (fixture, _temp_dir) = create_summarizer(FakeLanguageModel::new()).await;
    let book_id = seed_book(&fixture.database).await;

    let review = fixture
        .summarizer
        .create_review(book_id, 7, Some("A masterpiece of worldbuilding.".to_string()), 5)
        .await
        .expect("can create review");

    assert_eq!(review.rating, 5);
    assert!(review.vector().is_some());
    assert_eq!(fixture.embedder.single_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn create_review_without_text_has_no_embedding() {
    let (fixture, _temp_dir) = create_summarizer(FakeLanguageModel::new()).await;
    let book_id = seed_book(&fixture.database).await;

    let review = fixture
        .summarizer
        .create_review(book_id, 7, None, 4)
        .await
        .expect("can create review");
    assert_eq!(review.vector(), None);

    let blank = fixture
        .summarizer
        .create_review(book_id, 7, Some("   ".to_string()), 4)
        .await
        .expect("can create review");
    assert_eq!(blank.review_text, None);
    assert_eq!(blank.vector(), None);

    assert_eq!(fixture.embedder.single_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn create_review_validates_inputs() {
    let (fixture, _temp_dir) = create_summarizer(FakeLanguageModel::new()).await;
    let book_id = seed_book(&fixture.database).await;

    assert!(fixture.summarizer.create_review(book_id, 7, None, 0).await.is_err());
    assert!(fixture.summarizer.create_review(book_id, 7, None, 6).await.is_err());

    let error = fixture
        .summarizer
        .create_review(9999, 7, None, 3)
        .await
        .expect_err("missing book fails");
    assert!(matches!(error, BookragError::NotFound(_)));
}

#[tokio::test]
async fn embedding_failure_fails_review_creation() {
    let (database, _temp_dir) = create_test_database().await;
    let summarizer = ReviewSummarizer::new(
        database.clone(),
        Arc::new(FakeEmbedder::failing(2)),
        Arc::new(FakeLanguageModel::new()),
    );
    let book_id = seed_book(&database).await;

    let error = summarizer
        .create_review(book_id, 7, Some("text".to_string()), 5)
        .await
        .expect_err("provider failure propagates");
    assert!(matches!(error, BookragError::Provider(_)));

    // The unit of work failed: no review row was committed
    let reviews = ReviewQueries::list_by_book(database.pool(), book_id)
        .await
        .expect("can list reviews");
    assert!(reviews.is_empty());
}

#[tokio::test]
async fn summary_generates_and_caches() {
    let (fixture, _temp_dir) =
        create_summarizer(FakeLanguageModel::with_replies(&["Readers are enthralled."])).await;
    let book_id = seed_book(&fixture.database).await;

    fixture
        .summarizer
        .create_review(book_id, 7, Some("Loved it".to_string()), 5)
        .await
        .expect("can create review");

    let summary = fixture
        .summarizer
        .summary(book_id)
        .await
        .expect("can summarize");
    assert_eq!(summary, "Readers are enthralled.");
    assert_eq!(fixture.llm.call_count(), 1);

    // Second read is served from the cache without another model call
    let cached = fixture
        .summarizer
        .summary(book_id)
        .await
        .expect("can summarize");
    assert_eq!(cached, "Readers are enthralled.");
    assert_eq!(fixture.llm.call_count(), 1);

    let prompts = fixture.llm.prompts.lock().expect("prompts lock");
    assert!(prompts[0].contains("- Loved it"));
}

#[tokio::test]
async fn summary_without_texted_reviews_is_a_placeholder() {
    let (fixture, _temp_dir) = create_summarizer(FakeLanguageModel::new()).await;
    let book_id = seed_book(&fixture.database).await;

    // A rating-only review does not justify a model call
    fixture
        .summarizer
        .create_review(book_id, 7, None, 4)
        .await
        .expect("can create review");

    let summary = fixture
        .summarizer
        .summary(book_id)
        .await
        .expect("can summarize");
    assert_eq!(summary, NO_REVIEWS_PLACEHOLDER);
    assert_eq!(fixture.llm.call_count(), 0);

    // The cache stays empty
    let book = BookQueries::get_by_id(fixture.database.pool(), book_id)
        .await
        .expect("can fetch book")
        .expect("book exists");
    assert_eq!(book.ai_review_summary, None);
}

#[tokio::test]
async fn review_mutations_invalidate_cached_summary() {
    let (fixture, _temp_dir) = create_summarizer(FakeLanguageModel::with_replies(&[
        "First summary.",
        "Second summary.",
    ]))
    .await;
    let book_id = seed_book(&fixture.database).await;

    fixture
        .summarizer
        .create_review(book_id, 7, Some("Great".to_string()), 5)
        .await
        .expect("can create review");
    fixture.summarizer.summary(book_id).await.expect("can summarize");

    // A new review nulls the cache within the same unit of work
    let second = fixture
        .summarizer
        .create_review(book_id, 8, Some("Slow start".to_string()), 3)
        .await
        .expect("can create review");

    let book = BookQueries::get_by_id(fixture.database.pool(), book_id)
        .await
        .expect("can fetch book")
        .expect("book exists");
    assert_eq!(book.ai_review_summary, None);

    // Regenerated on the next read, including the new review
    let regenerated = fixture
        .summarizer
        .summary(book_id)
        .await
        .expect("can summarize");
    assert_eq!(regenerated, "Second summary.");

    // Deleting also invalidates
    fixture
        .summarizer
        .delete_review(second.id)
        .await
        .expect("can delete review");
    let book = BookQueries::get_by_id(fixture.database.pool(), book_id)
        .await
        .expect("can fetch book")
        .expect("book exists");
    assert_eq!(book.ai_review_summary, None);
}

#[tokio::test]
async fn delete_missing_review_is_not_found() {
    let (fixture, _temp_dir) = create_summarizer(FakeLanguageModel::new()).await;

    let error = fixture
        .summarizer
        .delete_review(42)
        .await
        .expect_err("missing review fails");
    assert!(matches!(error, BookragError::NotFound(_)));
}
