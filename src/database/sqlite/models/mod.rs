
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub year_published: Option<i64>,
    pub summary: Option<String>,
    pub ai_review_summary: Option<String>,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
    pub year_published: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub book_id: Option<i64>,
    pub filename: String,
    pub file_path: String,
    pub status: DocumentStatus,
    pub upload_date: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Ready,
    Failed,
}

impl std::fmt::Display for DocumentStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            DocumentStatus::Uploaded => write!(f, "Uploaded"),
            DocumentStatus::Processing => write!(f, "Processing"),
            DocumentStatus::Ready => write!(f, "Ready"),
            DocumentStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub book_id: Option<i64>,
    pub filename: String,
    pub file_path: String,
}

/// Provenance metadata attached to a chunk when its document is linked to a book
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub book_id: Option<i64>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub book_id: Option<i64>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub embedding: Vec<u8>,
}

impl Chunk {
    /// Decode the stored embedding BLOB into a vector
    #[inline]
    pub fn vector(&self) -> Vec<f32> {
        blob_to_vec(&self.embedding)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub review_text: Option<String>,
    pub rating: i64,
    pub embedding: Option<Vec<u8>>,
    pub created_date: NaiveDateTime,
}

impl Review {
    /// Decode the stored review-text embedding, if one was computed at creation
    #[inline]
    pub fn vector(&self) -> Option<Vec<f32>> {
        self.embedding.as_deref().map(blob_to_vec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub book_id: i64,
    pub user_id: i64,
    pub review_text: Option<String>,
    pub rating: i64,
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.status == DocumentStatus::Ready
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == DocumentStatus::Failed
    }
}

/// Encode an embedding vector as little-endian bytes for BLOB storage
#[inline]
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decode a BLOB of little-endian bytes back into an embedding vector
#[inline]
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}
