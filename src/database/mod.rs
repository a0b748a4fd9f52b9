// Database module
// Stored chunk records, the metadata filter and the vector storage capability

pub mod lancedb;


use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{RagError, Result};

pub use self::lancedb::VectorStore;

/// Where a chunk sits inside its ingestion call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPosition {
    /// Position of the source document within the ingestion call
    pub document_index: u32,
    /// Position of the chunk within its document
    pub chunk_index: u32,
    /// Number of chunks stored for the document
    pub total_chunks: u32,
}

/// Metadata persisted alongside every chunk vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    /// Owning notebook, the only isolation key for retrieval
    pub notebook_id: String,
    pub filename: String,
    /// Provenance flags from the extraction and upload stage, passed through untouched
    pub status: String,
    pub upload_status: Option<String>,
    pub upload_path: Option<String>,
    pub document_index: u32,
    pub chunk_index: u32,
    pub total_chunks: u32,
    /// Length of the chunk content in characters
    pub chunk_size: u32,
    /// RFC 3339 ingestion timestamp
    pub created_at: String,
    /// Set only when chunking failed and the document was stored truncated
    pub truncated: bool,
    /// Model that produced the stored vector
    pub embedding_model: String,
}

/// Upload provenance copied from the source document
#[derive(Debug, Clone, Copy)]
pub struct Provenance<'a> {
    pub filename: &'a str,
    pub status: &'a str,
    pub upload_status: Option<&'a str>,
    pub upload_path: Option<&'a str>,
}

impl DocumentMetadata {
    /// Build metadata for one chunk, rejecting blank identifiers and out of range positions
    #[inline]
    pub fn new(
        notebook_id: &str,
        provenance: Provenance<'_>,
        position: ChunkPosition,
        content: &str,
        truncated: bool,
    ) -> Result<Self> {
        if notebook_id.trim().is_empty() {
            return Err(RagError::Configuration(
                "notebook id is required for chunk metadata".to_string(),
            ));
        }
        if provenance.filename.trim().is_empty() {
            return Err(RagError::Configuration(
                "filename is required for chunk metadata".to_string(),
            ));
        }
        if position.chunk_index >= position.total_chunks {
            return Err(RagError::Configuration(format!(
                "chunk index {} out of range for {} chunks",
                position.chunk_index, position.total_chunks
            )));
        }

        let chunk_size = u32::try_from(content.chars().count()).map_err(|_| {
            RagError::Configuration(format!(
                "chunk of {} bytes is too large to store",
                content.len()
            ))
        })?;

        Ok(Self {
            notebook_id: notebook_id.to_string(),
            filename: provenance.filename.to_string(),
            status: provenance.status.to_string(),
            upload_status: provenance.upload_status.map(str::to_string),
            upload_path: provenance.upload_path.map(str::to_string),
            document_index: position.document_index,
            chunk_index: position.chunk_index,
            total_chunks: position.total_chunks,
            chunk_size,
            created_at: Utc::now().to_rfc3339(),
            truncated,
            embedding_model: String::new(),
        })
    }

    #[inline]
    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = model.to_string();
        self
    }
}

/// The persisted unit: one embedded chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVector {
    /// Unique row identifier
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// A stored chunk returned by a similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Higher is more similar
    pub similarity: f32,
    pub distance: f32,
}

/// Equality predicate over chunk metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub notebook_id: String,
    pub filename: Option<String>,
}

impl MetadataFilter {
    #[inline]
    pub fn notebook(notebook_id: &str) -> Self {
        Self {
            notebook_id: notebook_id.to_string(),
            filename: None,
        }
    }

    #[inline]
    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    /// Whether a stored chunk satisfies the predicate
    #[inline]
    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        metadata.notebook_id == self.notebook_id
            && self
                .filename
                .as_ref()
                .is_none_or(|filename| *filename == metadata.filename)
    }

    /// SQL predicate with string literals escaped
    #[inline]
    pub fn to_sql(&self) -> String {
        let notebook = escape_literal(&self.notebook_id);
        self.filename.as_deref().map_or_else(
            || format!("notebook_id = '{}'", notebook),
            |filename| {
                format!(
                    "notebook_id = '{}' AND filename = '{}'",
                    notebook,
                    escape_literal(filename)
                )
            },
        )
    }
}

fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Persistent nearest-neighbour storage for embedded chunks.
///
/// Methods take `&self` so concurrent ingestion and retrieval calls can share
/// one store.
#[async_trait]
pub trait VectorStorage: Send + Sync {
    /// Bulk insert; no upsert or merge
    async fn write(&self, rows: Vec<StoredVector>) -> Result<()>;

    /// Up to `limit` rows matching `filter`, best match first
    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchResult>>;

    /// Remove every row matching `filter`
    async fn delete_matching(&self, filter: &MetadataFilter) -> Result<()>;

    /// Number of stored rows
    async fn count(&self) -> Result<u64>;
}
