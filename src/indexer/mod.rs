// Indexer module
// Turns extracted source documents into embedded, notebook scoped chunks


use std::collections::HashSet;
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::IngestionConfig;
use crate::database::{
    ChunkPosition, DocumentMetadata, MetadataFilter, Provenance, StoredVector, VectorStorage,
};
use crate::embeddings::Embedder;
use crate::embeddings::chunking::{ChunkingConfig, split_text, truncated_fallback};
use crate::{RagError, Result};

/// A document handed over by the extraction and upload stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub filename: String,
    /// Extracted text; documents without content are skipped
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub upload_status: Option<String>,
    #[serde(default)]
    pub upload_path: Option<String>,
}

/// Outcome of one ingestion call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub success: bool,
    /// Chunks persisted by successful batches
    pub documents_stored: usize,
    /// Chunks attempted across all batches
    pub total_chunks: usize,
    pub notebook_id: String,
}

/// Observer for batch level ingestion progress
pub trait IngestionProgress: Send + Sync {
    /// Called before a batch is embedded. `batch` is zero-based.
    fn batch_started(&self, batch: usize, total_batches: usize, chunks: usize);

    /// Called after a batch completes; `stored` is zero when the batch failed
    fn batch_finished(&self, batch: usize, total_batches: usize, stored: usize);
}

/// A chunk ready to be embedded
#[derive(Debug, Clone)]
struct PendingChunk {
    content: String,
    metadata: DocumentMetadata,
}

/// Chunks, embeds and stores documents for a notebook in paced batches
pub struct IngestionWriter {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStorage>,
    chunking: ChunkingConfig,
    ingestion: IngestionConfig,
    progress: Option<Arc<dyn IngestionProgress>>,
}

impl IngestionWriter {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStorage>,
        chunking: ChunkingConfig,
        ingestion: IngestionConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            chunking,
            ingestion,
            progress: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn IngestionProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Ingest `documents` into `notebook_id`.
    ///
    /// Batches are processed one at a time with a pause between them. A batch
    /// that fails to embed or store is logged and skipped, so the report may
    /// show fewer stored chunks than were attempted.
    #[inline]
    pub async fn ingest(
        &self,
        documents: &[SourceDocument],
        notebook_id: &str,
    ) -> Result<IngestionReport> {
        if notebook_id.trim().is_empty() {
            return Err(RagError::Configuration(
                "notebook id is required for ingestion".to_string(),
            ));
        }

        info!(
            "Ingesting {} documents into notebook {}",
            documents.len(),
            notebook_id
        );

        let chunks = self.prepare_chunks(documents, notebook_id)?;
        if chunks.is_empty() {
            return Err(RagError::NoContent(format!(
                "no chunks were produced for notebook {}",
                notebook_id
            )));
        }

        let batch_size = self.ingestion.batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);
        let delay = self.ingestion.batch_delay();
        let mut documents_stored = 0;
        let mut replaced = HashSet::new();

        for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            if let Some(progress) = &self.progress {
                progress.batch_started(batch_index, total_batches, batch.len());
            }

            let stored = match self.write_batch(batch, notebook_id, &mut replaced).await {
                Ok(stored) => {
                    debug!(
                        "Stored batch {}/{} ({} chunks)",
                        batch_index + 1,
                        total_batches,
                        stored
                    );
                    stored
                }
                Err(e) => {
                    let failure = RagError::BatchWrite(format!(
                        "batch {}/{} of notebook {} skipped: {}",
                        batch_index + 1,
                        total_batches,
                        notebook_id,
                        e
                    ));
                    error!("{}", failure);
                    0
                }
            };
            documents_stored += stored;

            if let Some(progress) = &self.progress {
                progress.batch_finished(batch_index, total_batches, stored);
            }

            if batch_index + 1 < total_batches && !delay.is_zero() {
                sleep(delay).await;
            }
        }

        info!(
            "Ingestion into notebook {} finished: {}/{} chunks stored",
            notebook_id,
            documents_stored,
            chunks.len()
        );

        Ok(IngestionReport {
            success: true,
            documents_stored,
            total_chunks: chunks.len(),
            notebook_id: notebook_id.to_string(),
        })
    }

    /// Chunk every document in input order into one flat list
    fn prepare_chunks(
        &self,
        documents: &[SourceDocument],
        notebook_id: &str,
    ) -> Result<Vec<PendingChunk>> {
        let model = self.embedder.model_id();
        let mut pending = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            if document.filename.trim().is_empty() {
                warn!("Skipping document {}: it has no filename", index);
                continue;
            }

            let Some(content) = document
                .content
                .as_deref()
                .filter(|content| !content.trim().is_empty())
            else {
                info!("Skipping {}: no content to ingest", document.filename);
                continue;
            };

            let (texts, truncated) = match split_text(content, &self.chunking) {
                Ok(texts) => (texts, false),
                Err(e) => {
                    warn!(
                        "Chunking {} failed, storing a truncated copy: {}",
                        document.filename, e
                    );
                    (vec![truncated_fallback(content)], true)
                }
            };

            if texts.is_empty() {
                info!(
                    "Skipping {}: no chunks reached the minimum size",
                    document.filename
                );
                continue;
            }

            let document_index = to_u32(index, "document index")?;
            let total_chunks = to_u32(texts.len(), "chunk count")?;
            let provenance = Provenance {
                filename: &document.filename,
                status: &document.status,
                upload_status: document.upload_status.as_deref(),
                upload_path: document.upload_path.as_deref(),
            };

            for (chunk_index, text) in (0..total_chunks).zip(texts) {
                let position = ChunkPosition {
                    document_index,
                    chunk_index,
                    total_chunks,
                };
                let metadata =
                    DocumentMetadata::new(notebook_id, provenance, position, &text, truncated)?
                        .with_embedding_model(model);
                pending.push(PendingChunk {
                    content: text,
                    metadata,
                });
            }

            debug!(
                "Prepared {} chunks from {}",
                total_chunks, document.filename
            );
        }

        Ok(pending)
    }

    /// Delete previously stored chunks of the filenames this batch writes first.
    /// `replaced` tracks the filenames already cleared during this call.
    async fn remove_existing(
        &self,
        batch: &[PendingChunk],
        notebook_id: &str,
        replaced: &mut HashSet<String>,
    ) -> Result<()> {
        let fresh: Vec<String> = batch
            .iter()
            .map(|chunk| chunk.metadata.filename.as_str())
            .unique()
            .filter(|filename| !replaced.contains(*filename))
            .map(str::to_string)
            .collect();

        for filename in fresh {
            debug!(
                "Removing stored chunks of {} from notebook {}",
                filename, notebook_id
            );
            self.store
                .delete_matching(&MetadataFilter::notebook(notebook_id).with_filename(&filename))
                .await?;
            replaced.insert(filename);
        }
        Ok(())
    }

    /// Embed and store one batch, returning the number of chunks written.
    /// With `replace_existing`, old chunks are only removed once the batch has
    /// its embeddings.
    async fn write_batch(
        &self,
        batch: &[PendingChunk],
        notebook_id: &str,
        replaced: &mut HashSet<String>,
    ) -> Result<usize> {
        let texts: Vec<String> = batch.iter().map(|chunk| chunk.content.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;

        if vectors.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, received {}",
                batch.len(),
                vectors.len()
            )));
        }

        let rows: Vec<StoredVector> = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| StoredVector {
                id: Uuid::new_v4().to_string(),
                vector,
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
            })
            .collect();

        if self.ingestion.replace_existing {
            self.remove_existing(batch, notebook_id, replaced).await?;
        }

        let written = rows.len();
        self.store.write(rows).await?;
        Ok(written)
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| RagError::Configuration(format!("{} {} exceeds the supported range", what, value)))
}
