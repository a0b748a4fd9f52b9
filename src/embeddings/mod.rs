// Embeddings module
// Text chunking and the embedding capability used by ingestion and retrieval

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{ChunkingConfig, ChunkingError, estimate_chunks, split_text};
pub use ollama::OllamaClient;

/// Converts text into fixed-dimension vectors.
///
/// Ingestion and retrieval must share one implementation (and one model) so
/// stored and query vectors are comparable.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the model producing the vectors, persisted with every chunk
    fn model_id(&self) -> &str;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, returning one vector per input in the same order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}
