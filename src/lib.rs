use thiserror::Error;

use crate::embeddings::chunking::ChunkingError;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("Batch write error: {0}")]
    BatchWrite(String),

    #[error("No content: {0}")]
    NoContent(String),

    #[error("Retrieval error: {message}")]
    Retrieval {
        message: String,
        #[source]
        source: Box<RagError>,
    },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Wrap an embedding or store failure that happened while searching
    #[inline]
    pub fn retrieval(message: impl Into<String>, source: Self) -> Self {
        Self::Retrieval {
            message: message.into(),
            source: Box::new(source),
        }
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod retrieval;
