// Retrieval module
// Notebook scoped similarity search and context gathering


use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::RetrievalConfig;
use crate::database::{MetadataFilter, SearchResult, VectorStorage};
use crate::embeddings::Embedder;
use crate::{RagError, Result};

pub const SUMMARY_QUERY: &str = "document content summary overview";
pub const MINDMAP_QUERY: &str = "document content overview structure topics themes concepts";

/// Ranked search results for one notebook
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResults {
    /// Best match first
    pub results: Vec<SearchResult>,
    /// Results per filename in reading order
    pub grouped: BTreeMap<String, Vec<SearchResult>>,
    pub total_results: usize,
}

impl RetrievalResults {
    #[inline]
    pub fn new(results: Vec<SearchResult>) -> Self {
        let grouped = results
            .iter()
            .cloned()
            .into_group_map_by(|result| result.metadata.filename.clone())
            .into_iter()
            .map(|(filename, mut chunks)| {
                chunks.sort_by_key(|chunk| {
                    (chunk.metadata.chunk_index, chunk.metadata.document_index)
                });
                (filename, chunks)
            })
            .collect();

        Self {
            total_results: results.len(),
            results,
            grouped,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Ranked chunk contents separated by blank lines
    #[inline]
    pub fn combined_content(&self) -> String {
        self.results
            .iter()
            .map(|result| result.content.as_str())
            .join("\n\n")
    }

    /// Distinct source filenames in rank order
    #[inline]
    pub fn source_filenames(&self) -> Vec<String> {
        self.results
            .iter()
            .map(|result| result.metadata.filename.clone())
            .unique()
            .collect()
    }
}

/// What retrieved context is going to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextPurpose {
    Chat,
    Summary,
    Mindmap,
}

impl ContextPurpose {
    /// Built in query used when the caller supplies none
    #[inline]
    pub fn default_query(self) -> Option<&'static str> {
        match self {
            Self::Chat => None,
            Self::Summary => Some(SUMMARY_QUERY),
            Self::Mindmap => Some(MINDMAP_QUERY),
        }
    }

    #[inline]
    pub fn max_results(self, config: &RetrievalConfig) -> usize {
        match self {
            Self::Chat => config.chat_results,
            Self::Summary => config.summary_results,
            Self::Mindmap => config.mindmap_results,
        }
    }
}

impl fmt::Display for ContextPurpose {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chat => "chat",
            Self::Summary => "summary",
            Self::Mindmap => "mindmap",
        };
        f.write_str(name)
    }
}

impl FromStr for ContextPurpose {
    type Err = RagError;

    #[inline]
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "summary" => Ok(Self::Summary),
            "mindmap" => Ok(Self::Mindmap),
            other => Err(RagError::Configuration(format!(
                "unknown context purpose: {}",
                other
            ))),
        }
    }
}

/// Similarity search restricted to a single notebook
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStorage>,
    config: RetrievalConfig,
}

impl Retriever {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStorage>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Retrieve up to `max_results` chunks of `notebook_id` most similar to `query`.
    ///
    /// Rows belonging to any other notebook are discarded even if the store
    /// returns them, as are rows embedded by a different model than the
    /// query.
    #[inline]
    pub async fn retrieve(
        &self,
        query: &str,
        notebook_id: &str,
        max_results: usize,
    ) -> Result<RetrievalResults> {
        if query.trim().is_empty() {
            return Err(RagError::Configuration("query must not be blank".to_string()));
        }
        if notebook_id.trim().is_empty() {
            return Err(RagError::Configuration(
                "notebook id is required for retrieval".to_string(),
            ));
        }
        if max_results == 0 {
            return Err(RagError::Configuration(
                "max results must be greater than 0".to_string(),
            ));
        }

        debug!(
            "Retrieving up to {} chunks from notebook {}",
            max_results, notebook_id
        );

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| RagError::retrieval("failed to embed query", e))?;

        let model = self.embedder.model_id();
        let filter = MetadataFilter::notebook(notebook_id);
        let candidates = self
            .store
            .query(&vector, max_results, &filter)
            .await
            .map_err(|e| RagError::retrieval("vector search failed", e))?;

        let results: Vec<SearchResult> = candidates
            .into_iter()
            .filter(|result| {
                let allowed = filter.matches(&result.metadata);
                if !allowed {
                    error!(
                        "Dropping chunk of notebook {} returned for notebook {}",
                        result.metadata.notebook_id, notebook_id
                    );
                }
                allowed
            })
            .filter(|result| {
                let same_model = result.metadata.embedding_model == model;
                if !same_model {
                    warn!(
                        "Dropping chunk of {} embedded with {}, query used {}",
                        result.metadata.filename, result.metadata.embedding_model, model
                    );
                }
                same_model
            })
            .sorted_by(|a, b| b.similarity.total_cmp(&a.similarity))
            .take(max_results)
            .collect();

        debug!(
            "Retrieved {} chunks from notebook {}",
            results.len(),
            notebook_id
        );
        Ok(RetrievalResults::new(results))
    }

    /// Gather context for `purpose`.
    ///
    /// Chat context degrades to empty when retrieval fails. Summary and
    /// mindmap context must not be empty.
    #[inline]
    pub async fn gather_context(
        &self,
        purpose: ContextPurpose,
        notebook_id: &str,
        query: Option<&str>,
    ) -> Result<RetrievalResults> {
        let Some(query) = query
            .filter(|query| !query.trim().is_empty())
            .or_else(|| purpose.default_query())
        else {
            return Err(RagError::Configuration(format!(
                "a query is required for {} context",
                purpose
            )));
        };

        let max_results = purpose.max_results(&self.config);
        let retrieved = self.retrieve(query, notebook_id, max_results).await;

        match purpose {
            ContextPurpose::Chat => match retrieved {
                Err(RagError::Retrieval { message, source }) => {
                    warn!(
                        "Continuing chat in notebook {} without context: {}: {}",
                        notebook_id, message, source
                    );
                    Ok(RetrievalResults::default())
                }
                other => other,
            },
            ContextPurpose::Summary | ContextPurpose::Mindmap => {
                let results = retrieved?;
                if results.is_empty() {
                    return Err(RagError::NoContent(format!(
                        "no documents found in notebook {} for {}",
                        notebook_id, purpose
                    )));
                }
                Ok(results)
            }
        }
    }
}
