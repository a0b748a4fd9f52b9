use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{MetadataFilter, SearchResult, VectorStorage, VectorStore};
use crate::embeddings::{Embedder, OllamaClient, estimate_chunks};
use crate::indexer::{IngestionProgress, IngestionReport, IngestionWriter, SourceDocument};
use crate::retrieval::{ContextPurpose, RetrievalResults, Retriever};

const PREVIEW_CHARS: usize = 160;

/// Drives an `indicatif` bar from ingestion batch callbacks
struct BatchProgressBar {
    bar: ProgressBar,
}

impl BatchProgressBar {
    fn new() -> Self {
        let bar = if console::user_attended_stderr() {
            let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            ProgressBar::new_spinner().with_style(style)
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl IngestionProgress for BatchProgressBar {
    fn batch_started(&self, _batch: usize, total_batches: usize, chunks: usize) {
        self.bar.set_length(total_batches as u64);
        self.bar.set_message(format!("{} chunks", chunks));
    }

    fn batch_finished(&self, _batch: usize, _total_batches: usize, _stored: usize) {
        self.bar.inc(1);
    }
}

async fn open_pipeline(config: &Config) -> Result<(Arc<dyn Embedder>, Arc<VectorStore>)> {
    let client = OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    let store = VectorStore::new(config)
        .await
        .context("Failed to initialize LanceDB vector store")?;
    Ok((Arc::new(client), Arc::new(store)))
}

async fn open_retriever(config: &Config) -> Result<Retriever> {
    let (embedder, store) = open_pipeline(config).await?;
    Ok(Retriever::new(
        embedder,
        store as Arc<dyn VectorStorage>,
        config.retrieval.clone(),
    ))
}

/// Ingest a JSON array of source documents into a notebook
#[inline]
pub async fn ingest_file(file: &Path, notebook_id: &str) -> Result<IngestionReport> {
    let config = Config::load_default().context("Failed to load configuration")?;

    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let documents: Vec<SourceDocument> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of documents", file.display()))?;

    let estimated: usize = documents
        .iter()
        .filter_map(|document| document.content.as_deref())
        .map(|content| estimate_chunks(content, &config.chunking))
        .sum();
    info!(
        "Read {} documents from {} (about {} chunks)",
        documents.len(),
        file.display(),
        estimated
    );

    let (embedder, store) = open_pipeline(&config).await?;
    let progress = Arc::new(BatchProgressBar::new());
    let writer = IngestionWriter::new(
        embedder,
        Arc::clone(&store) as Arc<dyn VectorStorage>,
        config.chunking.clone(),
        config.ingestion.clone(),
    )
    .with_progress(Arc::clone(&progress) as Arc<dyn IngestionProgress>);

    let report = writer.ingest(&documents, notebook_id).await;
    progress.finish();
    let report = report?;

    if report.documents_stored < report.total_chunks {
        warn!(
            "{} of {} chunks could not be stored",
            report.total_chunks - report.documents_stored,
            report.total_chunks
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report)
}

/// Run a similarity search inside a notebook and print ranked and grouped results
#[inline]
pub async fn search_notebook(query: &str, notebook_id: &str, limit: Option<usize>) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let retriever = open_retriever(&config).await?;
    let limit = limit.unwrap_or(config.retrieval.chat_results);

    let results = retriever.retrieve(query, notebook_id, limit).await?;
    print_results(query, notebook_id, &results);
    Ok(())
}

fn print_results(query: &str, notebook_id: &str, results: &RetrievalResults) {
    if results.is_empty() {
        println!("No results for \"{}\" in notebook {}.", query, notebook_id);
        return;
    }

    println!(
        "🔎 {} results for \"{}\" in notebook {}",
        results.total_results, query, notebook_id
    );
    println!();

    for (rank, result) in results.results.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {} (chunk {}/{})",
            rank + 1,
            result.similarity,
            result.metadata.filename,
            result.metadata.chunk_index + 1,
            result.metadata.total_chunks
        );
        println!("     {}", preview(result));
    }

    println!();
    println!("Sources:");
    for (filename, chunks) in &results.grouped {
        let indices: Vec<String> = chunks
            .iter()
            .map(|chunk| chunk.metadata.chunk_index.to_string())
            .collect();
        println!("   📄 {}: chunks {}", filename, indices.join(", "));
    }
}

fn preview(result: &SearchResult) -> String {
    let flattened = result.content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() > PREVIEW_CHARS {
        let cut: String = flattened.chars().take(PREVIEW_CHARS).collect();
        format!("{}…", cut)
    } else {
        flattened
    }
}

/// Print the context gathered for a chat, summary or mindmap request
#[inline]
pub async fn show_context(
    purpose: ContextPurpose,
    notebook_id: &str,
    query: Option<&str>,
) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let retriever = open_retriever(&config).await?;

    let context = retriever.gather_context(purpose, notebook_id, query).await?;
    if context.is_empty() {
        println!("No {} context available for notebook {}.", purpose, notebook_id);
        return Ok(());
    }

    println!("{}", context.combined_content());
    println!();
    println!("Sources: {}", context.source_filenames().join(", "));
    Ok(())
}

/// Delete stored chunks of a notebook, optionally only those of one file
#[inline]
pub async fn delete_documents(notebook_id: &str, filename: Option<&str>) -> Result<()> {
    if notebook_id.trim().is_empty() {
        anyhow::bail!("A notebook id is required");
    }

    let config = Config::load_default().context("Failed to load configuration")?;
    let store = VectorStore::new(&config)
        .await
        .context("Failed to initialize LanceDB vector store")?;

    let mut filter = MetadataFilter::notebook(notebook_id);
    if let Some(filename) = filename {
        filter = filter.with_filename(filename);
    }

    let before = store.count().await?;
    store.delete_matching(&filter).await?;
    let after = store.count().await?;

    match filename {
        Some(filename) => println!(
            "Deleted {} chunks of {} from notebook {}",
            before.saturating_sub(after),
            filename,
            notebook_id
        ),
        None => println!(
            "Deleted {} chunks from notebook {}",
            before.saturating_sub(after),
            notebook_id
        ),
    }
    Ok(())
}

/// Compact the vector table and optionally build the vector index
#[inline]
pub async fn optimize_store(build_index: bool) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let store = VectorStore::new(&config)
        .await
        .context("Failed to initialize LanceDB vector store")?;

    store.optimize().await?;
    println!("✅ Vector table compacted");

    if build_index {
        store.create_vector_index().await?;
        println!("✅ Vector index built");
    }
    Ok(())
}

/// Show the health of the embedding service and the vector store
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load_default().unwrap_or_default();

    println!("📊 Notebook RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                match client.validate_model() {
                    Ok(()) => println!("   📋 Model: {}", client.model()),
                    Err(e) => println!("   ⚠️  Model: {} unavailable - {}", client.model(), e),
                }
                println!("   🔢 Dimension: {}", config.ollama.embedding_dimension);
            }
            Err(e) => {
                println!("   ❌ Ollama: Unreachable - {}", e);
            }
        },
        Err(e) => {
            println!("   ❌ Ollama: Invalid configuration - {}", e);
        }
    }

    println!();
    println!("🔍 Vector Database Status:");
    match VectorStore::new(&config).await {
        Ok(store) => {
            println!(
                "   ✅ LanceDB: Connected ({})",
                config.vector_database_path().display()
            );
            match store.count().await {
                Ok(count) => println!("   🧩 Stored chunks: {}", count),
                Err(e) => println!("   ⚠️  Stored chunks: unavailable - {}", e),
            }
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to open - {}", e);
        }
    }

    println!();
    println!("⚙️  Ingestion:");
    println!(
        "   Chunk size {} / overlap {} / minimum {}",
        config.chunking.chunk_size, config.chunking.chunk_overlap, config.chunking.min_chunk_size
    );
    println!(
        "   Batches of {} with {}ms between them",
        config.ingestion.batch_size, config.ingestion.batch_delay_ms
    );

    Ok(())
}
