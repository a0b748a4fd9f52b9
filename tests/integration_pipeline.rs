#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End to end ingestion and retrieval over a LanceDB store with a local embedder

use async_trait::async_trait;
use notebook_rag::config::{IngestionConfig, RetrievalConfig};
use notebook_rag::database::{MetadataFilter, VectorStorage, VectorStore};
use notebook_rag::embeddings::{ChunkingConfig, Embedder};
use notebook_rag::indexer::{IngestionWriter, SourceDocument};
use notebook_rag::retrieval::{ContextPurpose, Retriever};
use notebook_rag::{RagError, Result};
use std::sync::Arc;
use tempfile::TempDir;

const DIMENSION: usize = 27;

/// Letter frequency embedding, enough to make related texts land close together
struct LetterFrequencyEmbedder;

#[async_trait]
impl Embedder for LetterFrequencyEmbedder {
    fn model_id(&self) -> &str {
        "letter-frequency"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; DIMENSION];
        if let Some(bias) = vector.last_mut() {
            *bias = 1.0;
        }
        for c in text.chars().filter(char::is_ascii_alphabetic) {
            let index = (c.to_ascii_lowercase() as u8 - b'a') as usize;
            if let Some(slot) = vector.get_mut(index) {
                *slot += 1.0;
            }
        }
        Ok(vector)
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init()
        .ok();
}

fn document(filename: &str, content: String) -> SourceDocument {
    SourceDocument {
        filename: filename.to_string(),
        content: Some(content),
        status: "extracted".to_string(),
        upload_status: Some("uploaded".to_string()),
        upload_path: Some(format!("uploads/{}", filename)),
    }
}

fn paragraph_text(chars: usize) -> String {
    let sentence = "Rivers carry sediment from the mountains to the sea. ";
    sentence.repeat(chars / sentence.len() + 1).chars().take(chars).collect()
}

async fn open_store(temp_dir: &TempDir) -> Arc<VectorStore> {
    Arc::new(
        VectorStore::open(&temp_dir.path().join("vectors"), DIMENSION)
            .await
            .expect("should create vector store"),
    )
}

fn ingestion(replace_existing: bool) -> IngestionConfig {
    IngestionConfig {
        batch_size: 2,
        batch_delay_ms: 0,
        replace_existing,
    }
}

fn writer(store: &Arc<VectorStore>, replace_existing: bool) -> IngestionWriter {
    IngestionWriter::new(
        Arc::new(LetterFrequencyEmbedder),
        Arc::clone(store) as Arc<dyn VectorStorage>,
        ChunkingConfig::default(),
        ingestion(replace_existing),
    )
}

fn retriever(store: &Arc<VectorStore>) -> Retriever {
    Retriever::new(
        Arc::new(LetterFrequencyEmbedder),
        Arc::clone(store) as Arc<dyn VectorStorage>,
        RetrievalConfig::default(),
    )
}

#[tokio::test]
async fn ingest_then_retrieve_within_notebook() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&temp_dir).await;

    let documents = vec![
        document("A.pdf", paragraph_text(2500)),
        document("B.pdf", "x".repeat(30)),
    ];
    let report = writer(&store, false)
        .ingest(&documents, "nb1")
        .await
        .expect("ingestion should succeed");

    assert!(report.success);
    assert_eq!(report.total_chunks, 3);
    assert_eq!(report.documents_stored, 3);
    assert_eq!(store.count().await.expect("should count rows"), 3);

    let results = retriever(&store)
        .retrieve("sediment in rivers", "nb1", 5)
        .await
        .expect("retrieval should succeed");

    assert_eq!(results.total_results, 3);
    assert_eq!(results.source_filenames(), vec!["A.pdf".to_string()]);

    let group = results.grouped.get("A.pdf").expect("A.pdf group");
    let indices: Vec<u32> = group.iter().map(|r| r.metadata.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(group.iter().all(|r| r.metadata.total_chunks == 3));
    assert!(
        group
            .iter()
            .all(|r| r.metadata.embedding_model == "letter-frequency")
    );
    assert!(
        results
            .results
            .windows(2)
            .all(|pair| pair[0].similarity >= pair[1].similarity)
    );
}

#[tokio::test]
async fn other_notebooks_never_leak() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&temp_dir).await;

    writer(&store, false)
        .ingest(&[document("A.pdf", paragraph_text(1200))], "nb1")
        .await
        .expect("nb1 ingestion should succeed");
    writer(&store, false)
        .ingest(
            &[document(
                "private.txt",
                "Quarterly revenue figures and confidential salary bands for staff. ".repeat(10),
            )],
            "nb2",
        )
        .await
        .expect("nb2 ingestion should succeed");

    let results = retriever(&store)
        .retrieve("confidential salary revenue", "nb1", 50)
        .await
        .expect("retrieval should succeed");

    assert!(!results.is_empty());
    assert!(results.results.iter().all(|r| r.metadata.notebook_id == "nb1"));
    assert!(!results.grouped.contains_key("private.txt"));

    let empty = retriever(&store)
        .retrieve("anything", "nb3", 5)
        .await
        .expect("retrieval should succeed");
    assert!(empty.is_empty());
}

#[tokio::test]
async fn summary_of_empty_notebook_has_no_content() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&temp_dir).await;

    let result = retriever(&store)
        .gather_context(ContextPurpose::Summary, "nb1", None)
        .await;
    assert!(matches!(result, Err(RagError::NoContent(_))));

    let chat = retriever(&store)
        .gather_context(ContextPurpose::Chat, "nb1", Some("hello"))
        .await
        .expect("chat context should succeed");
    assert!(chat.is_empty());
}

#[tokio::test]
async fn mindmap_context_covers_notebook_documents() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&temp_dir).await;

    writer(&store, false)
        .ingest(
            &[
                document("A.pdf", paragraph_text(2500)),
                document(
                    "C.md",
                    "Glaciers grind bedrock into fine flour that rivers later carry. ".repeat(4),
                ),
            ],
            "nb1",
        )
        .await
        .expect("ingestion should succeed");

    let context = retriever(&store)
        .gather_context(ContextPurpose::Mindmap, "nb1", None)
        .await
        .expect("mindmap context should succeed");

    assert_eq!(context.total_results, 4);
    let mut sources = context.source_filenames();
    sources.sort();
    assert_eq!(sources, vec!["A.pdf".to_string(), "C.md".to_string()]);
    assert!(context.combined_content().contains("Glaciers"));
}

#[tokio::test]
async fn reingest_duplicates_unless_replacing() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&temp_dir).await;
    let documents = vec![document("A.pdf", paragraph_text(2500))];

    for _ in 0..2 {
        writer(&store, false)
            .ingest(&documents, "nb1")
            .await
            .expect("ingestion should succeed");
    }
    assert_eq!(store.count().await.expect("should count rows"), 6);

    writer(&store, true)
        .ingest(&documents, "nb1")
        .await
        .expect("replacing ingestion should succeed");
    assert_eq!(store.count().await.expect("should count rows"), 3);

    store
        .delete_matching(&MetadataFilter::notebook("nb1").with_filename("A.pdf"))
        .await
        .expect("delete should succeed");
    assert_eq!(store.count().await.expect("should count rows"), 0);
}

#[tokio::test]
async fn nothing_to_ingest_writes_nothing() {
    init_test_tracing();
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = open_store(&temp_dir).await;

    let result = writer(&store, false)
        .ingest(&[document("B.pdf", "x".repeat(30))], "nb1")
        .await;

    assert!(matches!(result, Err(RagError::NoContent(_))));
    assert_eq!(store.count().await.expect("should count rows"), 0);
}
