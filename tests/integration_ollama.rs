#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Ollama client tests against a mocked embedding server

use notebook_rag::RagError;
use notebook_rag::config::OllamaConfig;
use notebook_rag::embeddings::{Embedder, OllamaClient};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TEST_MODEL: &str = "test-model";
const DIMENSION: u32 = 3;

/// Answers every embed request with one vector per input
struct EchoEmbeddings {
    dimension: usize,
}

impl Respond for EchoEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let inputs = body["input"].as_array().map_or(0, Vec::len);
        let embeddings: Vec<Vec<f32>> = (0..inputs)
            .map(|i| (0..self.dimension).map(|d| (i + d) as f32 * 0.1).collect())
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn client_for(server: &MockServer, batch_size: u32) -> OllamaClient {
    let address = server.address();
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: address.ip().to_string(),
        port: address.port(),
        model: TEST_MODEL.to_string(),
        batch_size,
        embedding_dimension: DIMENSION,
    };

    OllamaClient::new(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(3)
        .with_backoff_unit(Duration::from_millis(1))
}

fn texts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("chunk number {}", i)).collect()
}

#[tokio::test]
async fn embeds_single_text() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "model": TEST_MODEL, "input": ["hello"] })))
        .respond_with(EchoEmbeddings { dimension: 3 })
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let vector = client.embed("hello").await.expect("embedding should succeed");

    assert_eq!(vector.len(), 3);
    assert_eq!(client.model_id(), TEST_MODEL);
}

#[tokio::test]
async fn large_inputs_are_split_by_batch_size() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EchoEmbeddings { dimension: 3 })
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, 2);
    let vectors = client
        .embed_batch(&texts(5))
        .await
        .expect("embedding should succeed");

    assert_eq!(vectors.len(), 5);
    assert!(vectors.iter().all(|v| v.len() == 3));
}

#[tokio::test]
async fn wrong_dimension_is_rejected() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EchoEmbeddings { dimension: 4 })
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let result = client.embed_batch(&texts(2)).await;

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn count_mismatch_is_rejected() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.1, 0.2, 0.3]] })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let result = client.embed_batch(&texts(2)).await;

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let result = client.embed("hello").await;

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn server_errors_are_retried() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let result = client.embed("hello").await;

    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn recovers_after_transient_server_error() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EchoEmbeddings { dimension: 3 })
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let vector = client.embed("hello").await.expect("retry should succeed");

    assert_eq!(vector.len(), 3);
}

#[tokio::test]
async fn health_check_validates_model() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": TEST_MODEL, "size": 274_302_450, "digest": "abc123" },
                { "name": "other-model" }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let result = tokio::task::spawn_blocking(move || {
        let models = client.list_models()?;
        client.health_check()?;
        Ok::<_, anyhow::Error>(models)
    })
    .await
    .expect("blocking task should finish");

    let models = result.expect("health check should pass");
    assert_eq!(models.len(), 2);
    assert_eq!(models[0].digest.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn health_check_reports_missing_model() {
    init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "models": [{ "name": "other-model" }] })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 16);
    let result = tokio::task::spawn_blocking(move || (client.ping(), client.validate_model()))
        .await
        .expect("blocking task should finish");

    assert!(result.0.is_ok());
    assert!(result.1.is_err());
}
