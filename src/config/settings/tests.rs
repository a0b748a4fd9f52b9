use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.embedding_dimension, 768);
    assert_eq!(config.ingestion.batch_size, 10);
    assert_eq!(config.ingestion.batch_delay(), Duration::from_millis(500));
    assert!(!config.ingestion.replace_existing);
    assert_eq!(config.retrieval.chat_results, 5);
    assert_eq!(config.retrieval.summary_results, 10);
    assert_eq!(config.retrieval.mindmap_results, 50);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.chunking.chunk_overlap = invalid_config.chunking.chunk_size;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::OverlapTooLarge(1000, 1000))
    ));

    let mut invalid_config = config.clone();
    invalid_config.chunking.min_chunk_size = 5000;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::MinChunkSizeTooLarge(5000, 1000))
    ));

    let mut invalid_config = config.clone();
    invalid_config.ingestion.batch_size = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidIngestionBatchSize(0))
    ));

    let mut invalid_config = config;
    invalid_config.retrieval.mindmap_results = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidResultCount("mindmap", 0))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config {
        base_dir: PathBuf::new(),
        ..Config::default()
    };
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_defaults() {
    let partial_toml = r#"
        [ingestion]
        batch_size = 25
    "#;

    let config: Config = toml::from_str(partial_toml).expect("should parse partial toml");

    assert_eq!(config.ingestion.batch_size, 25);
    assert_eq!(config.ingestion.batch_delay_ms, 500);
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.chunking, ChunkingConfig::default());
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig {
        model: "test-model".to_string(),
        batch_size: 32,
        ..OllamaConfig::default()
    };

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_model("new-model".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());
    assert!(config.set_embedding_dimension(1024).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_model(String::new()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_embedding_dimension(8).is_err());
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config::load(temp_dir.path()).expect("missing config should load defaults");
    assert_eq!(config.base_dir, temp_dir.path());

    config.ingestion.replace_existing = true;
    config.retrieval.chat_results = 8;
    config.save().expect("config should save");

    let loaded = Config::load(temp_dir.path()).expect("saved config should load");
    assert!(loaded.ingestion.replace_existing);
    assert_eq!(loaded.retrieval.chat_results, 8);
    assert_eq!(loaded.vector_database_path(), temp_dir.path().join("vectors"));
}

#[test]
fn load_rejects_invalid_file() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nchunk_size = 10\n",
    )
    .expect("should write config file");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
#[serial]
fn home_override_from_environment() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    // SAFETY: serialized with every other test touching the environment
    unsafe { std::env::set_var(HOME_ENV_VAR, temp_dir.path()) };
    let dir = Config::config_dir();
    // SAFETY: as above
    unsafe { std::env::remove_var(HOME_ENV_VAR) };

    assert_eq!(dir.expect("config dir should resolve"), temp_dir.path());
}
