use clap::{Parser, Subcommand, ValueEnum};
use notebook_rag::Result;
use notebook_rag::commands::{
    delete_documents, ingest_file, optimize_store, search_notebook, show_context, show_status,
};
use notebook_rag::config::{run_interactive_config, show_config};
use notebook_rag::retrieval::ContextPurpose;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "notebook-rag")]
#[command(about = "Notebook scoped document ingestion and retrieval backed by Ollama and LanceDB")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Purpose {
    Chat,
    Summary,
    Mindmap,
}

impl From<Purpose> for ContextPurpose {
    fn from(purpose: Purpose) -> Self {
        match purpose {
            Purpose::Chat => Self::Chat,
            Purpose::Summary => Self::Summary,
            Purpose::Mindmap => Self::Mindmap,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and ingestion settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk, embed and store documents in a notebook
    Ingest {
        /// JSON file holding an array of extracted documents
        file: PathBuf,
        /// Notebook that owns the documents
        #[arg(long)]
        notebook: String,
    },
    /// Search a notebook for chunks similar to a query
    Search {
        query: String,
        #[arg(long)]
        notebook: String,
        /// Maximum number of results, defaults to the chat result count
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Gather context for a chat answer, summary or mindmap
    Context {
        #[arg(value_enum)]
        purpose: Purpose,
        #[arg(long)]
        notebook: String,
        /// Query to search with; summary and mindmap have built in defaults
        #[arg(long)]
        query: Option<String>,
    },
    /// Delete stored chunks of a notebook
    Delete {
        #[arg(long)]
        notebook: String,
        /// Only delete chunks of this file
        #[arg(long)]
        filename: Option<String>,
    },
    /// Show embedding service and vector store status
    Status,
    /// Compact the vector table
    Optimize {
        /// Also build the vector index
        #[arg(long)]
        index: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest { file, notebook } => {
            ingest_file(&file, &notebook).await?;
        }
        Commands::Search {
            query,
            notebook,
            limit,
        } => {
            search_notebook(&query, &notebook, limit).await?;
        }
        Commands::Context {
            purpose,
            notebook,
            query,
        } => {
            show_context(purpose.into(), &notebook, query.as_deref()).await?;
        }
        Commands::Delete { notebook, filename } => {
            delete_documents(&notebook, filename.as_deref()).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Optimize { index } => {
            optimize_store(index).await?;
        }
    }

    Ok(())
}
