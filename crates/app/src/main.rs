mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use docqa_core::{
    build_or_load_index, CharacterNgramEmbedder, DocumentPaths, Embedder, EndpointConfig,
    GenerationParameters, HuggingFaceEndpointEmbedder, HuggingFaceEndpointGenerator,
    IndexOrigin, IngestionOptions, PipelineFactory, Retriever, SessionRegistry, TextGenerator,
    VectorIndex,
};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docqa", version, about = "Ask questions about a single PDF")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Text-generation inference endpoint URL
    #[arg(long, env = "HF_LLM_ENDPOINT")]
    llm_endpoint: Option<String>,

    /// Feature-extraction (embedding) inference endpoint URL
    #[arg(long, env = "HF_EMBED_ENDPOINT")]
    embed_endpoint: Option<String>,

    /// Access token sent to both endpoints
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    hf_token: Option<String>,

    /// The PDF to answer questions about
    #[arg(long, env = "DOCQA_PDF_PATH", default_value = "data/document.pdf")]
    pdf_path: PathBuf,

    /// Index directory; if it exists the index is loaded instead of built
    #[arg(long, env = "DOCQA_INDEX_DIR", default_value = "vectorstore")]
    index_dir: PathBuf,

    /// Chunks retrieved per question, recorded when the index is built
    #[arg(long, env = "DOCQA_TOP_K", default_value_t = 4)]
    top_k: usize,

    /// Connect/request timeout for the inference endpoints
    #[arg(long, env = "DOCQA_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    request_timeout_secs: u64,

    /// Embed locally with hashed character trigrams instead of the hosted endpoint
    #[arg(long, default_value_t = false)]
    offline_embeddings: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Build the index if it is missing, otherwise load and validate it.
    Index,
    /// Ask a single question and stream the answer to stdout.
    Ask {
        /// Question text
        #[arg(long)]
        query: String,
        /// Print the retrieved chunks before the answer.
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
    /// Serve the chat API over HTTP with server-sent events.
    Serve {
        /// Address to bind (host:port)
        #[arg(long, env = "DOCQA_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
        /// Display name used for assistant messages
        #[arg(long, env = "DOCQA_ASSISTANT_NAME", default_value = "Document Q&A Bot")]
        assistant_name: String,
        /// Seconds a chat session may sit unused before it is dropped
        #[arg(long, env = "DOCQA_SESSION_IDLE_SECS", default_value_t = 1800)]
        session_idle_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docqa boot"
    );

    let endpoints = EndpointConfig::new(
        cli.llm_endpoint.as_deref(),
        cli.embed_endpoint.as_deref(),
        cli.hf_token.as_deref(),
        Duration::from_secs(cli.request_timeout_secs),
    )?;

    let embedder: Arc<dyn Embedder> = if cli.offline_embeddings {
        Arc::new(CharacterNgramEmbedder::default())
    } else {
        Arc::new(HuggingFaceEndpointEmbedder::new(&endpoints)?)
    };

    let paths = DocumentPaths {
        pdf_path: cli.pdf_path,
        index_dir: cli.index_dir,
    };
    let options = IngestionOptions {
        top_k: cli.top_k,
        ..IngestionOptions::default()
    };
    let prepared = build_or_load_index(&paths, &options, embedder.as_ref())
        .await
        .with_context(|| format!("failed to prepare index at {}", paths.index_dir.display()))?;

    let origin = prepared.origin;
    let index = Arc::new(prepared.index);
    let generator: Arc<dyn TextGenerator> = Arc::new(HuggingFaceEndpointGenerator::new(
        &endpoints,
        GenerationParameters::default(),
    )?);
    let factory = PipelineFactory::new(Retriever::new(index.clone(), embedder), generator);

    match cli.command {
        Command::Index => {
            let verb = match origin {
                IndexOrigin::Built => "built",
                IndexOrigin::Loaded => "loaded",
            };
            println!(
                "{verb} index with {} chunks (dimension {}, top_k {}) at {}",
                index.len(),
                index.dimension(),
                index.default_top_k(),
                paths.index_dir.display()
            );
        }
        Command::Ask {
            query,
            show_context,
        } => {
            let pipeline = factory.build();
            let prepared = pipeline.prepare(&query).await?;

            if show_context {
                for retrieved in &prepared.context {
                    println!(
                        "[page {} chunk {} distance={:.4}]\n{}\n",
                        retrieved.chunk.page,
                        retrieved.chunk.chunk_index,
                        retrieved.distance,
                        retrieved.chunk.text
                    );
                }
            }

            let mut tokens = pipeline.generate(&prepared).await?;
            let mut stdout = std::io::stdout();
            while let Some(token) = tokens.next().await {
                write!(stdout, "{}", token?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
        Command::Serve {
            bind,
            assistant_name,
            session_idle_secs,
        } => {
            let registry = Arc::new(
                SessionRegistry::new(factory, assistant_name)
                    .with_idle_timeout(Duration::from_secs(session_idle_secs)),
            );
            server::serve(&bind, registry).await?;
        }
    }

    Ok(())
}
