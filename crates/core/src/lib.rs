pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod session;
pub mod store;
pub mod traits;

pub use chunking::{build_chunks, split_text, ChunkingConfig};
pub use config::{DocumentPaths, EndpointConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HuggingFaceEndpointEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{
    ConfigError, EmbeddingError, GenerationError, IndexError, IngestError, SearchError,
};
pub use extractor::{load_document, LopdfExtractor, PdfExtractor};
pub use generation::{HuggingFaceEndpointGenerator, SseDecoder};
pub use index::{FlatIndex, IndexEntry};
pub use ingest::{build_or_load_index, digest_file, index_in_batches, IndexOrigin, PreparedIndex};
pub use models::{
    Chunk, DocumentSegment, EmbedderFingerprint, GenerationParameters, IndexManifest,
    IngestionOptions, RetrievedChunk,
};
pub use pipeline::{PipelineFactory, PreparedPrompt, RagPipeline};
pub use prompt::{PromptBuilder, CONTEXT_DELIMITER, RAG_PROMPT_TEMPLATE};
pub use retriever::Retriever;
pub use session::{
    on_message, rename_author, ChatEvent, FinalMessage, MessageDraft, SessionContext,
    SessionRegistry,
};
pub use store::{load_index, save_index, SourceInfo};
pub use traits::{TextGenerator, TokenStream, VectorIndex};
