use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Page-level text as it comes out of the PDF loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSegment {
    pub source_path: String,
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub source_path: String,
    pub page: u32,
    pub chunk_index: u64,
    /// Character offset of `text` inside the page text it was cut from.
    pub start_offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    /// Squared L2 distance to the query vector. Lower is closer.
    pub distance: f32,
}

/// Identity of the embedding provider an index was built with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbedderFingerprint {
    pub provider: String,
    pub model: String,
}

impl std::fmt::Display for EmbedderFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedder: EmbedderFingerprint,
    pub dimension: usize,
    pub chunk_count: usize,
    pub top_k: usize,
    pub source_path: String,
    pub source_checksum: String,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub batch_size: usize,
    pub top_k: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 200,
            chunk_overlap_chars: 30,
            batch_size: 32,
            top_k: 4,
        }
    }
}

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub max_new_tokens: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub temperature: f32,
    pub repetition_penalty: f32,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            top_k: 10,
            top_p: 0.95,
            temperature: 0.3,
            repetition_penalty: 1.15,
        }
    }
}
