use crate::config::EndpointConfig;
use crate::error::EmbeddingError;
use crate::models::EmbedderFingerprint;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the provider so an index built with it can be recognised later.
    fn fingerprint(&self) -> EmbedderFingerprint;

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::CountMismatch {
                requested: 1,
                returned: vectors.len(),
            });
        }
        Ok(vectors.swap_remove(0))
    }
}

/// Local hashed character-trigram embedder. Deterministic and network free.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn fingerprint(&self) -> EmbedderFingerprint {
        EmbedderFingerprint {
            provider: "char-trigram".to_string(),
            model: format!("fnv1a-{}", self.dimensions.max(1)),
        }
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [String],
}

/// Hosted feature-extraction endpoint (text-embeddings-inference compatible).
pub struct HuggingFaceEndpointEmbedder {
    endpoint: String,
    api_token: String,
    client: Client,
}

impl HuggingFaceEndpointEmbedder {
    pub fn new(config: &EndpointConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            endpoint: config.embed_endpoint.to_string(),
            api_token: config.api_token.clone(),
            client,
        })
    }
}

#[async_trait]
impl Embedder for HuggingFaceEndpointEmbedder {
    fn fingerprint(&self) -> EmbedderFingerprint {
        EmbedderFingerprint {
            provider: "huggingface-endpoint".to_string(),
            model: self.endpoint.clone(),
        }
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(inputs = texts.len(), endpoint = %self.endpoint, "requesting embeddings");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&FeatureExtractionRequest { inputs: texts })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::BackendResponse {
                backend: "huggingface-endpoint".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let vectors: Vec<Vec<f32>> = response.json().await?;
        check_vectors(texts.len(), &vectors)?;
        Ok(vectors)
    }
}

fn check_vectors(requested: usize, vectors: &[Vec<f32>]) -> Result<(), EmbeddingError> {
    if vectors.len() != requested {
        return Err(EmbeddingError::CountMismatch {
            requested,
            returned: vectors.len(),
        });
    }

    if let Some(first) = vectors.first() {
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != first.len()) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: first.len(),
                actual: bad.len(),
            });
        }
    }

    Ok(())
}
