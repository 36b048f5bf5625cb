use crate::embeddings::Embedder;
use crate::error::{IndexError, SearchError};
use crate::models::{Chunk, EmbedderFingerprint, RetrievedChunk};
use crate::traits::VectorIndex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Exact nearest-neighbour index over chunk embeddings, compared by squared L2 distance.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    embedder: EmbedderFingerprint,
    dimension: usize,
    top_k: usize,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    /// Creates an index from the first batch of chunks. The batch fixes the dimension.
    pub async fn from_chunks(
        chunks: &[Chunk],
        embedder: &dyn Embedder,
        top_k: usize,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty("first batch has no chunks".to_string()));
        }

        let vectors = embed_chunks(chunks, embedder).await?;
        let dimension = vectors.first().map(Vec::len).unwrap_or_default();
        if dimension == 0 {
            return Err(IndexError::Corrupt(
                "embedding provider returned empty vectors".to_string(),
            ));
        }

        let mut index = Self {
            embedder: embedder.fingerprint(),
            dimension,
            top_k: top_k.max(1),
            entries: Vec::with_capacity(chunks.len()),
        };
        index.insert(chunks, vectors)?;
        Ok(index)
    }

    pub async fn add_chunks(
        &mut self,
        chunks: &[Chunk],
        embedder: &dyn Embedder,
    ) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let fingerprint = embedder.fingerprint();
        if fingerprint != self.embedder {
            return Err(IndexError::FingerprintMismatch {
                stored: self.embedder.to_string(),
                configured: fingerprint.to_string(),
            });
        }

        let vectors = embed_chunks(chunks, embedder).await?;
        self.insert(chunks, vectors)
    }

    /// Reassembles an index from persisted parts, checking every entry's dimension.
    pub fn from_parts(
        embedder: EmbedderFingerprint,
        dimension: usize,
        top_k: usize,
        entries: Vec<IndexEntry>,
    ) -> Result<Self, IndexError> {
        if let Some(bad) = entries.iter().find(|entry| entry.vector.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }

        Ok(Self {
            embedder,
            dimension,
            top_k: top_k.max(1),
            entries,
        })
    }

    pub fn embedder(&self) -> &EmbedderFingerprint {
        &self.embedder
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    fn insert(&mut self, chunks: &[Chunk], vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        for (chunk, vector) in chunks.iter().zip(vectors) {
            if vector.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
            self.entries.push(IndexEntry {
                chunk: chunk.clone(),
                vector,
            });
        }
        Ok(())
    }
}

async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn Embedder,
) -> Result<Vec<Vec<f32>>, IndexError> {
    let texts = chunks
        .iter()
        .map(|chunk| chunk.text.clone())
        .collect::<Vec<_>>();
    let vectors = embedder.embed_documents(&texts).await?;

    if vectors.len() != chunks.len() {
        return Err(IndexError::Corrupt(format!(
            "embedding count {} doesn't match chunk count {}",
            vectors.len(),
            chunks.len()
        )));
    }

    Ok(vectors)
}

fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            let delta = a - b;
            delta * delta
        })
        .sum()
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn default_top_k(&self) -> usize {
        self.top_k
    }

    fn search_vector(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        if query_vector.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let mut scored = self
            .entries
            .iter()
            .map(|entry| (squared_l2(&entry.vector, query_vector), entry))
            .collect::<Vec<_>>();

        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|left, right| left.0.total_cmp(&right.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(distance, entry)| RetrievedChunk {
                chunk: entry.chunk.clone(),
                distance,
            })
            .collect())
    }
}
