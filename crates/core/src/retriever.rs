use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::RetrievedChunk;
use crate::traits::VectorIndex;
use std::sync::Arc;

/// Top-k retrieval over the shared, read-only index.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn top_k(&self) -> usize {
        self.index.default_top_k()
    }

    /// Embeds `query` and returns the index's default number of nearest chunks,
    /// closest first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, SearchError> {
        let query_vector = self.embedder.embed_query(query).await?;
        self.index.search_vector(&query_vector, self.top_k())
    }
}
