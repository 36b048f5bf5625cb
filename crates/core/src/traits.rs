use crate::{GenerationError, RetrievedChunk, SearchError};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Generated text fragments in generation order.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of results a retriever asks for when it has no override.
    fn default_top_k(&self) -> usize;

    fn search_vector(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_stream(&self, prompt: String) -> Result<TokenStream, GenerationError>;
}
