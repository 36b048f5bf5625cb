use crate::error::GenerationError;
use crate::models::RetrievedChunk;
use crate::prompt::PromptBuilder;
use crate::retriever::Retriever;
use crate::traits::{TextGenerator, TokenStream};
use std::sync::Arc;

/// The retrieval context and the prompt it produced for one query.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub context: Vec<RetrievedChunk>,
    pub prompt: String,
}

/// Retriever, prompt template and generator composed into one callable.
#[derive(Clone)]
pub struct RagPipeline {
    retriever: Retriever,
    prompt: PromptBuilder,
    generator: Arc<dyn TextGenerator>,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, prompt: PromptBuilder, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            retriever,
            prompt,
            generator,
        }
    }

    pub async fn prepare(&self, query: &str) -> Result<PreparedPrompt, GenerationError> {
        let context = self.retriever.retrieve(query).await?;
        let prompt = self.prompt.render(query, &context);
        Ok(PreparedPrompt { context, prompt })
    }

    /// Starts generation for an already prepared prompt.
    pub async fn generate(&self, prepared: &PreparedPrompt) -> Result<TokenStream, GenerationError> {
        self.generator.generate_stream(prepared.prompt.clone()).await
    }

    /// Retrieves, renders and starts generation. Every call opens a fresh stream.
    pub async fn stream(&self, query: &str) -> Result<TokenStream, GenerationError> {
        let prepared = self.prepare(query).await?;
        self.generate(&prepared).await
    }
}

/// Builds session pipelines that all share one retriever and one generator.
#[derive(Clone)]
pub struct PipelineFactory {
    retriever: Retriever,
    generator: Arc<dyn TextGenerator>,
}

impl PipelineFactory {
    pub fn new(retriever: Retriever, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    pub fn build(&self) -> RagPipeline {
        RagPipeline::new(
            self.retriever.clone(),
            PromptBuilder::new(),
            Arc::clone(&self.generator),
        )
    }
}
