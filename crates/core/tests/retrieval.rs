use docqa_core::{
    build_chunks, load_index, save_index, CharacterNgramEmbedder, DocumentSegment, Embedder,
    FlatIndex, IngestionOptions, PromptBuilder, Retriever, SourceInfo, VectorIndex,
};
use std::sync::Arc;
use tempfile::tempdir;

const SHARES_SENTENCE: &str = "The maximum number of shares is 500,000.";

fn filing_segments() -> Vec<DocumentSegment> {
    let pages = [
        "Airbnb hosts welcomed guests in more than two hundred countries and regions during \
         the year. Nights and experiences booked grew compared with the prior year.\n\n\
         Our revenue is primarily derived from service fees charged to guests and hosts.",
        "Trading arrangements. Brian Chesky adopted a Rule 10b5-1 trading plan. \
         The maximum number of shares is 500,000. The plan terminates at the end of next year.",
        "Risk factors. Regulation of short-term rentals in major cities may adversely affect \
         our business.\n\nWe face intense competition in the travel industry.",
        "Properties. Our corporate headquarters are located in San Francisco, California, \
         where we lease office space.",
    ];

    pages
        .iter()
        .enumerate()
        .map(|(position, text)| DocumentSegment {
            source_path: "data/document.pdf".to_string(),
            page: position as u32 + 1,
            text: (*text).to_string(),
        })
        .collect()
}

async fn build_index(embedder: &CharacterNgramEmbedder) -> Result<FlatIndex, Box<dyn std::error::Error>> {
    let options = IngestionOptions::default();
    let chunks = build_chunks(&filing_segments(), &options)?;
    Ok(docqa_core::index_in_batches(&chunks, &options, embedder).await?)
}

fn texts(hits: &[docqa_core::RetrievedChunk]) -> Vec<String> {
    hits.iter().map(|hit| hit.chunk.text.clone()).collect()
}

#[tokio::test]
async fn reloaded_index_retrieves_the_same_chunks() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let embedder = Arc::new(CharacterNgramEmbedder::default());
    let index = build_index(&embedder).await?;
    let source = SourceInfo {
        path: "data/document.pdf".to_string(),
        checksum: "fixed".to_string(),
    };
    save_index(&index, dir.path(), &source).await?;
    let (reloaded, _) = load_index(dir.path(), &embedder.fingerprint()).await?;

    let fresh = Retriever::new(Arc::new(index), embedder.clone());
    let restored = Retriever::new(Arc::new(reloaded), embedder);

    for query in [
        "What is the maximum number of shares?",
        "Where is the headquarters?",
        "How does the company make money?",
    ] {
        assert_eq!(
            texts(&fresh.retrieve(query).await?),
            texts(&restored.retrieve(query).await?),
            "results differ for {query:?}"
        );
    }
    Ok(())
}

#[tokio::test]
async fn shares_question_retrieves_the_shares_sentence() -> Result<(), Box<dyn std::error::Error>> {
    let embedder = Arc::new(CharacterNgramEmbedder::default());
    let index = build_index(&embedder).await?;
    assert!(index.len() >= 4);
    let retriever = Retriever::new(Arc::new(index), embedder);

    let hits = retriever.retrieve("What is the maximum number of shares?").await?;

    assert_eq!(hits.len(), 4);
    assert!(texts(&hits).iter().any(|text| text.contains(SHARES_SENTENCE)));
    assert!(hits[0].chunk.text.contains("500,000"));

    let prompt = PromptBuilder::new().render("What is the maximum number of shares?", &hits);
    assert!(prompt.contains("500,000"));
    Ok(())
}

#[tokio::test]
async fn unrelated_question_still_gets_the_decline_instruction(
) -> Result<(), Box<dyn std::error::Error>> {
    let embedder = Arc::new(CharacterNgramEmbedder::default());
    let index = build_index(&embedder).await?;
    let retriever = Retriever::new(Arc::new(index), embedder);

    let query = "What is the boiling point of liquid nitrogen?";
    let unrelated = retriever.retrieve(query).await?;
    let related = retriever.retrieve("What is the maximum number of shares?").await?;
    assert!(unrelated[0].distance > related[0].distance);

    let prompt = PromptBuilder::new().render(query, &unrelated);
    assert!(prompt.contains(
        "If you can't answer the question with the provided context, say you don't know."
    ));
    Ok(())
}
