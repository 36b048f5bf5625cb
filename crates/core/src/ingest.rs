use crate::chunking::build_chunks;
use crate::config::DocumentPaths;
use crate::embeddings::Embedder;
use crate::error::{IndexError, IngestError};
use crate::extractor::load_document;
use crate::index::FlatIndex;
use crate::models::{Chunk, IndexManifest, IngestionOptions};
use crate::store::{load_index, save_index, SourceInfo};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Loaded,
    Built,
}

pub struct PreparedIndex {
    pub index: FlatIndex,
    pub manifest: IndexManifest,
    pub origin: IndexOrigin,
}

pub async fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Loads the persisted index when its directory exists, otherwise builds it from the
/// PDF and persists it. A load failure is returned as is; it never triggers a rebuild.
pub async fn build_or_load_index(
    paths: &DocumentPaths,
    options: &IngestionOptions,
    embedder: &dyn Embedder,
) -> Result<PreparedIndex, IndexError> {
    if tokio::fs::try_exists(&paths.index_dir).await? {
        let (index, manifest) = load_index(&paths.index_dir, &embedder.fingerprint()).await?;
        info!(
            dir = %paths.index_dir.display(),
            chunks = manifest.chunk_count,
            built_at = %manifest.built_at.to_rfc3339(),
            "loaded vector store"
        );
        warn_if_stale(&paths.pdf_path, &manifest).await;

        return Ok(PreparedIndex {
            index,
            manifest,
            origin: IndexOrigin::Loaded,
        });
    }

    info!(pdf = %paths.pdf_path.display(), "indexing document");
    let segments = load_document(&paths.pdf_path).await?;
    let chunks = build_chunks(&segments, options)?;
    info!(pages = segments.len(), chunks = chunks.len(), "document chunked");

    let index = index_in_batches(&chunks, options, embedder).await?;
    let source = SourceInfo {
        path: paths.pdf_path.to_string_lossy().to_string(),
        checksum: digest_file(&paths.pdf_path).await?,
    };
    let manifest = save_index(&index, &paths.index_dir, &source).await?;
    info!(dir = %paths.index_dir.display(), chunks = manifest.chunk_count, "vector store saved");

    Ok(PreparedIndex {
        index,
        manifest,
        origin: IndexOrigin::Built,
    })
}

/// Embeds chunks `batch_size` at a time; the first batch creates the index.
pub async fn index_in_batches(
    chunks: &[Chunk],
    options: &IngestionOptions,
    embedder: &dyn Embedder,
) -> Result<FlatIndex, IndexError> {
    let mut batches = chunks.chunks(options.batch_size.max(1));
    let first = batches
        .next()
        .ok_or_else(|| IndexError::Empty("document produced no chunks".to_string()))?;

    let mut index = FlatIndex::from_chunks(first, embedder, options.top_k).await?;
    for batch in batches {
        index.add_chunks(batch, embedder).await?;
    }

    Ok(index)
}

async fn warn_if_stale(pdf_path: &Path, manifest: &IndexManifest) {
    match digest_file(pdf_path).await {
        Ok(checksum) if checksum != manifest.source_checksum => warn!(
            pdf = %pdf_path.display(),
            "source document changed since the index was built; delete the index directory to rebuild"
        ),
        Ok(_) => {}
        Err(error) => warn!(pdf = %pdf_path.display(), %error, "could not checksum source document"),
    }
}
