use crate::error::IndexError;
use crate::index::{FlatIndex, IndexEntry};
use crate::models::{EmbedderFingerprint, IndexManifest};
use crate::traits::VectorIndex;
use chrono::Utc;
use std::path::Path;
use tracing::debug;

pub const FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
pub const DATA_FILE: &str = "index.json";

/// Where the indexed document came from, recorded in the manifest.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub path: String,
    pub checksum: String,
}

/// Writes the index and its manifest into `dir`, creating the directory if needed.
pub async fn save_index(
    index: &FlatIndex,
    dir: &Path,
    source: &SourceInfo,
) -> Result<IndexManifest, IndexError> {
    tokio::fs::create_dir_all(dir).await?;

    let manifest = IndexManifest {
        format_version: FORMAT_VERSION,
        embedder: index.embedder().clone(),
        dimension: index.dimension(),
        chunk_count: index.len(),
        top_k: index.default_top_k(),
        source_path: source.path.clone(),
        source_checksum: source.checksum.clone(),
        built_at: Utc::now(),
    };

    // Data first: a directory with a manifest always has its data next to it.
    tokio::fs::write(dir.join(DATA_FILE), serde_json::to_vec(index.entries())?).await?;
    tokio::fs::write(
        dir.join(MANIFEST_FILE),
        serde_json::to_vec_pretty(&manifest)?,
    )
    .await?;

    debug!(dir = %dir.display(), chunks = manifest.chunk_count, "index persisted");
    Ok(manifest)
}

/// Reads an index persisted by [`save_index`], refusing one built by another embedder.
pub async fn load_index(
    dir: &Path,
    expected_embedder: &EmbedderFingerprint,
) -> Result<(FlatIndex, IndexManifest), IndexError> {
    let manifest: IndexManifest =
        serde_json::from_slice(&tokio::fs::read(dir.join(MANIFEST_FILE)).await?)?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(IndexError::UnsupportedFormat {
            found: manifest.format_version,
            expected: FORMAT_VERSION,
        });
    }

    if &manifest.embedder != expected_embedder {
        return Err(IndexError::FingerprintMismatch {
            stored: manifest.embedder.to_string(),
            configured: expected_embedder.to_string(),
        });
    }

    let entries: Vec<IndexEntry> =
        serde_json::from_slice(&tokio::fs::read(dir.join(DATA_FILE)).await?)?;

    if entries.len() != manifest.chunk_count {
        return Err(IndexError::Corrupt(format!(
            "manifest lists {} chunks but {} were stored",
            manifest.chunk_count,
            entries.len()
        )));
    }

    let index = FlatIndex::from_parts(
        manifest.embedder.clone(),
        manifest.dimension,
        manifest.top_k,
        entries,
    )?;
    Ok((index, manifest))
}
