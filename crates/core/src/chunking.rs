use crate::error::IngestError;
use crate::models::{Chunk, DocumentSegment, IngestionOptions};
use sha2::{Digest, Sha256};

/// Separators tried in order, coarsest first. The empty separator splits into characters.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

/// Splits `text` into trimmed pieces of at most `max_chars` characters, with up to
/// `overlap_chars` characters shared between neighbours. Every piece is a substring
/// of `text`.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    split_recursive(text, &DEFAULT_SEPARATORS, config)
}

fn split_recursive(text: &str, separators: &[&str], config: ChunkingConfig) -> Vec<String> {
    let mut separator = "";
    let mut remaining: &[&str] = &[];
    for (position, candidate) in separators.iter().enumerate() {
        if candidate.is_empty() || text.contains(candidate) {
            separator = candidate;
            remaining = &separators[position + 1..];
            break;
        }
    }

    let mut final_chunks = Vec::new();
    let mut good_splits: Vec<&str> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) < config.max_chars {
            good_splits.push(piece);
            continue;
        }

        if !good_splits.is_empty() {
            final_chunks.extend(merge_splits(&good_splits, config));
            good_splits.clear();
        }

        if remaining.is_empty() {
            let trimmed = piece.trim();
            if !trimmed.is_empty() {
                final_chunks.push(trimmed.to_string());
            }
        } else {
            final_chunks.extend(split_recursive(piece, remaining, config));
        }
    }

    if !good_splits.is_empty() {
        final_chunks.extend(merge_splits(&good_splits, config));
    }

    final_chunks
}

/// Splits on `separator`, attaching each separator to the start of the piece after it.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, ch)| &text[start..start + ch.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut piece_start = 0;
    for (found, _) in text.match_indices(separator) {
        if found > piece_start {
            pieces.push(&text[piece_start..found]);
        }
        piece_start = found;
    }
    if piece_start < text.len() {
        pieces.push(&text[piece_start..]);
    }

    pieces.retain(|piece| !piece.is_empty());
    pieces
}

fn merge_splits(splits: &[&str], config: ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: std::collections::VecDeque<&str> = std::collections::VecDeque::new();
    let mut total = 0usize;

    for split in splits {
        let length = char_len(split);

        if total + length > config.max_chars && !window.is_empty() {
            push_joined(&mut chunks, &window);

            while total > config.overlap_chars
                || (total + length > config.max_chars && total > 0)
            {
                let Some(dropped) = window.pop_front() else {
                    break;
                };
                total -= char_len(dropped);
            }
        }

        window.push_back(split);
        total += length;
    }

    push_joined(&mut chunks, &window);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &std::collections::VecDeque<&str>) {
    let joined = window.iter().copied().collect::<String>();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Chunks every segment in order, numbering chunks across the whole document.
pub fn build_chunks(
    segments: &[DocumentSegment],
    options: &IngestionOptions,
) -> Result<Vec<Chunk>, IngestError> {
    let config = ChunkingConfig::from(options);
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for segment in segments {
        let mut search_from = 0usize;
        for piece in split_text(&segment.text, config) {
            // A piece never starts before the previous piece's end minus the overlap.
            let byte_from = byte_offset(&segment.text, search_from);
            let start_offset = segment.text[byte_from..]
                .find(piece.as_str())
                .map(|relative| {
                    search_from + char_len(&segment.text[byte_from..byte_from + relative])
                })
                .unwrap_or(search_from);
            search_from = (start_offset + char_len(&piece)).saturating_sub(config.overlap_chars);

            chunks.push(Chunk {
                chunk_id: make_chunk_id(&segment.source_path, segment.page, cursor, &piece),
                source_path: segment.source_path.clone(),
                page: segment.page,
                chunk_index: cursor,
                start_offset,
                text: piece,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

/// Byte index of the `char_index`-th character, or the end of `text`.
fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map_or(text.len(), |(byte, _)| byte)
}

fn make_chunk_id(source_path: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: ChunkingConfig = ChunkingConfig {
        max_chars: 200,
        overlap_chars: 30,
    };

    fn sample_text() -> String {
        let mut text = String::new();
        for paragraph in 0..6 {
            for sentence in 0..5 {
                text.push_str(&format!(
                    "Paragraph {paragraph} sentence {sentence} talks about revenue, bookings and hosts. "
                ));
            }
            text.push_str("\n\n");
        }
        text.push_str("Averyveryveryveryveryveryveryveryveryveryveryveryveryverylongtokenwithoutanyspacesatallthatkeepsgoingandgoingandgoingandgoingandgoingandgoingandgoingandgoingandgoingandgoingandgoingandgoingandgoing.");
        text
    }

    fn segment(text: &str) -> DocumentSegment {
        DocumentSegment {
            source_path: "/tmp/doc.pdf".to_string(),
            page: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn chunks_respect_size_limit() {
        let chunks = split_text(&sample_text(), CONFIG);
        assert!(chunks.len() > 5);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= CONFIG.max_chars, "{chunk:?}");
            assert_eq!(chunk.trim(), chunk);
        }
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("  The maximum number of shares is 500,000.  ", CONFIG);
        assert_eq!(chunks, vec!["The maximum number of shares is 500,000.".to_string()]);
    }

    #[test]
    fn blank_text_produces_nothing() {
        assert!(split_text(" \n\n \n ", CONFIG).is_empty());
    }

    fn assert_exact_cover(text: &str, chunks: &[Chunk]) {
        let chars: Vec<char> = text.chars().collect();
        let mut covered = vec![false; chars.len()];

        for chunk in chunks {
            let length = chunk.text.chars().count();
            let span: String = chars[chunk.start_offset..chunk.start_offset + length]
                .iter()
                .collect();
            assert_eq!(span, chunk.text);
            covered[chunk.start_offset..chunk.start_offset + length]
                .iter_mut()
                .for_each(|flag| *flag = true);
        }

        for (position, ch) in chars.iter().enumerate() {
            if !ch.is_whitespace() {
                assert!(covered[position], "character {position} ({ch:?}) not covered");
            }
        }
    }

    #[test]
    fn chunks_cover_every_non_whitespace_character() -> Result<(), IngestError> {
        let text = sample_text();
        let chunks = build_chunks(&[segment(&text)], &IngestionOptions::default())?;
        assert_exact_cover(&text, &chunks);
        Ok(())
    }

    #[test]
    fn repeated_text_gets_offsets_past_earlier_copies() -> Result<(), IngestError> {
        let text = "word ".repeat(150);
        let chunks = build_chunks(&[segment(&text)], &IngestionOptions::default())?;

        assert!(chunks.len() > 3);
        assert_exact_cover(&text, &chunks);
        assert_eq!(chunks[1].start_offset, 170);
        let last = chunks.last().map(|chunk| chunk.start_offset + chunk.text.chars().count());
        assert_eq!(last, Some(text.trim_end().chars().count()));
        Ok(())
    }

    #[test]
    fn offsets_count_characters_not_bytes() -> Result<(), IngestError> {
        let text = "Umsatz für Gäste stieg. ".repeat(20);
        let chunks = build_chunks(&[segment(&text)], &IngestionOptions::default())?;
        assert!(chunks.len() > 1);
        assert_exact_cover(&text, &chunks);
        Ok(())
    }

    #[test]
    fn neighbours_overlap_by_at_most_the_configured_amount() -> Result<(), IngestError> {
        let text = sample_text();
        let chunks = build_chunks(&[segment(&text)], &IngestionOptions::default())?;

        for pair in chunks.windows(2) {
            let previous_end = pair[0].start_offset + pair[0].text.chars().count();
            assert!(pair[1].start_offset > pair[0].start_offset);
            let overlap = previous_end.saturating_sub(pair[1].start_offset);
            assert!(overlap <= CONFIG.overlap_chars, "overlap {overlap} too large");
        }
        Ok(())
    }

    #[test]
    fn chunk_indices_run_across_segments() -> Result<(), IngestError> {
        let segments = vec![
            segment("First page text."),
            DocumentSegment {
                page: 2,
                ..segment("Second page text.")
            },
        ];
        let chunks = build_chunks(&segments, &IngestionOptions::default())?;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[1].page, 2);
        assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
        Ok(())
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let options = IngestionOptions {
            chunk_max_chars: 20,
            chunk_overlap_chars: 20,
            ..IngestionOptions::default()
        };
        let result = build_chunks(&[segment("text")], &options);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }
}
