use crate::error::IngestError;
use crate::models::{IngestionOptions, Section};
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::warn;

const MAX_ITERATIONS: usize = 1_000_000;
const PARAGRAPH_BREAK: [char; 2] = ['\n', '\n'];
const SENTENCE_BREAK: [char; 2] = ['.', ' '];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
    /// Natural boundaries closer than this to the window start fall back to the window edge.
    pub min_boundary_offset: usize,
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chars,
            overlap_chars,
            min_boundary_offset: IngestionOptions::default().min_boundary_offset,
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidParameters(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidParameters(format!(
                "overlap {} must be smaller than max_chars {}",
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
            min_boundary_offset: value.min_boundary_offset,
        }
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn chunk_text(
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Result<Vec<String>, IngestError> {
    chunk_with_config(text, &ChunkingConfig::new(max_chars, overlap_chars))
}

/// Splits text into overlapping segments, cutting at paragraph or sentence
/// boundaries where possible. Positions are counted in characters.
pub fn chunk_with_config(text: &str, config: &ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let paragraph_runs = Regex::new(r"\n{2,}")?;
    let normalized = paragraph_runs.replace_all(text, "\n\n");
    let chars: Vec<char> = normalized.trim().chars().collect();
    let len = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut iterations = 0usize;

    while start < len {
        if iterations == MAX_ITERATIONS {
            warn!(start, len, "chunking stopped at iteration ceiling");
            break;
        }
        iterations += 1;

        let end = (start + config.max_chars).min(len);
        let window = &chars[start..end];
        let boundary = rfind_pair(window, PARAGRAPH_BREAK)
            .map(|offset| start + offset)
            .or_else(|| rfind_pair(window, SENTENCE_BREAK).map(|offset| start + offset + 1));

        let cut = match boundary {
            Some(cut) if cut > start + config.min_boundary_offset => cut,
            _ => end,
        };

        let piece: String = chars[start..cut].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(piece.to_string());
        }

        if cut == len {
            break;
        }

        let mut next_start = if cut == end {
            end.saturating_sub(config.overlap_chars)
        } else {
            cut
        };
        if next_start <= start {
            next_start = (start + (config.max_chars - config.overlap_chars)).min(len);
        }
        start = next_start;
    }

    Ok(chunks)
}

fn rfind_pair(window: &[char], pattern: [char; 2]) -> Option<usize> {
    window.windows(2).rposition(|pair| pair == &pattern[..])
}

/// Drops table-of-contents and page-furniture lines and collapses spacing.
pub fn clean_text_block(block: &str) -> Result<String, IngestError> {
    let toc_line = Regex::new(r".{3,}\.{3,}\s*\d+$")?;
    let header_footer = Regex::new(r"(?i)^(?:(?:\d+|[ivxlcdm]+)|table of contents)$")?;
    let spaces = Regex::new(r"[ \t]+")?;
    let newlines = Regex::new(r"\n{2,}")?;

    let kept = block
        .lines()
        .filter(|line| !toc_line.is_match(line))
        .filter(|line| !header_footer.is_match(line.trim()))
        .collect::<Vec<_>>()
        .join("\n");

    let collapsed = spaces.replace_all(&kept, " ");
    let collapsed = newlines.replace_all(&collapsed, "\n");
    Ok(collapsed.trim().to_string())
}

/// Chunks one document and turns the surviving segments into sections.
pub fn build_sections(
    doc_name: &str,
    text: &str,
    options: &IngestionOptions,
) -> Result<Vec<Section>, IngestError> {
    let config = ChunkingConfig::from(options);
    let mut sections = Vec::new();

    for (index, raw_chunk) in chunk_with_config(text, &config)?.into_iter().enumerate() {
        let cleaned = clean_text_block(&raw_chunk)?;
        if cleaned.is_empty() || cleaned.chars().count() < options.min_chunk_chars {
            continue;
        }

        let chunk_idx = u32::try_from(index).map_err(|_| {
            IngestError::InvalidArgument(format!("too many chunks in {doc_name}"))
        })?;

        sections.push(Section {
            id: make_section_id(doc_name, chunk_idx, &cleaned),
            doc_name: doc_name.to_string(),
            chunk_idx,
            text: cleaned,
        });
    }

    Ok(sections)
}

fn make_section_id(doc_name: &str, chunk_idx: u32, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_name.as_bytes());
    hasher.update(chunk_idx.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_sentences(count: usize) -> String {
        let mut text = String::new();
        for index in 0..count {
            text.push_str(&format!("Sentence token{index} carries a few extra words. "));
            if index % 7 == 6 {
                text.push_str("\n\n\n\n");
            }
        }
        text
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
        assert_eq!(normalize_whitespace("non\u{a0}breaking\u{a0} space"), "non breaking space");
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(
            chunk_text("some text", 0, 0),
            Err(IngestError::InvalidParameters(_))
        ));
        assert!(matches!(
            chunk_text("some text", 100, 100),
            Err(IngestError::InvalidParameters(_))
        ));
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunk_text("", 100, 10).unwrap().is_empty());
        assert!(chunk_text(" \n\n\n ", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("One short paragraph.", 2_000, 300).unwrap();
        assert_eq!(chunks, vec!["One short paragraph.".to_string()]);
    }

    #[test]
    fn edge_cuts_overlap_by_the_requested_amount() {
        let text: String = (0..1_000)
            .map(|index| char::from(b'a' + (index % 26) as u8))
            .collect();
        let chunks = chunk_text(&text, 100, 20).unwrap();

        assert_eq!(chunks[0], text[0..100]);
        assert_eq!(chunks[1], text[80..180]);
        let last = chunks.last().unwrap();
        assert!(text.ends_with(last.as_str()));
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 100));
    }

    #[test]
    fn prefers_paragraph_breaks_beyond_the_offset_floor() {
        let first = "x".repeat(600);
        let second = "y".repeat(300);
        let text = format!("{first}\n\n\n\n{second}");
        let chunks = chunk_text(&text, 1_000, 100).unwrap();

        assert_eq!(chunks, vec![first, second]);
    }

    #[test]
    fn sentence_cut_keeps_the_terminator() {
        let config = ChunkingConfig {
            max_chars: 60,
            overlap_chars: 10,
            min_boundary_offset: 0,
        };
        let text = "First sentence is here. Second sentence follows it. Third one ends.";
        let chunks = chunk_with_config(text, &config).unwrap();

        assert_eq!(chunks[0], "First sentence is here. Second sentence follows it.");
        assert!(chunks[1].starts_with("Third"));
    }

    #[test]
    fn chunking_terminates_and_covers_every_word() {
        let text = numbered_sentences(400);
        let chunks = chunk_text(&text, 600, 100).unwrap();

        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|chunk| !chunk.trim().is_empty()));
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 600));
        for index in 0..400 {
            let token = format!("token{index} ");
            assert!(
                chunks.iter().any(|chunk| chunk.contains(&token) || chunk.ends_with(token.trim_end())),
                "token{index} missing from every chunk"
            );
        }
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(250);
        let chunks = chunk_text(&text, 100, 0).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().take(2).all(|chunk| chunk.chars().count() == 100));
    }

    #[test]
    fn clean_text_block_drops_page_furniture() {
        let block = "Table of Contents\nIntroduction ........ 3\n12\niv\nReal   content\tstays.\n\n\nMore.";
        let cleaned = clean_text_block(block).unwrap();
        assert_eq!(cleaned, "Real content stays.\nMore.");
    }

    #[test]
    fn build_sections_filters_short_segments_and_keeps_indices_monotonic() {
        let options = IngestionOptions {
            chunk_max_chars: 95,
            chunk_overlap_chars: 0,
            min_chunk_chars: 80,
            min_boundary_offset: 0,
            ..IngestionOptions::default()
        };
        let long = "Pump maintenance requires checking the seals, the bearings and the coupling alignment.";
        let text = format!("{long}\n\nToo short.\n\n{long}");
        let sections = build_sections("manual.txt", &text, &options).unwrap();

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].chunk_idx, 0);
        assert_eq!(sections[1].chunk_idx, 2);
        assert_ne!(sections[0].id, sections[1].id);
        assert!(sections.iter().all(|section| section.doc_name == "manual.txt"));
    }

    #[test]
    fn section_ids_are_stable_across_rebuilds() {
        let options = IngestionOptions::default();
        let text = "Stable identifiers let graph upserts stay idempotent across repeated ingestion runs.";
        let first = build_sections("a.md", text, &options).unwrap();
        let second = build_sections("a.md", text, &options).unwrap();
        assert_eq!(first, second);
    }
}
