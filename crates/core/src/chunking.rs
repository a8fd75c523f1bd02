use crate::error::IngestError;
use crate::extractor::PageText;
use crate::models::{Chunk, IngestionOptions};

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SEPARATOR_CHARS: usize = 2;

/// Size limits for [`chunk_pages`], measured in chars.
///
/// Construction rejects `chunk_chars == 0` and `overlap >= chunk_chars`, so a
/// config that exists always has a positive hard-split width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_chars: usize,
    overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_chars: usize, overlap: usize) -> Result<Self, IngestError> {
        if chunk_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_chars must be greater than zero".to_string(),
            ));
        }

        if overlap >= chunk_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap ({overlap}) must be smaller than chunk_chars ({chunk_chars})"
            )));
        }

        Ok(Self {
            chunk_chars,
            overlap,
        })
    }

    pub fn chunk_chars(&self) -> usize {
        self.chunk_chars
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    fn slice_chars(&self) -> usize {
        self.chunk_chars - self.overlap
    }
}

impl TryFrom<&IngestionOptions> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &IngestionOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_chars, value.overlap)
    }
}

/// Splits on blank lines after folding `\r\n` and `\r` into `\n`.
pub fn split_into_paragraphs(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn chunk_pages(pages: &[PageText], config: ChunkingConfig) -> Vec<Chunk> {
    pages
        .iter()
        .flat_map(|page| chunk_page(page, config))
        .collect()
}

pub fn chunk_pages_with(
    pages: &[PageText],
    chunk_chars: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, IngestError> {
    let config = ChunkingConfig::new(chunk_chars, overlap)?;
    Ok(chunk_pages(pages, config))
}

struct PageChunks {
    page: u32,
    next_idx: u32,
    chunks: Vec<Chunk>,
}

impl PageChunks {
    fn emit(&mut self, text: String) {
        self.chunks.push(Chunk {
            text,
            page: self.page,
            chunk_idx: self.next_idx,
        });
        self.next_idx += 1;
    }
}

fn chunk_page(page: &PageText, config: ChunkingConfig) -> Vec<Chunk> {
    let mut out = PageChunks {
        page: page.number,
        next_idx: 0,
        chunks: Vec::new(),
    };
    let mut buffer: Vec<String> = Vec::new();
    let mut rendered_chars = 0usize;

    for paragraph in split_into_paragraphs(&page.text) {
        let paragraph_chars = paragraph.chars().count();
        let projected = if buffer.is_empty() {
            paragraph_chars
        } else {
            rendered_chars + SEPARATOR_CHARS + paragraph_chars
        };

        if projected <= config.chunk_chars {
            buffer.push(paragraph);
            rendered_chars = projected;
            continue;
        }

        let flushed = buffer.join(PARAGRAPH_SEPARATOR);
        buffer.clear();

        let seed = tail_chars(&flushed, config.overlap);
        let candidate = if seed.is_empty() {
            paragraph.clone()
        } else {
            format!("{seed}{PARAGRAPH_SEPARATOR}{paragraph}")
                .trim()
                .to_string()
        };

        if !flushed.is_empty() {
            out.emit(flushed);
        }

        let candidate_chars = candidate.chars().count();
        if candidate_chars > config.chunk_chars {
            for slice in hard_split(&paragraph, config.slice_chars()) {
                out.emit(slice);
            }
            rendered_chars = 0;
        } else {
            buffer.push(candidate);
            rendered_chars = candidate_chars;
        }
    }

    if !buffer.is_empty() {
        out.emit(buffer.join(PARAGRAPH_SEPARATOR));
    }

    out.chunks
}

fn tail_chars(text: &str, count: usize) -> &str {
    if count == 0 {
        return "";
    }

    match text.char_indices().rev().nth(count - 1) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

fn hard_split(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width)
        .map(|piece| piece.iter().collect())
        .collect()
}
