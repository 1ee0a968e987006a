use domain::error::RagError;
use domain::models::{Chunk, Document};
use shared::types::Result;
use std::collections::VecDeque;
use tracing::debug;

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Recursive character splitter. Sizes are counted in `char`s.
///
/// The text is cut on the coarsest separator it contains; pieces that are
/// still too long are cut again with the next separator. Adjacent small
/// pieces are then merged back up to `chunk_size`, keeping at most
/// `chunk_overlap` characters of the previous chunk at the head of the next.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk size must be greater than zero".into()).into());
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})"
            ))
            .into());
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn with_separators(mut self, separators: Vec<String>) -> Self {
        self.separators = separators;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect()
    }

    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut cursor = 0usize;
        // Newlines are counted once, from the previous chunk start forward.
        let mut counted_to = 0usize;
        let mut line_from = 1usize;

        for (index, text) in self.split_text(&doc.text).into_iter().enumerate() {
            let start = locate(&doc.text, &text, cursor).unwrap_or(cursor);
            if let Some(skipped) = doc.text.get(counted_to..start) {
                line_from += skipped.matches('\n').count();
                counted_to = start;
            }
            let line_to = line_from + text.matches('\n').count();
            cursor = next_char_boundary(&doc.text, start);

            chunks.push(Chunk {
                id: format!("{}#{}", doc.id, index),
                document_id: doc.id.clone(),
                source: doc.source.clone(),
                index,
                text,
                line_from,
                line_to,
            });
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();
        for piece in split_on(text, separator) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }
            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits, separator));
                good_splits.clear();
            }
            if remaining.is_empty() {
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits, separator));
        }
        final_chunks
    }

    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if total + len + joiner > self.chunk_size {
                if total > self.chunk_size {
                    debug!(total, chunk_size = self.chunk_size, "created an oversized chunk");
                }
                if !current.is_empty() {
                    if let Some(doc) = join_pieces(&current, separator) {
                        docs.push(doc);
                    }
                    loop {
                        let joiner = if current.is_empty() { 0 } else { separator_len };
                        let over_overlap = total > self.chunk_overlap;
                        let still_too_big = total > 0 && total + len + joiner > self.chunk_size;
                        if !(over_overlap || still_too_big) {
                            break;
                        }
                        let Some(first) = current.pop_front() else {
                            break;
                        };
                        let dropped_joiner = if current.is_empty() { 0 } else { separator_len };
                        total -= char_len(first) + dropped_joiner;
                    }
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { separator_len } else { 0 };
        }

        if let Some(doc) = join_pieces(&current, separator) {
            docs.push(doc);
        }
        docs
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_on<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).filter(|s| !s.is_empty()).collect()
    }
}

fn join_pieces(pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Byte offset of `chunk` in `text` at or after `from`. Falls back to the
/// chunk's first line when runs of separators were collapsed while merging.
fn locate(text: &str, chunk: &str, from: usize) -> Option<usize> {
    let haystack = text.get(from..)?;
    if let Some(pos) = haystack.find(chunk) {
        return Some(from + pos);
    }
    let first_line = chunk.lines().next().filter(|l| !l.is_empty())?;
    haystack.find(first_line).map(|pos| from + pos)
}

fn next_char_boundary(text: &str, at: usize) -> usize {
    text.get(at..)
        .and_then(|rest| rest.chars().next())
        .map(|c| at + c.len_utf8())
        .unwrap_or(text.len())
}
