//! Chunker (C4)
//!
//! Splits a memory's content into an ordered, dense, 0-based sequence of
//! [`Chunk`] values for C6 to index. Splits at heading boundaries first, then
//! paragraphs, then sentences; a fenced code block is always kept intact
//! regardless of size. Token counting is a whitespace word count, matching
//! the rest of the core's token budget accounting.

use crate::model::Chunk;
use std::collections::HashMap;

pub const DEFAULT_MAX_TOKENS: usize = 512;
pub const DEFAULT_OVERLAP_RATIO: f64 = 0.1;

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

enum Unit {
    Code(String),
    Text(String),
}

/// Separate fenced code blocks (kept verbatim, atomic) from surrounding text.
fn split_code_fences(text: &str) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut lines = text.lines();
    let mut text_buf = String::new();

    while let Some(line) = lines.next() {
        if line.trim_start().starts_with("```") {
            if !text_buf.is_empty() {
                units.push(Unit::Text(std::mem::take(&mut text_buf)));
            }
            let mut code_buf = String::new();
            code_buf.push_str(line);
            code_buf.push('\n');
            for inner in lines.by_ref() {
                code_buf.push_str(inner);
                code_buf.push('\n');
                if inner.trim_start().starts_with("```") {
                    break;
                }
            }
            units.push(Unit::Code(code_buf));
        } else {
            text_buf.push_str(line);
            text_buf.push('\n');
        }
    }
    if !text_buf.is_empty() {
        units.push(Unit::Text(text_buf));
    }
    units
}

/// Split on blank lines; a heading line (`#...`) always starts a new paragraph.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let is_heading = line.trim_start().starts_with('#');
        if is_heading && !current.trim().is_empty() {
            paragraphs.push(std::mem::take(&mut current));
        }
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
        if is_heading {
            paragraphs.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in paragraph.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

fn hard_split_words(unit: &str, max_tokens: usize) -> Vec<String> {
    let words: Vec<&str> = unit.split_whitespace().collect();
    words.chunks(max_tokens.max(1)).map(|c| c.join(" ")).collect()
}

fn flatten_to_atoms(content: &str, max_tokens: usize) -> Vec<Unit> {
    let mut atoms = Vec::new();
    for unit in split_code_fences(content) {
        match unit {
            Unit::Code(c) => atoms.push(Unit::Code(c)),
            Unit::Text(t) => {
                for para in split_paragraphs(&t) {
                    if word_count(&para) <= max_tokens {
                        atoms.push(Unit::Text(para));
                        continue;
                    }
                    for sent in split_sentences(&para) {
                        if word_count(&sent) <= max_tokens {
                            atoms.push(Unit::Text(sent));
                        } else {
                            for piece in hard_split_words(&sent, max_tokens) {
                                atoms.push(Unit::Text(piece));
                            }
                        }
                    }
                }
            }
        }
    }
    atoms
}

/// Split `content` into chunks of at most `max_tokens` words with ~10%
/// overlap between adjacent text chunks. Empty input yields an empty
/// sequence.
pub fn chunk_document(
    memory_id: &str,
    content: &str,
    metadata: &HashMap<String, String>,
    max_tokens: usize,
) -> Vec<Chunk> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let overlap = ((max_tokens as f64) * DEFAULT_OVERLAP_RATIO).round() as usize;
    let atoms = flatten_to_atoms(content, max_tokens);

    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut chunk_index: u32 = 0;

    let mut push_chunk = |buffer: &str, chunks: &mut Vec<Chunk>, chunk_index: &mut u32| {
        let text = buffer.trim();
        if text.is_empty() {
            return;
        }
        chunks.push(Chunk {
            id: Chunk::make_id(memory_id, *chunk_index),
            memory_id: memory_id.to_string(),
            chunk_index: *chunk_index,
            content: text.to_string(),
            tokens: word_count(text) as u32,
            metadata: metadata.clone(),
        });
        *chunk_index += 1;
    };

    for atom in atoms {
        let atom_text = match &atom {
            Unit::Code(c) => c.clone(),
            Unit::Text(t) => t.clone(),
        };
        let atom_tokens = word_count(&atom_text);
        let buffer_tokens = word_count(&buffer);

        if !buffer.trim().is_empty() && buffer_tokens + atom_tokens > max_tokens {
            push_chunk(&buffer, &mut chunks, &mut chunk_index);

            let tail_words: Vec<&str> = buffer.split_whitespace().collect();
            let tail_start = tail_words.len().saturating_sub(overlap);
            buffer = if matches!(atom, Unit::Code(_)) {
                String::new()
            } else {
                tail_words[tail_start..].join(" ")
            };
        }

        if !buffer.is_empty() {
            buffer.push_str("\n\n");
        }
        buffer.push_str(&atom_text);
    }

    push_chunk(&buffer, &mut chunks, &mut chunk_index);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_sequence() {
        assert!(chunk_document("mem-1", "", &HashMap::new(), DEFAULT_MAX_TOKENS).is_empty());
        assert!(chunk_document("mem-1", "   \n  ", &HashMap::new(), DEFAULT_MAX_TOKENS).is_empty());
    }

    #[test]
    fn short_content_becomes_a_single_chunk() {
        let chunks = chunk_document("mem-1", "a short note about rust", &HashMap::new(), DEFAULT_MAX_TOKENS);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].id, "mem-1-chunk-0");
    }

    #[test]
    fn chunk_indices_are_dense_and_zero_based() {
        let long_text = (0..2000).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunk_document("mem-2", &long_text, &HashMap::new(), 100);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
        }
    }

    #[test]
    fn chunks_respect_max_tokens_for_plain_prose() {
        let long_text = (0..2000).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunk_document("mem-3", &long_text, &HashMap::new(), 100);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.tokens <= 100 + (100_f64 * DEFAULT_OVERLAP_RATIO).round() as u32);
        }
    }

    #[test]
    fn code_fences_are_never_split() {
        let content = format!("intro text\n\n```rust\n{}\n```\n\nmore text", "fn f() {}\n".repeat(200));
        let chunks = chunk_document("mem-4", &content, &HashMap::new(), 50);
        let fence_chunk = chunks.iter().find(|c| c.content.contains("```rust")).unwrap();
        assert!(fence_chunk.content.contains("fn f() {}"));
        assert_eq!(fence_chunk.content.matches("```").count(), 2);
    }

    #[test]
    fn metadata_is_inherited_by_every_chunk() {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "test".to_string());
        let chunks = chunk_document("mem-5", "some content here", &metadata, DEFAULT_MAX_TOKENS);
        assert_eq!(chunks[0].metadata.get("source"), Some(&"test".to_string()));
    }
}
