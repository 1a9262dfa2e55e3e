//! Lexical Index (C2)
//!
//! Hand-rolled Okapi BM25 inverted index over chunk text. No existing crate
//! in the dependency stack provides BM25 scoring, so this is built directly
//! rather than reached for.
//!
//! Tokenization is case-folded word splitting with a fixed stopword list (no
//! stemming). The index keeps a postings list per term, document lengths,
//! and an incrementally maintained average document length so
//! `add_document`/`delete` stay O(unique terms in the document) rather than
//! rescanning the corpus.
//!
//! Snapshots are written atomically: serialize to a temp file in the same
//! directory, then rename over the target, so a crash mid-write never leaves
//! a half-written snapshot that `restore` would trip over.

use crate::error::LexicalIndexError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const K1: f32 = 1.2;
const B: f32 = 0.75;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "of", "to", "in", "on", "for", "and", "or",
    "with", "this", "that", "it", "as", "at", "by", "be",
];

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Posting {
    /// term frequency per document id
    term_freqs: HashMap<String, u32>,
}

/// Okapi BM25 inverted index. Keys are chunk ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalIndex {
    postings: HashMap<String, Posting>,
    doc_lengths: HashMap<String, u32>,
    total_length: u64,
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self {
            postings: HashMap::new(),
            doc_lengths: HashMap::new(),
            total_length: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    fn avg_doc_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_length as f32 / self.doc_lengths.len() as f32
        }
    }

    /// Index (or re-index) a document. Replaces any prior content for `id`.
    pub fn add_document(&mut self, id: &str, text: &str) -> Result<(), LexicalIndexError> {
        self.delete(id)?;

        let tokens = tokenize(text);
        let length = tokens.len() as u32;

        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *counts.entry(token).or_insert(0) += 1;
        }

        for (term, freq) in &counts {
            self.postings
                .entry(term.clone())
                .or_default()
                .term_freqs
                .insert(id.to_string(), *freq);
        }

        self.doc_lengths.insert(id.to_string(), length);
        self.total_length += length as u64;

        Ok(())
    }

    /// Remove a document. Returns whether it was present.
    pub fn delete(&mut self, id: &str) -> Result<bool, LexicalIndexError> {
        let Some(length) = self.doc_lengths.remove(id) else {
            return Ok(false);
        };
        self.total_length = self.total_length.saturating_sub(length as u64);

        let mut empty_terms = Vec::new();
        for (term, posting) in self.postings.iter_mut() {
            if posting.term_freqs.remove(id).is_some() && posting.term_freqs.is_empty() {
                empty_terms.push(term.clone());
            }
        }
        for term in empty_terms {
            self.postings.remove(&term);
        }

        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<u32> {
        self.doc_lengths.get(id).copied()
    }

    /// Okapi BM25 inverse document frequency for `term` (BM25+ smoothing:
    /// never negative, even when `df > n/2`). Exposed for C9's global-IDF
    /// keyword signature, not just internal scoring.
    pub fn idf(&self, term: &str) -> f32 {
        let n = self.doc_lengths.len() as f32;
        let df = self.document_frequency(term) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Number of documents containing `term` at least once.
    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map(|p| p.term_freqs.len()).unwrap_or(0)
    }

    /// Score every document for `query`, returning the top `limit` by score
    /// descending, ties broken by id ascending.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        if self.is_empty() {
            return vec![];
        }
        let terms: HashSet<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() {
            return vec![];
        }

        let avg_len = self.avg_doc_length();
        let mut scores: HashMap<String, f32> = HashMap::new();

        for term in &terms {
            let Some(posting) = self.postings.get(term) else {
                continue;
            };
            let idf = self.idf(term);
            for (doc_id, &tf) in &posting.term_freqs {
                let doc_len = self.doc_lengths.get(doc_id).copied().unwrap_or(0) as f32;
                let denom = tf as f32 + K1 * (1.0 - B + B * (doc_len / avg_len.max(1.0)));
                let term_score = idf * (tf as f32 * (K1 + 1.0)) / denom.max(1e-9);
                *scores.entry(doc_id.clone()).or_insert(0.0) += term_score;
            }
        }

        let mut ranked: Vec<(String, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    /// Write an atomic snapshot: serialize to a sibling temp file, then
    /// rename over `path`.
    pub fn snapshot(&self, path: &Path) -> Result<(), LexicalIndexError> {
        let tmp_path = path.with_extension("tmp");
        let raw = serde_json::to_vec(self)
            .map_err(|e| LexicalIndexError::StorageUnavailable(e.to_string()))?;
        std::fs::write(&tmp_path, raw)
            .map_err(|e| LexicalIndexError::StorageUnavailable(e.to_string()))?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| LexicalIndexError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }

    pub fn restore(path: &Path) -> Result<Self, LexicalIndexError> {
        let raw = std::fs::read(path).map_err(|e| LexicalIndexError::StorageUnavailable(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| LexicalIndexError::CorruptSnapshot(e.to_string()))
    }
}
