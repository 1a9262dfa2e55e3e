//! Indexer (C6)
//!
//! The only writer of memories into the retrieval indices. Owns the write
//! ordering that keeps C1 (vector), C2 (lexical) and the durable [`Store`]
//! consistent: embeddings first, then C2, then C1, then the summary record.
//! A failure partway through triggers compensating deletes in reverse.

use crate::embeddings::EmbeddingService;
use crate::error::IndexerError;
use crate::model::{Chunk, Memory};
use crate::ops::{self, OpContext};
use crate::search::{VectorMetadata, VectorStore};
use crate::storage::{EventLog, LexicalIndex, Store};
use std::sync::Mutex;

/// Indexes memories into C1/C2/the durable store, in that write order.
pub struct Indexer<'a> {
    vector: &'a Mutex<VectorStore>,
    lexical: &'a Mutex<LexicalIndex>,
    store: &'a Store,
    event_log: &'a EventLog,
    embedder: &'a EmbeddingService,
}

impl<'a> Indexer<'a> {
    pub fn new(
        vector: &'a Mutex<VectorStore>,
        lexical: &'a Mutex<LexicalIndex>,
        store: &'a Store,
        event_log: &'a EventLog,
        embedder: &'a EmbeddingService,
    ) -> Self {
        Self { vector, lexical, store, event_log, embedder }
    }

    /// Index `memory` and its `chunks`. Idempotent on `memory.id`: any prior
    /// records for this id are replaced.
    pub fn index_memory(&self, memory: &Memory, chunks: &[Chunk]) -> Result<(), IndexerError> {
        let ctx = OpContext::new().backend("indexer").inputs(format!("memory_id={} chunks={}", memory.id, chunks.len()));
        ops::run("indexer.index_memory", ctx, || {
            self.delete_chunk_records(&memory.id, chunks.iter().map(|c| c.id.as_str()))?;

            let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
            let embeddings = self
                .embedder
                .embed_batch(&texts)
                .map_err(|e| IndexerError::Embedding(e.to_string()))?;

            let mut written_lexical = Vec::with_capacity(chunks.len());
            let mut written_vector = Vec::with_capacity(chunks.len());

            let result = (|| -> Result<(), IndexerError> {
                for chunk in chunks {
                    self.lexical.lock().unwrap().add_document(&chunk.id, &chunk.content)?;
                    written_lexical.push(chunk.id.clone());
                }

                for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
                    let metadata = VectorMetadata {
                        memory_id: memory.id.clone(),
                        project_id: memory.project_id.clone(),
                        tags: memory.tags.clone(),
                    };
                    self.vector.lock().unwrap().upsert(&chunk.id, &embedding.vector, metadata)?;
                    written_vector.push(chunk.id.clone());
                }

                self.store.upsert_memory(memory)?;
                for chunk in chunks {
                    self.store.upsert_chunk(chunk)?;
                }
                Ok(())
            })();

            if let Err(err) = result {
                for id in written_vector.iter().rev() {
                    let _ = self.vector.lock().unwrap().remove(id);
                }
                for id in written_lexical.iter().rev() {
                    let _ = self.lexical.lock().unwrap().delete(id);
                }
                return Err(err);
            }

            let _ = self.event_log.append(&crate::model::EventLogEntry::new("indexed", &memory.id));
            Ok(())
        })
    }

    /// Persist field-only changes (tier, importance, confidence, ...) to the
    /// durable record without touching C1/C2, for callers that know chunk
    /// content is unchanged (C11's decay/promotion/compression passes).
    pub fn update_memory_fields(&self, memory: &Memory) -> Result<(), IndexerError> {
        self.store.upsert_memory(memory)?;
        Ok(())
    }

    fn delete_chunk_records<'b>(
        &self,
        memory_id: &str,
        _incoming_chunk_ids: impl Iterator<Item = &'b str>,
    ) -> Result<(), IndexerError> {
        let existing = self.store.chunks_for_memory(memory_id)?;
        for chunk in &existing {
            let _ = self.lexical.lock().unwrap().delete(&chunk.id);
            let _ = self.vector.lock().unwrap().remove(&chunk.id);
        }
        self.store.delete_chunks_for_memory(memory_id)?;
        Ok(())
    }

    /// Remove `memory_id` and all of its chunks from every index. Deletes
    /// from C1 and C2 are issued together; on partial failure the pass is
    /// retried once before surfacing [`IndexerError::IntegrityViolation`].
    pub fn delete_memory(&self, memory_id: &str) -> Result<(), IndexerError> {
        let ctx = OpContext::new().backend("indexer").inputs(format!("memory_id={memory_id}"));
        ops::run("indexer.delete_memory", ctx, || {
            for attempt in 0..2 {
                match self.try_delete_memory(memory_id) {
                    Ok(()) => return Ok(()),
                    Err(_) if attempt == 0 => continue,
                    Err(reason) => {
                        return Err(IndexerError::IntegrityViolation {
                            memory_id: memory_id.to_string(),
                            reason: reason.to_string(),
                        });
                    }
                }
            }
            unreachable!()
        })
    }

    fn try_delete_memory(&self, memory_id: &str) -> Result<(), IndexerError> {
        let chunks = self.store.chunks_for_memory(memory_id)?;
        for chunk in &chunks {
            self.lexical.lock().unwrap().delete(&chunk.id)?;
            self.vector.lock().unwrap().remove(&chunk.id)?;
        }
        self.store.delete_chunks_for_memory(memory_id)?;
        self.store.delete_memory(memory_id)?;
        let _ = self.event_log.append(&crate::model::EventLogEntry::new("deleted", memory_id));
        Ok(())
    }
}
