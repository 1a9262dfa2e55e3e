//! Semantic Embeddings
//!
//! Local embedding generation for C3's `embed` operation, using fastembed
//! (ONNX-based, fully local). No external API calls.

mod local;

pub use local::{
    cosine_similarity, dot_product, euclidean_distance, matryoshka_truncate, Embedding,
    EmbeddingError, EmbeddingService, BATCH_SIZE, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH,
};
