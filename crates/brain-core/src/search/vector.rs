//! Vector Store (C1)
//!
//! HNSW approximate nearest-neighbor index over normalized embeddings, backed
//! by USearch. Keys are chunk ids (`{memory_id}-chunk-{n}`); metadata
//! (`memory_id`, `project_id`, tags) is tracked alongside the index so queries
//! can apply a pre-filter before the ANN search runs.
//!
//! Failure semantics (§4.1): a corrupt on-disk index surfaces
//! [`VectorStoreError::CorruptIndex`] rather than panicking; callers decide
//! whether to rebuild from the durable store. A dimension mismatch on insert
//! or query surfaces [`VectorStoreError::DimensionMismatch`] rather than
//! silently truncating or padding.

use crate::error::VectorStoreError;
use std::collections::HashMap;
use std::path::Path;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// Embedding dimensions after Matryoshka truncation (768 -> 256).
pub const DEFAULT_DIMENSIONS: usize = 256;
pub const DEFAULT_CONNECTIVITY: usize = 16;
pub const DEFAULT_EXPANSION_ADD: usize = 128;
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
    pub metric: MetricKind,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            metric: MetricKind::Cos,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorIndexStats {
    pub total_vectors: usize,
    pub dimensions: usize,
    pub connectivity: usize,
    pub memory_bytes: usize,
}

/// Metadata carried alongside a vector, used for pre-filtering (§4.1, §4.10).
#[derive(Debug, Clone, Default)]
pub struct VectorMetadata {
    pub memory_id: String,
    pub project_id: Option<String>,
    pub tags: Vec<String>,
}

fn to_index_options(config: &VectorIndexConfig) -> IndexOptions {
    IndexOptions {
        dimensions: config.dimensions,
        metric: config.metric,
        quantization: ScalarKind::I8,
        connectivity: config.connectivity,
        expansion_add: config.expansion_add,
        expansion_search: config.expansion_search,
        multi: false,
    }
}

/// HNSW-backed vector store. One entry per chunk.
pub struct VectorStore {
    index: Index,
    config: VectorIndexConfig,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    metadata: HashMap<String, VectorMetadata>,
    next_id: u64,
}

impl VectorStore {
    pub fn new() -> Result<Self, VectorStoreError> {
        Self::with_config(VectorIndexConfig::default())
    }

    pub fn with_config(config: VectorIndexConfig) -> Result<Self, VectorStoreError> {
        let options = to_index_options(&config);
        let index = Index::new(&options)
            .map_err(|e| VectorStoreError::StorageUnavailable(e.to_string()))?;

        Ok(Self {
            index,
            config,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            metadata: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn reserve(&self, capacity: usize) -> Result<(), VectorStoreError> {
        self.index
            .reserve(capacity)
            .map_err(|e| VectorStoreError::StorageUnavailable(format!("reserve failed: {e}")))
    }

    /// Insert or replace the vector for `key` (a chunk id).
    pub fn upsert(
        &mut self,
        key: &str,
        vector: &[f32],
        metadata: VectorMetadata,
    ) -> Result<(), VectorStoreError> {
        if vector.len() != self.config.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: vector.len(),
            });
        }

        if let Some(&existing_id) = self.key_to_id.get(key) {
            self.index
                .remove(existing_id)
                .map_err(|e| VectorStoreError::StorageUnavailable(e.to_string()))?;
            self.reserve(self.index.size() + 1)?;
            self.index
                .add(existing_id, vector)
                .map_err(|e| VectorStoreError::StorageUnavailable(e.to_string()))?;
            self.metadata.insert(key.to_string(), metadata);
            return Ok(());
        }

        let current_capacity = self.index.capacity();
        let current_size = self.index.size();
        if current_size >= current_capacity {
            let new_capacity = std::cmp::max(current_capacity * 2, 16);
            self.reserve(new_capacity)?;
        }

        let id = self.next_id;
        self.next_id += 1;

        self.index
            .add(id, vector)
            .map_err(|e| VectorStoreError::StorageUnavailable(e.to_string()))?;

        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        self.metadata.insert(key.to_string(), metadata);

        Ok(())
    }

    /// Remove a vector by key. Returns whether a vector was present.
    pub fn remove(&mut self, key: &str) -> Result<bool, VectorStoreError> {
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            self.metadata.remove(key);
            self.index
                .remove(id)
                .map_err(|e| VectorStoreError::StorageUnavailable(e.to_string()))?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id.contains_key(key)
    }

    pub fn metadata(&self, key: &str) -> Option<&VectorMetadata> {
        self.metadata.get(key)
    }

    /// Search for nearest neighbors, applying `filter` (a predicate over each
    /// candidate's metadata) before the result set is truncated to `limit`.
    pub fn search_filtered(
        &self,
        query: &[f32],
        limit: usize,
        filter: impl Fn(&VectorMetadata) -> bool,
    ) -> Result<Vec<(String, f32)>, VectorStoreError> {
        if query.len() != self.config.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: query.len(),
            });
        }
        if self.is_empty() {
            return Ok(vec![]);
        }

        // Over-fetch to absorb filtering, capped to the index size.
        let fetch = std::cmp::min(self.len(), limit.saturating_mul(4).max(limit).max(16));
        let results = self
            .index
            .search(query, fetch)
            .map_err(|e| VectorStoreError::StorageUnavailable(e.to_string()))?;

        let mut out = Vec::with_capacity(limit);
        for (key, distance) in results.keys.iter().zip(results.distances.iter()) {
            let Some(string_key) = self.id_to_key.get(key) else {
                continue;
            };
            let passes = self
                .metadata
                .get(string_key)
                .map(&filter)
                .unwrap_or(true);
            if !passes {
                continue;
            }
            let score = 1.0 - distance;
            out.push((string_key.clone(), score));
            if out.len() >= limit {
                break;
            }
        }

        Ok(out)
    }

    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>, VectorStoreError> {
        self.search_filtered(query, limit, |_| true)
    }

    pub fn save(&self, path: &Path) -> Result<(), VectorStoreError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorStoreError::StorageUnavailable("invalid path".to_string()))?;

        self.index
            .save(path_str)
            .map_err(|e| VectorStoreError::StorageUnavailable(e.to_string()))?;

        let mappings_path = path.with_extension("mappings.json");
        let mappings = serde_json::json!({
            "key_to_id": self.key_to_id,
            "next_id": self.next_id,
            "metadata": self.metadata.iter().map(|(k, v)| {
                (k.clone(), serde_json::json!({
                    "memory_id": v.memory_id,
                    "project_id": v.project_id,
                    "tags": v.tags,
                }))
            }).collect::<HashMap<_, _>>(),
        });
        let mappings_str = serde_json::to_string(&mappings)
            .map_err(|e| VectorStoreError::StorageUnavailable(e.to_string()))?;
        std::fs::write(&mappings_path, mappings_str)
            .map_err(|e| VectorStoreError::StorageUnavailable(e.to_string()))?;

        Ok(())
    }

    pub fn load(path: &Path, config: VectorIndexConfig) -> Result<Self, VectorStoreError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorStoreError::StorageUnavailable("invalid path".to_string()))?;

        let options = to_index_options(&config);
        let index = Index::new(&options)
            .map_err(|e| VectorStoreError::StorageUnavailable(e.to_string()))?;

        index.load(path_str).map_err(|e| {
            VectorStoreError::CorruptIndex(
                e.to_string(),
                "rebuild the index from the durable store".to_string(),
            )
        })?;

        let mappings_path = path.with_extension("mappings.json");
        let mappings_str = std::fs::read_to_string(&mappings_path).map_err(|e| {
            VectorStoreError::CorruptIndex(e.to_string(), "mappings file missing or unreadable".to_string())
        })?;
        let mappings: serde_json::Value = serde_json::from_str(&mappings_str).map_err(|e| {
            VectorStoreError::CorruptIndex(e.to_string(), "mappings file is not valid JSON".to_string())
        })?;

        let key_to_id: HashMap<String, u64> = serde_json::from_value(mappings["key_to_id"].clone())
            .map_err(|e| VectorStoreError::CorruptIndex(e.to_string(), "key_to_id malformed".to_string()))?;

        let next_id: u64 = mappings["next_id"].as_u64().ok_or_else(|| {
            VectorStoreError::CorruptIndex("missing next_id".to_string(), "mappings file truncated".to_string())
        })?;

        let mut metadata = HashMap::new();
        if let Some(obj) = mappings.get("metadata").and_then(|v| v.as_object()) {
            for (k, v) in obj {
                metadata.insert(
                    k.clone(),
                    VectorMetadata {
                        memory_id: v
                            .get("memory_id")
                            .and_then(|x| x.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        project_id: v.get("project_id").and_then(|x| x.as_str()).map(|s| s.to_string()),
                        tags: v
                            .get("tags")
                            .and_then(|x| x.as_array())
                            .map(|a| a.iter().filter_map(|x| x.as_str().map(|s| s.to_string())).collect())
                            .unwrap_or_default(),
                    },
                );
            }
        }

        let id_to_key: HashMap<u64, String> = key_to_id.iter().map(|(k, &v)| (v, k.clone())).collect();

        Ok(Self {
            index,
            config,
            key_to_id,
            id_to_key,
            metadata,
            next_id,
        })
    }

    pub fn stats(&self) -> VectorIndexStats {
        VectorIndexStats {
            total_vectors: self.len(),
            dimensions: self.config.dimensions,
            connectivity: self.config.connectivity,
            memory_bytes: self.index.serialized_length(),
        }
    }
}
