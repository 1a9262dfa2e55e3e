//! Configuration (§1.1, §6)
//!
//! Strongly typed configuration record, one nested struct per component
//! family, with defaults matching §6 exactly. Loaded from, in order: an
//! explicit path, the `BRAIN_CONFIG` environment variable, a default search
//! path under the platform data directory, falling back to [`Config::default`]
//! with a logged warning. Validated once at construction.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub candidate_count: usize,
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_count: 50,
            top_k: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub max_candidates: usize,
    pub parallel_workers: usize,
    pub cache_l1_size: usize,
    pub cache_l2_size: usize,
    pub cache_ttl_seconds: u64,
    pub semantic_threshold: f32,
    pub queue_wait_max_ms: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            max_candidates: 20,
            parallel_workers: 3,
            cache_l1_size: 128,
            cache_l2_size: 128,
            cache_ttl_seconds: 28_800,
            semantic_threshold: 0.85,
            queue_wait_max_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub prefetch_min_confidence: f64,
    pub max_memories: usize,
    pub pool_ttl_seconds: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            prefetch_min_confidence: 0.75,
            max_memories: 100,
            pool_ttl_seconds: 28_800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    pub schedule: String,
    pub age_threshold_days: i64,
    pub importance_threshold: f64,
    pub similarity_threshold: f32,
    pub min_cluster_size: usize,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            schedule: "0 3 * * *".to_string(),
            age_threshold_days: 30,
            importance_threshold: 0.3,
            similarity_threshold: 0.9,
            min_cluster_size: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingMemoryConfig {
    pub retention_hours: i64,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self { retention_hours: 8 }
    }
}

/// C7's Stage-2 LLM fallback gate (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QamConfig {
    pub llm_fallback_enabled: bool,
    /// Max Stage-2 LLM calls allowed per `BrainContext` lifetime before the
    /// fallback stops firing and Stage 1's heuristic result stands alone.
    pub llm_call_budget: u64,
}

impl Default for QamConfig {
    fn default() -> Self {
        Self {
            llm_fallback_enabled: true,
            llm_call_budget: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub short_summary_max_tokens: usize,
    pub long_summary_min_tokens: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            short_summary_max_tokens: 100,
            long_summary_min_tokens: 500,
        }
    }
}

/// Fusion weights for C8 (§4.8). Must be non-negative and sum to ~1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub memory_strength: f64,
    pub recency: f64,
    pub refs_reliability: f64,
    pub bm25: f64,
    pub vector: f64,
    pub metadata: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            memory_strength: 0.2,
            recency: 0.15,
            refs_reliability: 0.1,
            bm25: 0.2,
            vector: 0.3,
            metadata: 0.05,
        }
    }
}

impl WeightsConfig {
    pub fn sum(&self) -> f64 {
        self.memory_strength
            + self.recency
            + self.refs_reliability
            + self.bm25
            + self.vector
            + self.metadata
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            self.memory_strength,
            self.recency,
            self.refs_reliability,
            self.bm25,
            self.vector,
            self.metadata,
        ];
        if fields.iter().any(|w| *w < 0.0) {
            return Err(ConfigError::InvalidConfig(
                "fusion weights must be non-negative".to_string(),
            ));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidConfig(format!(
                "fusion weights must sum to 1.0 (±1e-6), got {sum}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

/// Root configuration record (§1.1, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub search: SearchConfig,
    pub reranker: RerankerConfig,
    pub project: ProjectConfig,
    pub consolidation: ConsolidationConfig,
    pub working_memory: WorkingMemoryConfig,
    pub router: RouterConfig,
    pub weights: WeightsConfig,
    pub qam: QamConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            search: SearchConfig::default(),
            reranker: RerankerConfig::default(),
            project: ProjectConfig::default(),
            consolidation: ConsolidationConfig::default(),
            working_memory: WorkingMemoryConfig::default(),
            router: RouterConfig::default(),
            weights: WeightsConfig::default(),
            qam: QamConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Validate the config once at startup (§1.1).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        if !(0.0..=1.0).contains(&self.project.prefetch_min_confidence) {
            return Err(ConfigError::InvalidConfig(
                "project.prefetch_min_confidence must be in [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.reranker.semantic_threshold as f64) {
            return Err(ConfigError::InvalidConfig(
                "reranker.semantic_threshold must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the data directory: the configured value, or a platform
    /// default under `directories::ProjectDirs`.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("dev", "external-brain", "brain")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".external-brain"))
        })
    }

    /// Load from, in order: `path` if given, else `$BRAIN_CONFIG`, else the
    /// default search path, else [`Config::default`] with a logged warning.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = path
            .map(|p| p.to_path_buf())
            .or_else(|| std::env::var("BRAIN_CONFIG").ok().map(PathBuf::from))
            .or_else(|| {
                directories::ProjectDirs::from("dev", "external-brain", "brain")
                    .map(|dirs| dirs.config_dir().join("config.toml"))
            });

        let config = match candidate {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p)?;
                toml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            Some(p) => {
                tracing::warn!(path = %p.display(), "config file not found, using defaults");
                Config::default()
            }
            None => {
                tracing::warn!("no config path resolved, using defaults");
                Config::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, raw)?;
        Ok(())
    }
}
