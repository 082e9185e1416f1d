use crate::eval::PredictionPoint;
use anyhow::{Context, Result};
use gridlocate_core::{GridConfig, Split};
use gridlocate_ranker::RankerConfig;
use gridlocate_rerank::{FeatureConfig, RerankConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default = "default_eval_split")]
    pub split: Split,
    #[serde(default)]
    pub prediction: PredictionPoint,
    /// Stop after this many documents
    #[serde(default)]
    pub max_docs: Option<usize>,
}

fn default_eval_split() -> Split {
    Split::Dev
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            split: default_eval_split(),
            prediction: PredictionPoint::default(),
            max_docs: None,
        }
    }
}

/// Everything a run needs, loadable from one JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeolocateConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub ranker: RankerConfig,
    /// Features for learned rankers and the reranker
    #[serde(default)]
    pub features: FeatureConfig,
    /// Rerank the initial ranking when present
    #[serde(default)]
    pub rerank: Option<RerankConfig>,
    #[serde(default)]
    pub eval: EvalConfig,
    /// Terms seen fewer times in a document are dropped
    #[serde(default)]
    pub min_word_count: f64,
}

impl GeolocateConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).with_context(|| format!("cannot read config {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Replace the ranking strategy by its kebab-case name, keeping defaults
    /// for its parameters
    pub fn set_strategy(&mut self, name: &str) -> Result<()> {
        self.ranker = serde_json::from_value(serde_json::json!({ "strategy": name }))
            .with_context(|| format!("unknown or incomplete strategy {name:?}"))?;
        Ok(())
    }

    /// Cell size for uniform grids; other grids are left alone
    pub fn set_degrees_per_cell(&mut self, degrees: f64) -> bool {
        match &mut self.grid {
            GridConfig::Uniform { degrees_per_cell, .. } => {
                *degrees_per_cell = degrees;
                true
            }
            _ => false,
        }
    }
}
