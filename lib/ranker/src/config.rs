use crate::average::AverageCellProbabilityRanker;
use crate::baseline::{MostPopularRanker, Popularity, RandomRanker};
use crate::naive_bayes::{NaiveBayesScorer, NaiveBayesWeighting};
use crate::pointwise::{CosineScorer, KlDivergenceScorer, PointwiseRanker, SumFrequencyScorer};
use crate::ranker::GridRanker;
use gridlocate_core::{CellDistributionCache, Error, Grid, GridConfig, LanguageModel, ModelChoice, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

fn default_cache_size() -> usize {
    10_000
}

fn default_beam_size() -> usize {
    10
}

fn default_epochs() -> usize {
    5
}

fn default_true() -> bool {
    true
}

/// Initial ranking strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum RankerConfig {
    Random {
        #[serde(default)]
        seed: Option<u64>,
    },
    MostPopular {
        #[serde(default)]
        popularity: Popularity,
    },
    KlDivergence {
        #[serde(default = "default_true")]
        partial: bool,
        #[serde(default)]
        symmetric: bool,
    },
    Cosine {
        #[serde(default)]
        partial: bool,
        #[serde(default)]
        smoothed: bool,
    },
    SumFrequency,
    NaiveBayes {
        #[serde(default)]
        weighting: NaiveBayesWeighting,
    },
    AverageCellProbability {
        #[serde(default = "default_cache_size")]
        cache_size: usize,
    },
    /// Trained linear classifier over all cells
    LinearClassifier {
        #[serde(default = "default_epochs")]
        epochs: usize,
    },
    /// Trained classifiers over progressively finer grids
    Hierarchical {
        levels: Vec<GridConfig>,
        #[serde(default = "default_beam_size")]
        beam_size: usize,
        #[serde(default = "default_epochs")]
        epochs: usize,
    },
}

impl Default for RankerConfig {
    fn default() -> Self {
        RankerConfig::KlDivergence {
            partial: true,
            symmetric: false,
        }
    }
}

impl RankerConfig {
    /// Whether the strategy needs a trained classifier
    pub fn is_learned(&self) -> bool {
        matches!(
            self,
            RankerConfig::LinearClassifier { .. } | RankerConfig::Hierarchical { .. }
        )
    }

    /// Build a ranker that needs no training
    pub fn build<M: LanguageModel>(&self, grid: Arc<dyn Grid<M>>) -> Result<Arc<dyn GridRanker<M>>> {
        if !grid.all_cells_computed() {
            warn!("Cannot build a ranker over unfinished grid {}", grid.grid_id());
            return Err(Error::InvalidState("rankers need a finished grid".to_string()));
        }
        debug!("Building {:?} ranker over grid {}", self, grid.grid_id());
        let ranker: Arc<dyn GridRanker<M>> = match self {
            RankerConfig::Random { seed: Some(seed) } => Arc::new(RandomRanker::with_seed(grid, *seed)),
            RankerConfig::Random { seed: None } => Arc::new(RandomRanker::new(grid)),
            RankerConfig::MostPopular { popularity } => Arc::new(MostPopularRanker::new(grid, *popularity)),
            RankerConfig::KlDivergence { partial, symmetric } => Arc::new(PointwiseRanker::new(
                grid,
                KlDivergenceScorer {
                    partial: *partial,
                    symmetric: *symmetric,
                },
            )),
            RankerConfig::Cosine { partial, smoothed } => Arc::new(PointwiseRanker::new(
                grid,
                CosineScorer {
                    partial: *partial,
                    smoothed: *smoothed,
                },
            )),
            RankerConfig::SumFrequency => Arc::new(PointwiseRanker::new(grid, SumFrequencyScorer)),
            RankerConfig::NaiveBayes { weighting } => {
                let scorer = NaiveBayesScorer::new(grid.as_ref(), *weighting);
                Arc::new(PointwiseRanker::new(grid, scorer))
            }
            RankerConfig::AverageCellProbability { cache_size } => {
                let cache = CellDistributionCache::new(grid, ModelChoice::Grid, *cache_size)?;
                Arc::new(AverageCellProbabilityRanker::new(Arc::new(cache)))
            }
            RankerConfig::LinearClassifier { .. } | RankerConfig::Hierarchical { .. } => {
                return Err(Error::InvalidConfig(
                    "learned rankers are built by training, not from configuration alone".to_string(),
                ))
            }
        };
        Ok(ranker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{grid_with, query};

    #[test]
    fn test_deserialize() {
        let config: RankerConfig = serde_json::from_str(r#"{"strategy": "kl-divergence"}"#).unwrap();
        assert_eq!(config, RankerConfig::default());

        let config: RankerConfig = serde_json::from_str(
            r#"{"strategy": "naive-bayes", "weighting": {"kind": "weighted", "baseline_weight": 0.3}}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            RankerConfig::NaiveBayes {
                weighting: NaiveBayesWeighting::Weighted { baseline_weight: 0.3 }
            }
        );

        let config: RankerConfig = serde_json::from_str(
            r#"{"strategy": "hierarchical", "levels": [{"kind": "uniform", "degrees_per_cell": 10.0}]}"#,
        )
        .unwrap();
        assert!(config.is_learned());
    }

    #[test]
    fn test_build_every_unlearned_strategy() {
        let grid = grid_with(&[&[("a", 3.0)], &[("b", 3.0)]]);
        let doc = query(&grid, &[("a", 1.0)]);
        let configs = [
            RankerConfig::Random { seed: Some(1) },
            RankerConfig::MostPopular {
                popularity: Popularity::Salience,
            },
            RankerConfig::default(),
            RankerConfig::Cosine {
                partial: false,
                smoothed: true,
            },
            RankerConfig::SumFrequency,
            RankerConfig::NaiveBayes {
                weighting: NaiveBayesWeighting::Equal,
            },
            RankerConfig::AverageCellProbability { cache_size: 4 },
        ];
        for config in configs {
            let ranker = config.build(Arc::clone(&grid)).unwrap();
            assert_eq!(ranker.rank(&doc, None, false).len(), 2, "{config:?}");
        }
        assert!(RankerConfig::LinearClassifier { epochs: 1 }
            .build(Arc::clone(&grid))
            .is_err());
    }

    #[test]
    fn test_unfinished_grid_rejected() {
        let grid: Arc<dyn Grid<gridlocate_core::UnigramModel>> =
            Arc::new(gridlocate_core::UniformGrid::new(0, 10.0, 1).unwrap());
        assert!(matches!(
            RankerConfig::default().build(grid),
            Err(Error::InvalidState(_))
        ));
    }
}
