//! Naive Bayes cell scoring.
//!
//! A cell's score combines feature log-likelihoods of the document with the
//! log prior `ln(prior_weight / total_prior_weight)`:
//!
//! ```text
//! score = word_weight * sum(features) + baseline_weight * ln(prior)
//! ```

use crate::pointwise::{CellScorer, PointwiseRanker};
use crate::ranker::GridRanker;
use ahash::AHashMap;
use gridlocate_core::{Cell, CellId, Document, Grid, LanguageModel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How features and the prior are mixed
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NaiveBayesWeighting {
    /// Features and prior count equally
    #[default]
    Equal,
    /// Features only
    NoBaseline,
    /// Prior weighted by `baseline_weight`, features share the rest per token
    Weighted { baseline_weight: f64 },
}

impl NaiveBayesWeighting {
    /// (word weight, baseline weight) for a document of `num_tokens` tokens
    fn weights(self, num_tokens: f64) -> (f64, f64) {
        match self {
            NaiveBayesWeighting::Equal => (1.0, 1.0),
            NaiveBayesWeighting::NoBaseline => (1.0, 0.0),
            NaiveBayesWeighting::Weighted { baseline_weight } => {
                let word_weight = if num_tokens > 0.0 {
                    (1.0 - baseline_weight) / num_tokens
                } else {
                    1.0 - baseline_weight
                };
                (word_weight, baseline_weight)
            }
        }
    }
}

/// A log-likelihood source for Naive Bayes
pub enum NaiveBayesFeature<M: LanguageModel> {
    /// Log-probability of the document's terms under the cell's model
    TermLogProb,
    /// Score of a cheaper ranker for the cell of its grid containing the
    /// candidate's center
    RoughRanker(Arc<dyn GridRanker<M>>),
}

pub struct NaiveBayesScorer<M: LanguageModel> {
    features: Vec<NaiveBayesFeature<M>>,
    weighting: NaiveBayesWeighting,
    total_prior_weight: f64,
}

impl<M: LanguageModel> NaiveBayesScorer<M> {
    pub fn new(grid: &dyn Grid<M>, weighting: NaiveBayesWeighting) -> Self {
        Self {
            features: vec![NaiveBayesFeature::TermLogProb],
            weighting,
            total_prior_weight: grid.total_prior_weight(),
        }
    }

    #[must_use]
    pub fn with_feature(mut self, feature: NaiveBayesFeature<M>) -> Self {
        self.features.push(feature);
        self
    }

    #[must_use]
    pub fn with_rough_ranker(self, ranker: Arc<dyn GridRanker<M>>) -> Self {
        self.with_feature(NaiveBayesFeature::RoughRanker(ranker))
    }

    fn log_prior(&self, cell: &Cell<M>) -> f64 {
        if self.total_prior_weight > 0.0 {
            (cell.prior_weight() / self.total_prior_weight).ln()
        } else {
            f64::NEG_INFINITY
        }
    }
}

/// Rough-ranker scores for one query, keyed by rough cell
pub type RoughScores = Vec<AHashMap<CellId, f64>>;

impl<M: LanguageModel> CellScorer<M> for NaiveBayesScorer<M> {
    type Scratch = RoughScores;

    fn prepare(&self, doc: &Document<M>) -> RoughScores {
        self.features
            .iter()
            .filter_map(|feature| match feature {
                NaiveBayesFeature::TermLogProb => None,
                NaiveBayesFeature::RoughRanker(ranker) => Some(
                    ranker
                        .rank(doc, None, false)
                        .into_iter()
                        .filter_map(|(cell, score)| cell.id().map(|id| (id, score)))
                        .collect(),
                ),
            })
            .collect()
    }

    fn score_cell(&self, doc: &Document<M>, cell: &Cell<M>, scratch: &RoughScores) -> f64 {
        let Some(model) = doc.grid_model() else {
            return f64::NEG_INFINITY;
        };
        let mut rough = scratch.iter();
        let mut evidence = 0.0;
        for feature in &self.features {
            evidence += match feature {
                NaiveBayesFeature::TermLogProb => cell.grid_model().model_log_prob(model),
                NaiveBayesFeature::RoughRanker(ranker) => {
                    let scores = rough.next();
                    ranker
                        .grid()
                        .find_best_cell_for_coord(&cell.center(), false)
                        .and_then(|rough_cell| rough_cell.id())
                        .and_then(|id| scores.and_then(|s| s.get(&id).copied()))
                        .unwrap_or(f64::NEG_INFINITY)
                }
            };
        }

        let (word_weight, baseline_weight) = self.weighting.weights(model.num_tokens());
        let mut score = word_weight * evidence;
        if baseline_weight != 0.0 {
            score += baseline_weight * self.log_prior(cell);
        }
        score
    }
}

pub type NaiveBayesRanker<M> = PointwiseRanker<M, NaiveBayesScorer<M>>;
