//! # gridlocate Ranker
//!
//! Strategies that rank a grid's cells for a query document:
//!
//! - [`RandomRanker`] and [`MostPopularRanker`] - content-free baselines
//! - [`PointwiseRanker`] - parallel per-cell scoring with a [`CellScorer`]:
//!   KL divergence, cosine similarity, sum of frequencies, Naive Bayes
//! - [`AverageCellProbabilityRanker`] - mixture of per-term cell
//!   distributions
//!
//! [`RankerConfig`] builds any of them from configuration.

pub mod average;
pub mod baseline;
pub mod config;
pub mod naive_bayes;
pub mod pointwise;
pub mod ranker;

#[cfg(test)]
pub(crate) mod test_util;

pub use average::AverageCellProbabilityRanker;
pub use baseline::{MostPopularRanker, Popularity, RandomRanker};
pub use config::RankerConfig;
pub use naive_bayes::{NaiveBayesFeature, NaiveBayesRanker, NaiveBayesScorer, NaiveBayesWeighting};
pub use pointwise::{
    CellScorer, CosineRanker, CosineScorer, KlDivergenceRanker, KlDivergenceScorer, PointwiseRanker,
    SumFrequencyRanker, SumFrequencyScorer,
};
pub use ranker::{candidate_cells, rank_of, sort_ranking, GridRanker, Ranking};
