//! # gridlocate Rerank
//!
//! Learned cell ranking on top of the strategies in `gridlocate-ranker`.
//!
//! - [`binning`] - logarithmic and fractional bins for continuous values
//! - [`CandidateFeatureVectorFactory`] - named features for
//!   (document, cell, initial score, initial rank) tuples
//! - [`LinearClassifier`] and [`PerceptronTrainer`] - the classifier and
//!   trainer contracts with a shared-weight linear model
//! - [`LinearClassifierRanker`] and [`HierarchicalClassifierRanker`] -
//!   classifier-driven grid rankers
//! - [`Reranker`] - re-scores the top N of an initial ranking

pub mod binning;
pub mod classifier;
pub mod error;
pub mod factory;
pub mod feature;
pub mod hierarchical;
pub mod instance;
pub mod linear;
pub mod reranker;

#[cfg(test)]
pub(crate) mod test_util;

pub use binning::{bin_fractionally, bin_logarithmically, BinningStatus};
pub use classifier::{ClassifierTrainer, LinearClassifier, PerceptronTrainer, ScoringClassifier};
pub use error::{RerankError, Result};
pub use factory::{
    CandidateFeatureFactory, CandidateFeatureVectorFactory, CellIdentityFeatures, CombinedFeatures, FeatureConfig,
    FeatureKind, FeatureVectorBuilder, MiscFeatures, ModelComparisonFeatures, RankScoreFeatures, TermFeatures,
    TermOverlapFeatures, TermValue,
};
pub use feature::{AggregateFeatureVector, FeatureVector};
pub use hierarchical::{child_partition, ClassifierScope, HierarchicalClassifierRanker};
pub use instance::RankerInstance;
pub use linear::LinearClassifierRanker;
pub use reranker::{RerankConfig, Reranker};
