//! Candidate feature generation.
//!
//! A [`CandidateFeatureFactory`] turns a (document, cell, initial score,
//! initial rank) tuple into named features. Factories are combined with an
//! index prefix per sub-factory so their names never collide. Continuous
//! values go through a [`FeatureVectorBuilder`], which applies the
//! configured [`BinningStatus`] and always bins non-finite values.

use crate::binning::{bin_fractionally, bin_logarithmically, BinningStatus};
use crate::error::{RerankError, Result};
use crate::feature::{AggregateFeatureVector, FeatureVector};
use crate::instance::RankerInstance;
use gridlocate_core::{Cell, Document, LanguageModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ==================== Configuration ====================

/// Value of a per-term feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TermValue {
    Binary,
    /// Count in the document
    #[default]
    Count,
    /// Probability under the cell
    Probability,
    /// Document probability times cell probability
    Product,
    /// Document probability over cell probability
    Quotient,
    /// The term's contribution to KL(document || cell)
    KlTerm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FeatureKind {
    Misc,
    TermOverlap,
    ModelComparison,
    RankScore,
    Terms {
        /// Only terms the cell has seen
        #[serde(default)]
        matching: bool,
        #[serde(default)]
        value: TermValue,
    },
    CellIdentity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_features")]
    pub features: Vec<FeatureKind>,
    #[serde(default)]
    pub binning: BinningStatus,
    #[serde(default = "default_log_base")]
    pub log_base: f64,
    #[serde(default = "default_fractional_bins")]
    pub fractional_bins: usize,
}

fn default_features() -> Vec<FeatureKind> {
    vec![
        FeatureKind::Misc,
        FeatureKind::TermOverlap,
        FeatureKind::ModelComparison,
        FeatureKind::RankScore,
    ]
}

fn default_log_base() -> f64 {
    2.0
}

fn default_fractional_bins() -> usize {
    10
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            features: default_features(),
            binning: BinningStatus::default(),
            log_base: default_log_base(),
            fractional_bins: default_fractional_bins(),
        }
    }
}

// ==================== Builder ====================

pub struct FeatureVectorBuilder<'a> {
    vector: &'a mut FeatureVector,
    prefix: String,
    binning: BinningStatus,
    log_base: f64,
    fractional_bins: usize,
}

impl<'a> FeatureVectorBuilder<'a> {
    pub fn new(vector: &'a mut FeatureVector, config: &FeatureConfig) -> Self {
        Self {
            vector,
            prefix: String::new(),
            binning: config.binning,
            log_base: config.log_base,
            fractional_bins: config.fractional_bins,
        }
    }

    /// Builder writing to the same vector under an extra name prefix
    pub fn scoped(&mut self, prefix: &str) -> FeatureVectorBuilder<'_> {
        FeatureVectorBuilder {
            vector: &mut *self.vector,
            prefix: format!("{}{}", self.prefix, prefix),
            binning: self.binning,
            log_base: self.log_base,
            fractional_bins: self.fractional_bins,
        }
    }

    fn push_bin(&mut self, name: &str, label: &str) {
        self.vector.push(format!("{}{}${}", self.prefix, name, label), 1.0);
    }

    pub fn add_indicator(&mut self, name: &str) {
        self.vector.push(format!("{}{}", self.prefix, name), 1.0);
    }

    /// Raw value, or a log-bin indicator when it is not finite
    pub fn add_raw(&mut self, name: &str, value: f64) {
        if value.is_finite() {
            self.vector.push(format!("{}{}", self.prefix, name), value);
        } else {
            let label = bin_logarithmically(value, self.log_base);
            self.push_bin(name, &label);
        }
    }

    /// Magnitude binned logarithmically, per the binning status
    pub fn add_value(&mut self, name: &str, value: f64) {
        let finite = value.is_finite();
        if self.binning.emits_raw() && finite {
            self.vector.push(format!("{}{}", self.prefix, name), value);
        }
        if self.binning.emits_binned() || !finite {
            let label = bin_logarithmically(value, self.log_base);
            self.push_bin(name, &label);
        }
    }

    /// Fraction binned into equal buckets over [0, 1], per the binning status
    pub fn add_fraction(&mut self, name: &str, value: f64) {
        let finite = value.is_finite();
        if self.binning.emits_raw() && finite {
            self.vector.push(format!("{}{}", self.prefix, name), value);
        }
        if self.binning.emits_binned() || !finite {
            let label = bin_fractionally(value, self.fractional_bins);
            self.push_bin(name, &label);
        }
    }
}

// ==================== Factories ====================

pub trait CandidateFeatureFactory<M: LanguageModel>: Send + Sync {
    /// Append features for `cell` as a candidate for `doc`. `score` and
    /// `rank` (1-based) come from the initial ranking.
    fn add_features(
        &self,
        doc: &Document<M>,
        cell: &Cell<M>,
        score: f64,
        rank: usize,
        out: &mut FeatureVectorBuilder<'_>,
    );
}

/// Document and cell sizes, salience, and their ratios
#[derive(Debug, Clone, Copy, Default)]
pub struct MiscFeatures;

impl<M: LanguageModel> CandidateFeatureFactory<M> for MiscFeatures {
    fn add_features(&self, doc: &Document<M>, cell: &Cell<M>, _: f64, _: usize, out: &mut FeatureVectorBuilder<'_>) {
        let (doc_tokens, doc_types) = doc
            .rerank_model()
            .map_or((0.0, 0.0), |m| (m.num_tokens(), m.num_types() as f64));
        let cell_model = cell.rerank_model();
        let cell_tokens = cell_model.num_tokens();

        out.add_value("doc-tokens", doc_tokens);
        out.add_value("doc-types", doc_types);
        out.add_value("cell-docs", cell.num_docs() as f64);
        out.add_value("cell-tokens", cell_tokens);
        out.add_value("cell-types", cell_model.num_types() as f64);
        out.add_value("cell-salience", cell.salience());
        out.add_value("token-quotient", doc_tokens / cell_tokens);
        out.add_value("token-difference", doc_tokens - cell_tokens);
        if let Some(salience) = doc.salience {
            out.add_value("doc-salience", salience);
            out.add_value("salience-quotient", salience / cell.salience());
            out.add_value("salience-difference", salience - cell.salience());
        }
    }
}

/// How many of the document's terms the cell has seen
#[derive(Debug, Clone, Copy, Default)]
pub struct TermOverlapFeatures;

impl<M: LanguageModel> CandidateFeatureFactory<M> for TermOverlapFeatures {
    fn add_features(&self, doc: &Document<M>, cell: &Cell<M>, _: f64, _: usize, out: &mut FeatureVectorBuilder<'_>) {
        let Some(model) = doc.rerank_model() else {
            return;
        };
        let cell_model = cell.rerank_model();
        let overlap = model
            .iter_terms()
            .filter(|&(term, _)| cell_model.count(term) > 0.0)
            .count() as f64;
        out.add_value("overlap", overlap);
        out.add_fraction("overlap-fraction", overlap / model.num_types() as f64);
    }
}

/// Divergence, similarity and likelihood of the document under the cell
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelComparisonFeatures;

impl<M: LanguageModel> CandidateFeatureFactory<M> for ModelComparisonFeatures {
    fn add_features(&self, doc: &Document<M>, cell: &Cell<M>, _: f64, _: usize, out: &mut FeatureVectorBuilder<'_>) {
        let Some(model) = doc.rerank_model() else {
            return;
        };
        let cell_model = cell.rerank_model();
        out.add_value("kl", model.kl_divergence(cell_model, false, None));
        out.add_value("symkl", model.symmetric_kl_divergence(cell_model, false, None));
        out.add_fraction("cosine", model.cosine_similarity(cell_model, false, false));
        out.add_value("nb-logprob", cell_model.model_log_prob(model));
    }
}

/// The initial ranker's rank and score
#[derive(Debug, Clone, Copy, Default)]
pub struct RankScoreFeatures;

impl<M: LanguageModel> CandidateFeatureFactory<M> for RankScoreFeatures {
    fn add_features(&self, _: &Document<M>, _: &Cell<M>, score: f64, rank: usize, out: &mut FeatureVectorBuilder<'_>) {
        out.add_value("initial-rank", rank as f64);
        out.add_raw("initial-score", score);
    }
}

/// One feature per document term
#[derive(Debug, Clone, Copy, Default)]
pub struct TermFeatures {
    pub matching: bool,
    pub value: TermValue,
}

impl<M: LanguageModel> CandidateFeatureFactory<M> for TermFeatures {
    fn add_features(&self, doc: &Document<M>, cell: &Cell<M>, _: f64, _: usize, out: &mut FeatureVectorBuilder<'_>) {
        let Some(model) = doc.rerank_model() else {
            return;
        };
        let cell_model = cell.rerank_model();
        for (term, count) in model.iter_terms() {
            if self.matching && cell_model.count(term) <= 0.0 {
                continue;
            }
            let value = match self.value {
                TermValue::Binary => 1.0,
                TermValue::Count => count,
                TermValue::Probability => cell_model.probability(term),
                TermValue::Product => model.probability(term) * cell_model.probability(term),
                TermValue::Quotient => model.probability(term) / cell_model.probability(term),
                TermValue::KlTerm => {
                    let p = model.probability(term);
                    p * (p / cell_model.probability(term)).ln()
                }
            };
            out.add_raw(&format!("term:{term}"), value);
        }
    }
}

/// Indicator naming the candidate cell
#[derive(Debug, Clone, Copy, Default)]
pub struct CellIdentityFeatures;

impl<M: LanguageModel> CandidateFeatureFactory<M> for CellIdentityFeatures {
    fn add_features(&self, _: &Document<M>, cell: &Cell<M>, _: f64, _: usize, out: &mut FeatureVectorBuilder<'_>) {
        match cell.id() {
            Some(id) => out.add_indicator(&format!("cell:{id}")),
            None => out.add_indicator("cell:unrecorded"),
        }
    }
}

/// Sub-factories, each writing under its index as prefix
pub struct CombinedFeatures<M: LanguageModel> {
    factories: Vec<Box<dyn CandidateFeatureFactory<M>>>,
}

impl<M: LanguageModel> CombinedFeatures<M> {
    pub fn new(factories: Vec<Box<dyn CandidateFeatureFactory<M>>>) -> Self {
        Self { factories }
    }
}

impl<M: LanguageModel> CandidateFeatureFactory<M> for CombinedFeatures<M> {
    fn add_features(
        &self,
        doc: &Document<M>,
        cell: &Cell<M>,
        score: f64,
        rank: usize,
        out: &mut FeatureVectorBuilder<'_>,
    ) {
        for (i, factory) in self.factories.iter().enumerate() {
            let mut scoped = out.scoped(&format!("{i}:"));
            factory.add_features(doc, cell, score, rank, &mut scoped);
        }
    }
}

impl FeatureKind {
    pub fn factory<M: LanguageModel>(self) -> Box<dyn CandidateFeatureFactory<M>> {
        match self {
            FeatureKind::Misc => Box::new(MiscFeatures),
            FeatureKind::TermOverlap => Box::new(TermOverlapFeatures),
            FeatureKind::ModelComparison => Box::new(ModelComparisonFeatures),
            FeatureKind::RankScore => Box::new(RankScoreFeatures),
            FeatureKind::Terms { matching, value } => Box::new(TermFeatures { matching, value }),
            FeatureKind::CellIdentity => Box::new(CellIdentityFeatures),
        }
    }
}

// ==================== Vector factory ====================

/// Builds feature vectors and ranker instances for candidates
pub struct CandidateFeatureVectorFactory<M: LanguageModel> {
    factory: CombinedFeatures<M>,
    config: FeatureConfig,
}

impl<M: LanguageModel> CandidateFeatureVectorFactory<M> {
    pub fn new(factories: Vec<Box<dyn CandidateFeatureFactory<M>>>, config: FeatureConfig) -> Result<Self> {
        if factories.is_empty() {
            return Err(RerankError::InvalidConfig("no feature factories".to_string()));
        }
        if config.log_base.is_nan() || config.log_base <= 1.0 {
            return Err(RerankError::InvalidConfig(format!(
                "log base must exceed 1, got {}",
                config.log_base
            )));
        }
        Ok(Self {
            factory: CombinedFeatures::new(factories),
            config,
        })
    }

    pub fn from_config(config: &FeatureConfig) -> Result<Self> {
        let factories = config.features.iter().map(|kind| kind.factory()).collect();
        Self::new(factories, config.clone())
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn make_feature_vector(&self, doc: &Document<M>, cell: &Cell<M>, score: f64, rank: usize) -> FeatureVector {
        let mut vector = FeatureVector::new();
        let mut builder = FeatureVectorBuilder::new(&mut vector, &self.config);
        self.factory.add_features(doc, cell, score, rank, &mut builder);
        vector
    }

    /// Instance over `candidates` in order; candidate `i` has rank `i + 1`
    pub fn make_instance(&self, doc: &Document<M>, candidates: &[(Arc<Cell<M>>, f64)]) -> RankerInstance<M> {
        let slices: Vec<FeatureVector> = candidates
            .par_iter()
            .enumerate()
            .map(|(i, (cell, score))| self.make_feature_vector(doc, cell, *score, i + 1))
            .collect();
        let cells = candidates.iter().map(|(cell, _)| Arc::clone(cell)).collect();
        RankerInstance::from_parts(cells, AggregateFeatureVector::new(slices))
    }
}
