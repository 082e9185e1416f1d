//! Language models over terms.
//!
//! Cells, grids and rankers only see models through [`LanguageModel`]. The
//! lifecycle is: accumulate counts, [`LanguageModel::finish_local`], compute
//! corpus-wide statistics once with [`LanguageModel::compute_global`], then
//! [`LanguageModel::finish_global`]. Probability lookups and divergences are
//! only meaningful on finished models.

mod kl_cache;
mod unigram;

pub use kl_cache::KlDivergenceCache;
pub use unigram::{UnigramGlobal, UnigramModel};

use std::fmt;
use std::sync::Arc;

/// One term's contribution `p (ln p - ln q)`, or zero when either side
/// has no mass
#[inline]
#[must_use]
pub fn kl_term(p: f64, q: f64) -> f64 {
    if p <= 0.0 || q <= 0.0 {
        0.0
    } else {
        p * (p.ln() - q.ln())
    }
}

pub trait LanguageModel: Default + Clone + fmt::Debug + Send + Sync + 'static {
    /// Corpus-wide statistics shared by every finished model
    type Global: fmt::Debug + Send + Sync + 'static;

    fn is_finished(&self) -> bool;

    /// Add `count` occurrences of `term`
    fn add_term(&mut self, term: &str, count: f64);

    /// Merge another model's counts, scaled by `partial`
    fn add_model(&mut self, other: &Self, partial: f64);

    /// Drop terms whose count is below `min_count`
    fn prune(&mut self, min_count: f64);

    /// First finalization pass, independent of other models
    fn finish_local(&mut self);

    /// Corpus-wide statistics from a full set of locally finished models
    fn compute_global<'a, I>(models: I) -> Self::Global
    where
        I: IntoIterator<Item = &'a Self>;

    /// Second finalization pass, after [`LanguageModel::compute_global`]
    fn finish_global(&mut self, global: &Arc<Self::Global>);

    fn num_tokens(&self) -> f64;

    fn num_types(&self) -> usize;

    /// Raw (unsmoothed) count of `term`
    fn count(&self, term: &str) -> f64;

    /// Smoothed probability of `term`
    fn probability(&self, term: &str) -> f64;

    /// All (term, count) pairs with a positive count
    fn iter_terms(&self) -> impl Iterator<Item = (&str, f64)> + '_;

    /// Unsmoothed relative frequency of `term`
    fn frequency(&self, term: &str) -> f64 {
        let tokens = self.num_tokens();
        if tokens > 0.0 {
            self.count(term) / tokens
        } else {
            0.0
        }
    }

    fn is_empty(&self) -> bool {
        self.num_tokens() <= 0.0
    }

    /// Build a model from (term, count) pairs
    fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        let mut model = Self::default();
        for (term, count) in counts {
            model.add_term(term.as_ref(), count);
        }
        model
    }

    /// KL(self || other). With `partial`, only terms of `self` are summed.
    ///
    /// `cache` must have been built from `self`.
    fn kl_divergence(&self, other: &Self, partial: bool, cache: Option<&KlDivergenceCache>) -> f64 {
        let mut kldiv = match cache {
            Some(cache) => cache.partial_divergence(other),
            None => self
                .iter_terms()
                .map(|(term, _)| kl_term(self.probability(term), other.probability(term)))
                .sum(),
        };
        if !partial {
            kldiv += other
                .iter_terms()
                .filter(|&(term, _)| self.count(term) <= 0.0)
                .map(|(term, _)| kl_term(self.probability(term), other.probability(term)))
                .sum::<f64>();
        }
        kldiv
    }

    fn symmetric_kl_divergence(
        &self,
        other: &Self,
        partial: bool,
        cache: Option<&KlDivergenceCache>,
    ) -> f64 {
        0.5 * self.kl_divergence(other, partial, cache) + 0.5 * other.kl_divergence(self, partial, None)
    }

    /// Cosine of the angle between the two term vectors.
    ///
    /// `smoothed` compares smoothed probabilities instead of raw frequencies;
    /// `partial` restricts both vectors to the terms of `self`.
    fn cosine_similarity(&self, other: &Self, partial: bool, smoothed: bool) -> f64 {
        let value = |model: &Self, term: &str| {
            if smoothed {
                model.probability(term)
            } else {
                model.frequency(term)
            }
        };
        let mut dot = 0.0;
        let mut self_norm = 0.0;
        let mut other_norm = 0.0;
        for (term, _) in self.iter_terms() {
            let p = value(self, term);
            let q = value(other, term);
            dot += p * q;
            self_norm += p * p;
            other_norm += q * q;
        }
        if !partial {
            for (term, _) in other.iter_terms() {
                if self.count(term) > 0.0 {
                    continue;
                }
                let p = value(self, term);
                let q = value(other, term);
                dot += p * q;
                self_norm += p * p;
                other_norm += q * q;
            }
        }
        if self_norm <= 0.0 || other_norm <= 0.0 {
            return 0.0;
        }
        dot / (self_norm.sqrt() * other_norm.sqrt())
    }

    /// Sum over the terms of `doc` of `count(term)` times this model's
    /// unsmoothed frequency
    fn sum_frequency(&self, doc: &Self) -> f64 {
        doc.iter_terms()
            .map(|(term, count)| count * self.frequency(term))
            .sum()
    }

    /// Log-likelihood of `doc`'s tokens under this model
    fn model_log_prob(&self, doc: &Self) -> f64 {
        doc.iter_terms()
            .map(|(term, count)| {
                let p = self.probability(term);
                if p > 0.0 {
                    count * p.ln()
                } else {
                    f64::NEG_INFINITY
                }
            })
            .sum()
    }
}

/// Global statistics for both model kinds a grid maintains
#[derive(Debug, Clone)]
pub struct GlobalStats<M: LanguageModel> {
    pub grid: Arc<M::Global>,
    pub rerank: Arc<M::Global>,
}
