//! Unigram model with Good-Turing style smoothing and global backoff.
//!
//! A model reserves `unseen_mass` for terms it has not seen. That mass is
//! shared among terms seen elsewhere in the corpus in proportion to their
//! overall probability, with a small remainder for terms never seen at all.

use super::{kl_term, KlDivergenceCache, LanguageModel};
use ahash::AHashMap;
use std::sync::Arc;

/// Upper bound on the mass a model reserves for unseen terms
const MAX_UNSEEN_MASS: f64 = 0.5;

/// Corpus-wide statistics for [`UnigramModel`]
#[derive(Debug, Clone, Default)]
pub struct UnigramGlobal {
    /// Probability of each term seen anywhere, discounted by
    /// `globally_unseen_prob`
    overall_probs: AHashMap<String, f64>,
    /// Mass reserved for terms never seen in the corpus
    globally_unseen_prob: f64,
    /// Rough estimate of how many term types were never seen
    num_unseen_types: f64,
    num_tokens: f64,
}

impl UnigramGlobal {
    #[inline]
    #[must_use]
    pub fn overall_probability(&self, term: &str) -> Option<f64> {
        self.overall_probs.get(term).copied()
    }

    #[inline]
    #[must_use]
    pub fn globally_unseen_prob(&self) -> f64 {
        self.globally_unseen_prob
    }

    #[inline]
    #[must_use]
    pub fn num_unseen_types(&self) -> f64 {
        self.num_unseen_types
    }

    #[inline]
    #[must_use]
    pub fn num_types(&self) -> usize {
        self.overall_probs.len()
    }

    #[inline]
    #[must_use]
    pub fn num_tokens(&self) -> f64 {
        self.num_tokens
    }

    /// Probability of one never-seen term, given a model's unseen mass
    #[inline]
    fn never_seen_prob(&self, unseen_mass: f64) -> f64 {
        unseen_mass * self.globally_unseen_prob / self.num_unseen_types
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Stage {
    #[default]
    Open,
    Local,
    Finished,
}

#[derive(Debug, Clone)]
pub struct UnigramModel {
    counts: AHashMap<String, f64>,
    num_tokens: f64,
    unseen_mass: f64,
    /// One minus the overall probability of the terms in this model
    overall_unseen_mass: f64,
    global: Option<Arc<UnigramGlobal>>,
    stage: Stage,
}

impl Default for UnigramModel {
    fn default() -> Self {
        Self {
            counts: AHashMap::new(),
            num_tokens: 0.0,
            unseen_mass: MAX_UNSEEN_MASS,
            overall_unseen_mass: 1.0,
            global: None,
            stage: Stage::Open,
        }
    }
}

impl UnigramModel {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn unseen_mass(&self) -> f64 {
        self.unseen_mass
    }

    #[inline]
    #[must_use]
    pub fn overall_unseen_mass(&self) -> f64 {
        self.overall_unseen_mass
    }

    pub fn global(&self) -> Option<&Arc<UnigramGlobal>> {
        self.global.as_ref()
    }

    /// Probability of a term this model has no count for
    fn unseen_probability(&self, term: &str) -> f64 {
        let Some(global) = &self.global else {
            return 0.0;
        };
        match global.overall_probability(term) {
            Some(overall) if self.overall_unseen_mass > 0.0 => {
                self.unseen_mass * overall / self.overall_unseen_mass
            }
            Some(_) => 0.0,
            None => global.never_seen_prob(self.unseen_mass),
        }
    }
}

impl LanguageModel for UnigramModel {
    type Global = UnigramGlobal;

    fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    fn add_term(&mut self, term: &str, count: f64) {
        debug_assert_eq!(self.stage, Stage::Open, "adding to a finished model");
        if count <= 0.0 {
            return;
        }
        *self.counts.entry(term.to_string()).or_insert(0.0) += count;
        self.num_tokens += count;
    }

    fn add_model(&mut self, other: &Self, partial: f64) {
        debug_assert_eq!(self.stage, Stage::Open, "adding to a finished model");
        for (term, count) in &other.counts {
            *self.counts.entry(term.clone()).or_insert(0.0) += count * partial;
        }
        self.num_tokens += other.num_tokens * partial;
    }

    fn prune(&mut self, min_count: f64) {
        let mut removed = 0.0;
        self.counts.retain(|_, count| {
            let keep = *count >= min_count;
            if !keep {
                removed += *count;
            }
            keep
        });
        self.num_tokens -= removed;
    }

    fn finish_local(&mut self) {
        if self.stage != Stage::Open {
            return;
        }
        let seen_once = self.counts.values().filter(|&&count| count <= 1.0).count();
        self.unseen_mass = if self.num_tokens > 0.0 {
            (seen_once.max(1) as f64 / self.num_tokens).min(MAX_UNSEEN_MASS)
        } else {
            MAX_UNSEEN_MASS
        };
        self.stage = Stage::Local;
    }

    fn compute_global<'a, I>(models: I) -> UnigramGlobal
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut totals: AHashMap<String, f64> = AHashMap::new();
        let mut num_tokens = 0.0;
        for model in models {
            for (term, count) in &model.counts {
                *totals.entry(term.clone()).or_insert(0.0) += count;
            }
            num_tokens += model.num_tokens;
        }

        let seen_once = totals.values().filter(|&&count| count <= 1.0).count() as f64;
        let globally_unseen_prob = if num_tokens > 0.0 {
            seen_once / num_tokens
        } else {
            0.0
        };
        let num_unseen_types = seen_once.max(totals.len() as f64 / 20.0).max(1.0);
        let overall_probs = if num_tokens > 0.0 {
            totals
                .into_iter()
                .map(|(term, count)| (term, count / num_tokens * (1.0 - globally_unseen_prob)))
                .collect()
        } else {
            AHashMap::new()
        };

        UnigramGlobal {
            overall_probs,
            globally_unseen_prob,
            num_unseen_types,
            num_tokens,
        }
    }

    fn finish_global(&mut self, global: &Arc<UnigramGlobal>) {
        if self.stage == Stage::Open {
            self.finish_local();
        }
        let overall_seen: f64 = self
            .counts
            .keys()
            .filter_map(|term| global.overall_probability(term))
            .sum();
        self.overall_unseen_mass = 1.0 - overall_seen;
        self.global = Some(Arc::clone(global));
        self.stage = Stage::Finished;
    }

    fn num_tokens(&self) -> f64 {
        self.num_tokens
    }

    fn num_types(&self) -> usize {
        self.counts.len()
    }

    fn count(&self, term: &str) -> f64 {
        self.counts.get(term).copied().unwrap_or(0.0)
    }

    fn probability(&self, term: &str) -> f64 {
        match self.counts.get(term) {
            Some(&count) if self.global.is_some() => {
                count / self.num_tokens * (1.0 - self.unseen_mass)
            }
            Some(&count) => count / self.num_tokens,
            None => self.unseen_probability(term),
        }
    }

    fn iter_terms(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.counts.iter().map(|(term, &count)| (term.as_str(), count))
    }

    /// Exact divergence over the whole vocabulary, in four parts: terms of
    /// `self`, terms only in `other`, terms seen globally but in neither
    /// model, and terms never seen at all. The last two are closed forms.
    fn kl_divergence(&self, other: &Self, partial: bool, cache: Option<&KlDivergenceCache>) -> f64 {
        let mut kldiv = match cache {
            Some(cache) => cache.partial_divergence(other),
            None => self
                .counts
                .keys()
                .map(|term| kl_term(self.probability(term), other.probability(term)))
                .sum(),
        };
        if partial {
            return kldiv;
        }

        let Some(global) = &self.global else {
            return kldiv;
        };

        let mut overall_probs_other_only = 0.0;
        for term in other.counts.keys() {
            if self.counts.contains_key(term) {
                continue;
            }
            kldiv += kl_term(self.probability(term), other.probability(term));
            overall_probs_other_only += global.overall_probability(term).unwrap_or(0.0);
        }

        let (su, sou) = (self.unseen_mass, self.overall_unseen_mass);
        let (ou, oou) = (other.unseen_mass, other.overall_unseen_mass);
        if su > 0.0 && sou > 0.0 && ou > 0.0 && oou > 0.0 {
            let factor1 = (su.ln() - sou.ln()) - (ou.ln() - oou.ln());
            let factor2 = su / sou * factor1;
            kldiv += factor2 * (sou - overall_probs_other_only);
        }

        let p = global.never_seen_prob(su);
        let q = global.never_seen_prob(ou);
        kldiv += global.num_unseen_types * kl_term(p, q);

        kldiv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(models: &mut [UnigramModel]) -> Arc<UnigramGlobal> {
        for model in models.iter_mut() {
            model.finish_local();
        }
        let global = Arc::new(UnigramModel::compute_global(models.iter()));
        for model in models.iter_mut() {
            model.finish_global(&global);
        }
        global
    }

    fn model(counts: &[(&str, f64)]) -> UnigramModel {
        UnigramModel::from_counts(counts.iter().copied())
    }

    #[test]
    fn test_unseen_mass() {
        let mut m = model(&[("a", 1.0), ("b", 1.0), ("c", 8.0)]);
        m.finish_local();
        assert!((m.unseen_mass() - 0.2).abs() < 1e-12);

        // Capped at one half
        let mut m = model(&[("a", 1.0), ("b", 1.0)]);
        m.finish_local();
        assert_eq!(m.unseen_mass(), 0.5);

        // At least one type counts as seen once
        let mut m = model(&[("a", 50.0), ("b", 50.0)]);
        m.finish_local();
        assert!((m.unseen_mass() - 0.01).abs() < 1e-12);

        let mut empty = UnigramModel::new();
        empty.finish_local();
        assert_eq!(empty.unseen_mass(), 0.5);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let mut models = vec![
            model(&[("a", 5.0), ("b", 3.0), ("c", 1.0)]),
            model(&[("b", 2.0), ("d", 1.0), ("e", 4.0)]),
            model(&[("a", 1.0), ("f", 1.0)]),
        ];
        let global = finished(&mut models);

        for m in &models {
            let seen: f64 = ["a", "b", "c", "d", "e", "f"]
                .iter()
                .map(|t| m.probability(t))
                .sum();
            // Never-seen terms share the remainder
            let never_seen =
                m.unseen_mass() * global.globally_unseen_prob() / m.overall_unseen_mass();
            assert!((seen + never_seen - 1.0).abs() < 1e-9, "mass {seen} + {never_seen}");
        }
    }

    #[test]
    fn test_probability_cases() {
        let mut models = vec![model(&[("a", 3.0), ("b", 1.0)]), model(&[("c", 4.0)])];
        let global = finished(&mut models);
        let m = &models[0];

        assert!((m.probability("a") - 3.0 / 4.0 * (1.0 - m.unseen_mass())).abs() < 1e-12);
        let overall_c = global.overall_probability("c").unwrap();
        assert!(
            (m.probability("c") - m.unseen_mass() * overall_c / m.overall_unseen_mass()).abs() < 1e-12
        );
        let never = m.unseen_mass() * global.globally_unseen_prob() / global.num_unseen_types();
        assert!((m.probability("zzz") - never).abs() < 1e-15);
    }

    #[test]
    fn test_prune() {
        let mut m = model(&[("a", 1.0), ("b", 2.0), ("c", 5.0)]);
        m.prune(2.0);
        assert_eq!(m.num_types(), 2);
        assert_eq!(m.num_tokens(), 7.0);
        assert_eq!(m.count("a"), 0.0);
    }

    #[test]
    fn test_add_model_partial() {
        let mut cell = UnigramModel::new();
        cell.add_model(&model(&[("a", 2.0), ("b", 4.0)]), 0.5);
        cell.add_model(&model(&[("a", 1.0)]), 1.0);
        assert_eq!(cell.count("a"), 2.0);
        assert_eq!(cell.count("b"), 2.0);
        assert_eq!(cell.num_tokens(), 4.0);
    }

    #[test]
    fn test_kl_divergence_properties() {
        let mut models = vec![
            model(&[("a", 5.0), ("b", 1.0), ("x", 1.0)]),
            model(&[("a", 5.0), ("b", 1.0), ("x", 1.0)]),
            model(&[("a", 1.0), ("b", 5.0), ("y", 2.0)]),
        ];
        finished(&mut models);

        let same = models[0].kl_divergence(&models[1], false, None);
        let different = models[0].kl_divergence(&models[2], false, None);
        assert!(same.abs() < 1e-9, "identical models diverge by {same}");
        assert!(different > 0.0);

        let partial = models[0].kl_divergence(&models[2], true, None);
        let cache = KlDivergenceCache::new(&models[0]);
        let cached = models[0].kl_divergence(&models[2], true, Some(&cache));
        assert!((partial - cached).abs() < 1e-12);

        let sym_ab = models[0].symmetric_kl_divergence(&models[2], false, None);
        let sym_ba = models[2].symmetric_kl_divergence(&models[0], false, None);
        assert!((sym_ab - sym_ba).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_similarity() {
        let mut models = vec![
            model(&[("a", 5.0), ("b", 1.0)]),
            model(&[("a", 5.0), ("b", 1.0)]),
            model(&[("a", 1.0), ("b", 5.0)]),
        ];
        finished(&mut models);
        let same = models[0].cosine_similarity(&models[1], false, false);
        assert!((same - 1.0).abs() < 1e-12);
        let other = models[0].cosine_similarity(&models[2], false, false);
        assert!((other - 10.0 / 26.0).abs() < 1e-12);
        let smoothed = models[0].cosine_similarity(&models[1], true, true);
        assert!((smoothed - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sum_frequency_and_log_prob() {
        let mut models = vec![model(&[("a", 3.0), ("b", 1.0)]), model(&[("a", 2.0)])];
        finished(&mut models);
        let (cell, doc) = (&models[0], &models[1]);
        assert!((cell.sum_frequency(doc) - 1.5).abs() < 1e-12);
        let expected = 2.0 * cell.probability("a").ln();
        assert!((cell.model_log_prob(doc) - expected).abs() < 1e-12);
    }
}
