use super::{kl_term, LanguageModel};

/// Document-side quantities of a KL divergence, computed once per query.
///
/// Holds `p` and `p ln p` for every term of the query model so scoring a
/// cell only has to look up `q`.
#[derive(Debug, Clone, Default)]
pub struct KlDivergenceCache {
    terms: Vec<(String, f64, f64)>,
}

impl KlDivergenceCache {
    pub fn new<M: LanguageModel>(model: &M) -> Self {
        let terms = model
            .iter_terms()
            .filter_map(|(term, _)| {
                let p = model.probability(term);
                (p > 0.0).then(|| (term.to_string(), p, p * p.ln()))
            })
            .collect();
        Self { terms }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Sum over the cached terms of `p (ln p - ln q)`
    pub fn partial_divergence<M: LanguageModel>(&self, other: &M) -> f64 {
        self.terms
            .iter()
            .map(|(term, p, p_log_p)| {
                let q = other.probability(term);
                if q > 0.0 {
                    p_log_p - p * q.ln()
                } else {
                    kl_term(*p, q)
                }
            })
            .sum()
    }
}
