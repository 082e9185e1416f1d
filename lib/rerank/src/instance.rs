use crate::error::{RerankError, Result};
use crate::feature::AggregateFeatureVector;
use gridlocate_core::{Cell, LanguageModel};
use std::sync::Arc;

/// A query's candidate cells with one feature slice per candidate.
///
/// Label `i` refers to `candidates[i]` and to feature slice `i`.
#[derive(Debug, Clone)]
pub struct RankerInstance<M: LanguageModel> {
    candidates: Vec<Arc<Cell<M>>>,
    features: AggregateFeatureVector,
}

impl<M: LanguageModel> RankerInstance<M> {
    pub fn new(candidates: Vec<Arc<Cell<M>>>, features: AggregateFeatureVector) -> Result<Self> {
        if candidates.len() != features.slice_count() {
            return Err(RerankError::CandidateCountMismatch {
                candidates: candidates.len(),
                slices: features.slice_count(),
            });
        }
        Ok(Self {
            candidates,
            features,
        })
    }

    /// Lengths must already agree
    pub(crate) fn from_parts(candidates: Vec<Arc<Cell<M>>>, features: AggregateFeatureVector) -> Self {
        debug_assert_eq!(candidates.len(), features.slice_count());
        Self {
            candidates,
            features,
        }
    }

    #[inline]
    pub fn candidates(&self) -> &[Arc<Cell<M>>] {
        &self.candidates
    }

    #[inline]
    pub fn features(&self) -> &AggregateFeatureVector {
        &self.features
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Label of `cell` among the candidates
    pub fn label_of(&self, cell: &Cell<M>) -> Option<usize> {
        self.candidates.iter().position(|c| c.is_same(cell))
    }
}
