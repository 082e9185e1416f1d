//! Per-term distributions over cells.
//!
//! For a term, the distribution answers "which cells use this term most":
//! each non-empty cell's probability for the term, normalized over cells.
//! Distributions are built lazily and kept in a bounded LRU cache shared by
//! concurrent queries.

use crate::cell::CellId;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::model::LanguageModel;
use ahash::AHashMap;
use lru::LruCache;
use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

/// Which of a cell's models a distribution is computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    #[default]
    Grid,
    Rerank,
}

/// A mapping from cell to probability.
///
/// `normalized` is false when the total mass was zero and nothing was
/// divided.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellDistribution {
    probs: AHashMap<CellId, f64>,
    normalized: bool,
}

impl CellDistribution {
    fn from_mass(mut probs: AHashMap<CellId, f64>) -> Self {
        let total: f64 = probs.values().sum();
        if total == 0.0 {
            return Self {
                probs,
                normalized: false,
            };
        }
        for p in probs.values_mut() {
            *p /= total;
        }
        Self {
            probs,
            normalized: true,
        }
    }

    #[inline]
    #[must_use]
    pub fn probability(&self, id: CellId) -> f64 {
        self.probs.get(&id).copied().unwrap_or(0.0)
    }

    #[inline]
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.probs.values().sum()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.probs.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellId, f64)> + '_ {
        self.probs.iter().map(|(&id, &p)| (id, p))
    }

    /// Cells by descending probability, ties by cell id
    pub fn ranked(&self) -> Vec<(CellId, f64)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by_key(|&(id, p)| (std::cmp::Reverse(OrderedFloat(p)), id));
        ranked
    }
}

pub struct CellDistributionCache<M: LanguageModel> {
    grid: Arc<dyn Grid<M>>,
    model: ModelChoice,
    cache: RwLock<LruCache<String, Arc<CellDistribution>>>,
}

impl<M: LanguageModel> CellDistributionCache<M> {
    pub fn new(grid: Arc<dyn Grid<M>>, model: ModelChoice, capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::InvalidConfig("cell distribution cache capacity must be positive".to_string()))?;
        if !grid.all_cells_computed() {
            return Err(Error::InvalidState(
                "cell distributions need a finished grid".to_string(),
            ));
        }
        Ok(Self {
            grid,
            model,
            cache: RwLock::new(LruCache::new(capacity)),
        })
    }

    pub fn grid(&self) -> &Arc<dyn Grid<M>> {
        &self.grid
    }

    /// Number of cached distributions
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn model_of<'a>(&self, cell: &'a crate::cell::Cell<M>) -> &'a M {
        match self.model {
            ModelChoice::Grid => cell.grid_model(),
            ModelChoice::Rerank => cell.rerank_model(),
        }
    }

    fn build_term_distribution(&self, term: &str) -> CellDistribution {
        let probs = self
            .grid
            .nonempty_cells()
            .iter()
            .filter_map(|cell| {
                let id = cell.id()?;
                let model = self.model_of(cell);
                (!model.is_empty()).then(|| (id, model.probability(term)))
            })
            .collect();
        CellDistribution::from_mass(probs)
    }

    /// Distribution of `term` over the grid's non-empty cells.
    ///
    /// Hits take only the read lock and do not change the eviction order,
    /// so entries are evicted oldest insert first. Concurrent misses on the
    /// same term may both build it; the first insert is kept and returned
    /// to both.
    pub fn get_term_distribution(&self, term: &str) -> Arc<CellDistribution> {
        if let Some(dist) = self.cache.read().peek(term) {
            return Arc::clone(dist);
        }
        let built = Arc::new(self.build_term_distribution(term));
        if !built.is_normalized() {
            debug!("Term {:?} has no mass in any cell", term);
        }
        let mut cache = self.cache.write();
        if let Some(dist) = cache.peek(term) {
            return Arc::clone(dist);
        }
        cache.put(term.to_string(), Arc::clone(&built));
        built
    }

    /// Mixture of the term distributions of `model`, weighted by term count
    pub fn get_distribution_for_model(&self, model: &M) -> CellDistribution {
        let mut mass: AHashMap<CellId, f64> = AHashMap::new();
        for (term, count) in model.iter_terms() {
            let dist = self.get_term_distribution(term);
            for (id, p) in dist.iter() {
                *mass.entry(id).or_insert(0.0) += count * p;
            }
        }
        if mass.values().sum::<f64>() == 0.0 {
            let zeros = self
                .grid
                .nonempty_cells()
                .iter()
                .filter_map(|cell| cell.id())
                .map(|id| (id, 0.0))
                .collect();
            return CellDistribution {
                probs: zeros,
                normalized: false,
            };
        }
        CellDistribution::from_mass(mass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Coord;
    use crate::document::{Document, Split};
    use crate::grid::UniformGrid;
    use crate::model::UnigramModel;
    use proptest::prelude::*;

    fn grid_from(cells: &[Vec<(&str, f64)>]) -> Arc<dyn Grid<UnigramModel>> {
        let mut grid = UniformGrid::new(0, 10.0, 1).unwrap();
        let docs: Vec<_> = cells
            .iter()
            .enumerate()
            .map(|(i, counts)| {
                let coord = Coord::new(-85.0 + 10.0 * i as f64, 5.0).unwrap();
                Arc::new(
                    Document::new(format!("d{i}"), coord, Split::Training)
                        .with_grid_model(UnigramModel::from_counts(counts.iter().copied())),
                )
            })
            .collect();
        grid.add_training_documents(&docs).unwrap();
        grid.finish().unwrap();
        Arc::new(grid)
    }

    fn sample_grid() -> Arc<dyn Grid<UnigramModel>> {
        grid_from(&[
            vec![("beach", 8.0), ("sun", 2.0)],
            vec![("snow", 6.0), ("sun", 1.0)],
            vec![("beach", 1.0), ("city", 5.0)],
        ])
    }

    #[test]
    fn test_term_distribution_cached_and_normalized() {
        let cache = CellDistributionCache::new(sample_grid(), ModelChoice::Grid, 4).unwrap();
        let first = cache.get_term_distribution("beach");
        let second = cache.get_term_distribution("beach");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_normalized());
        assert!((first.total_mass() - 1.0).abs() < 1e-9);
        assert_eq!(first.len(), 3);

        let ranked = first.ranked();
        let top = cache.grid().cell(ranked[0].0).unwrap();
        assert_eq!(top.grid_model().count("beach"), 8.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = CellDistributionCache::new(sample_grid(), ModelChoice::Grid, 2).unwrap();
        let beach = cache.get_term_distribution("beach");
        cache.get_term_distribution("sun");
        cache.get_term_distribution("snow");
        assert_eq!(cache.len(), 2);

        // Rebuilt after eviction, with the same contents
        let rebuilt = cache.get_term_distribution("beach");
        assert!(!Arc::ptr_eq(&beach, &rebuilt));
        assert_eq!(*beach, *rebuilt);
    }

    #[test]
    fn test_hits_do_not_reorder_eviction() {
        let cache = CellDistributionCache::new(sample_grid(), ModelChoice::Grid, 2).unwrap();
        let beach = cache.get_term_distribution("beach");
        let sun = cache.get_term_distribution("sun");
        assert!(Arc::ptr_eq(&beach, &cache.get_term_distribution("beach")));
        cache.get_term_distribution("snow");

        assert!(!Arc::ptr_eq(&beach, &cache.get_term_distribution("beach")));
        assert_eq!(cache.len(), 2);
        assert!(!Arc::ptr_eq(&sun, &cache.get_term_distribution("sun")));
    }

    #[test]
    fn test_concurrent_lookups_share_one_entry() {
        let cache = CellDistributionCache::new(sample_grid(), ModelChoice::Grid, 4).unwrap();
        let first = cache.get_term_distribution("sun");
        let seen: Vec<Arc<CellDistribution>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.get_term_distribution("sun")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(seen.iter().all(|dist| Arc::ptr_eq(dist, &first)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_model_mixture() {
        let cache = CellDistributionCache::new(sample_grid(), ModelChoice::Grid, 8).unwrap();
        let query = UnigramModel::from_counts([("beach", 3.0), ("sun", 1.0)]);
        let dist = cache.get_distribution_for_model(&query);
        assert!(dist.is_normalized());
        assert!((dist.total_mass() - 1.0).abs() < 1e-9);
        let top = cache.grid().cell(dist.ranked()[0].0).unwrap();
        assert_eq!(top.grid_model().count("beach"), 8.0);
    }

    #[test]
    fn test_empty_model_gives_unnormalized_zeros() {
        let cache = CellDistributionCache::new(sample_grid(), ModelChoice::Rerank, 8).unwrap();
        let dist = cache.get_distribution_for_model(&UnigramModel::new());
        assert!(!dist.is_normalized());
        assert_eq!(dist.len(), 3);
        assert_eq!(dist.total_mass(), 0.0);
    }

    #[test]
    fn test_requires_finished_grid_and_capacity() {
        let unfinished: Arc<dyn Grid<UnigramModel>> = Arc::new(UniformGrid::new(0, 10.0, 1).unwrap());
        assert!(CellDistributionCache::new(unfinished, ModelChoice::Grid, 4).is_err());
        assert!(CellDistributionCache::new(sample_grid(), ModelChoice::Grid, 0).is_err());
    }

    proptest! {
        #[test]
        fn prop_term_distribution_sums_to_one(
            counts in proptest::collection::vec(1u32..50, 1..8),
            term_count in 0u32..20,
        ) {
            let cells: Vec<Vec<(&str, f64)>> = counts
                .iter()
                .enumerate()
                .map(|(i, &c)| {
                    let mut cell = vec![("filler", f64::from(c))];
                    if i == 0 && term_count > 0 {
                        cell.push(("needle", f64::from(term_count)));
                    }
                    cell
                })
                .collect();
            let cache = CellDistributionCache::new(grid_from(&cells), ModelChoice::Grid, 4).unwrap();
            let first = cache.get_term_distribution("needle");
            let second = cache.get_term_distribution("needle");
            prop_assert_eq!(&*first, &*second);
            if first.iter().any(|(_, p)| p > 0.0) {
                prop_assert!(first.is_normalized());
                prop_assert!((first.total_mass() - 1.0).abs() < 1e-9);
            }
        }
    }
}
