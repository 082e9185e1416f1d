use crate::ranker::{candidate_cells, sort_ranking, GridRanker, Ranking};
use gridlocate_core::{Cell, CellDistributionCache, Document, Grid, LanguageModel};
use std::sync::Arc;

/// Ranks cells by the count-weighted average of the document's per-term
/// cell distributions
pub struct AverageCellProbabilityRanker<M: LanguageModel> {
    grid: Arc<dyn Grid<M>>,
    cache: Arc<CellDistributionCache<M>>,
}

impl<M: LanguageModel> AverageCellProbabilityRanker<M> {
    pub fn new(cache: Arc<CellDistributionCache<M>>) -> Self {
        Self {
            grid: Arc::clone(cache.grid()),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<CellDistributionCache<M>> {
        &self.cache
    }
}

impl<M: LanguageModel> GridRanker<M> for AverageCellProbabilityRanker<M> {
    fn grid(&self) -> &Arc<dyn Grid<M>> {
        &self.grid
    }

    fn rank(&self, doc: &Document<M>, correct: Option<&Arc<Cell<M>>>, include_correct: bool) -> Ranking<M> {
        let distribution = doc.grid_model().map(|m| self.cache.get_distribution_for_model(m));
        let mut ranking: Ranking<M> = candidate_cells(self.grid.as_ref(), correct, include_correct)
            .into_iter()
            .map(|cell| {
                let score = match (&distribution, cell.id()) {
                    (Some(dist), Some(id)) => dist.probability(id),
                    _ => 0.0,
                };
                (cell, score)
            })
            .collect();
        sort_ranking(&mut ranking);
        ranking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{grid_with, query};
    use gridlocate_core::ModelChoice;

    #[test]
    fn test_ranks_by_mixture() {
        let grid = grid_with(&[
            &[("desert", 1.0), ("camel", 1.0), ("city", 8.0)],
            &[("desert", 6.0), ("camel", 4.0)],
            &[("forest", 5.0)],
        ]);
        let cache = Arc::new(CellDistributionCache::new(Arc::clone(&grid), ModelChoice::Grid, 16).unwrap());
        let ranker = AverageCellProbabilityRanker::new(Arc::clone(&cache));
        let doc = query(&grid, &[("desert", 2.0), ("camel", 1.0)]);

        let ranking = ranker.rank(&doc, None, false);
        assert_eq!(ranking[0].0.grid_model().count("desert"), 6.0);
        let total: f64 = ranking.iter().map(|(_, s)| s).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(cache.len(), 2);

        let correct = grid.find_best_cell_for_coord(&doc.coord, true).unwrap();
        let ranking = ranker.rank(&doc, Some(&correct), true);
        assert_eq!(ranking.len(), 4);
        assert_eq!(ranking[3].1, 0.0);
    }
}
