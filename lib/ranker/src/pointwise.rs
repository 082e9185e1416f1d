//! Rankers that score every candidate cell independently.
//!
//! A [`PointwiseRanker`] prepares per-query scratch data once, then scores
//! the candidates in parallel with rayon. Scorers only read cells.

use crate::ranker::{candidate_cells, sort_ranking, GridRanker, Ranking};
use gridlocate_core::{Cell, Document, Grid, KlDivergenceCache, LanguageModel};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// Upper tolerance for cosine similarity before it is treated as a bug
const COSINE_TOLERANCE: f64 = 1.002;

pub trait CellScorer<M: LanguageModel>: Send + Sync {
    /// Per-query data shared by all cell scores of one query
    type Scratch: Send + Sync;

    fn prepare(&self, doc: &Document<M>) -> Self::Scratch;

    fn score_cell(&self, doc: &Document<M>, cell: &Cell<M>, scratch: &Self::Scratch) -> f64;
}

pub struct PointwiseRanker<M: LanguageModel, S> {
    grid: Arc<dyn Grid<M>>,
    scorer: S,
    parallel: bool,
}

impl<M: LanguageModel, S: CellScorer<M>> PointwiseRanker<M, S> {
    pub fn new(grid: Arc<dyn Grid<M>>, scorer: S) -> Self {
        Self {
            grid,
            scorer,
            parallel: true,
        }
    }

    /// Score cells on the calling thread only
    #[must_use]
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }
}

impl<M: LanguageModel, S: CellScorer<M>> GridRanker<M> for PointwiseRanker<M, S> {
    fn grid(&self) -> &Arc<dyn Grid<M>> {
        &self.grid
    }

    fn rank(&self, doc: &Document<M>, correct: Option<&Arc<Cell<M>>>, include_correct: bool) -> Ranking<M> {
        let cells = candidate_cells(self.grid.as_ref(), correct, include_correct);
        let scratch = self.scorer.prepare(doc);
        let score = |cell: Arc<Cell<M>>| {
            let s = self.scorer.score_cell(doc, &cell, &scratch);
            (cell, s)
        };
        let mut ranking: Ranking<M> = if self.parallel {
            cells.into_par_iter().map(score).collect()
        } else {
            cells.into_iter().map(score).collect()
        };
        sort_ranking(&mut ranking);
        debug!("Ranked {} cells for {}", ranking.len(), doc.name);
        ranking
    }
}

/// Negative KL divergence from the document to the cell
#[derive(Debug, Clone, Copy, Default)]
pub struct KlDivergenceScorer {
    /// Sum only over the document's terms
    pub partial: bool,
    /// Average both directions
    pub symmetric: bool,
}

impl<M: LanguageModel> CellScorer<M> for KlDivergenceScorer {
    type Scratch = Option<KlDivergenceCache>;

    fn prepare(&self, doc: &Document<M>) -> Self::Scratch {
        doc.grid_model().map(KlDivergenceCache::new)
    }

    fn score_cell(&self, doc: &Document<M>, cell: &Cell<M>, scratch: &Self::Scratch) -> f64 {
        let Some(model) = doc.grid_model() else {
            return f64::NEG_INFINITY;
        };
        let divergence = if self.symmetric {
            model.symmetric_kl_divergence(cell.grid_model(), self.partial, scratch.as_ref())
        } else {
            model.kl_divergence(cell.grid_model(), self.partial, scratch.as_ref())
        };
        -divergence
    }
}

/// Cosine similarity between document and cell
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineScorer {
    pub partial: bool,
    pub smoothed: bool,
}

impl<M: LanguageModel> CellScorer<M> for CosineScorer {
    type Scratch = ();

    fn prepare(&self, _doc: &Document<M>) {}

    fn score_cell(&self, doc: &Document<M>, cell: &Cell<M>, _scratch: &()) -> f64 {
        let Some(model) = doc.grid_model() else {
            return f64::NEG_INFINITY;
        };
        let similarity = model.cosine_similarity(cell.grid_model(), self.partial, self.smoothed);
        assert!(
            (0.0..=COSINE_TOLERANCE).contains(&similarity),
            "cosine similarity {} out of range for {} vs cell {}",
            similarity,
            doc.name,
            cell.label()
        );
        similarity
    }
}

/// Sum of the cell's unsmoothed frequencies of the document's terms
#[derive(Debug, Clone, Copy, Default)]
pub struct SumFrequencyScorer;

impl<M: LanguageModel> CellScorer<M> for SumFrequencyScorer {
    type Scratch = ();

    fn prepare(&self, _doc: &Document<M>) {}

    fn score_cell(&self, doc: &Document<M>, cell: &Cell<M>, _scratch: &()) -> f64 {
        doc.grid_model()
            .map_or(f64::NEG_INFINITY, |model| cell.grid_model().sum_frequency(model))
    }
}

pub type KlDivergenceRanker<M> = PointwiseRanker<M, KlDivergenceScorer>;
pub type CosineRanker<M> = PointwiseRanker<M, CosineScorer>;
pub type SumFrequencyRanker<M> = PointwiseRanker<M, SumFrequencyScorer>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{grid_with, query};

    fn names(ranking: &Ranking<gridlocate_core::UnigramModel>) -> Vec<String> {
        ranking
            .iter()
            .map(|(cell, _)| cell.most_salient().map(|(n, _)| n.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_cosine_scenario() {
        let grid = grid_with(&[
            &[("a", 5.0), ("b", 1.0)],
            &[("a", 1.0), ("b", 5.0)],
            &[("a", 3.0), ("b", 3.0)],
        ]);
        let doc = query(&grid, &[("a", 5.0), ("b", 1.0)]);
        let ranker = PointwiseRanker::new(Arc::clone(&grid), CosineScorer::default());
        let ranking = ranker.rank(&doc, None, false);

        assert_eq!(names(&ranking), vec!["cell0", "cell2", "cell1"]);
        assert!((ranking[0].1 - 1.0).abs() < 1e-9);
        assert!(ranking[1].1 > ranking[2].1);
    }

    #[test]
    fn test_kl_identical_model_scores_highest() {
        let grid = grid_with(&[
            &[("a", 1.0), ("b", 5.0), ("c", 2.0)],
            &[("a", 5.0), ("b", 1.0), ("c", 2.0)],
            &[("c", 4.0), ("d", 4.0)],
        ]);
        let doc = query(&grid, &[("a", 5.0), ("b", 1.0), ("c", 2.0)]);
        for (partial, symmetric) in [(false, false), (true, false), (false, true), (true, true)] {
            let ranker = PointwiseRanker::new(Arc::clone(&grid), KlDivergenceScorer { partial, symmetric });
            let ranking = ranker.rank(&doc, None, false);
            assert_eq!(names(&ranking)[0], "cell1", "partial={partial} symmetric={symmetric}");
            assert!(ranking[0].1.abs() < 1e-9);
            assert!(ranking.iter().all(|(_, s)| ranking[0].1 >= *s));
        }
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let grid = grid_with(&[&[("a", 2.0)], &[("a", 1.0), ("b", 1.0)], &[("b", 3.0)]]);
        let doc = query(&grid, &[("a", 1.0)]);
        let parallel = PointwiseRanker::new(Arc::clone(&grid), SumFrequencyScorer);
        let sequential = PointwiseRanker::new(Arc::clone(&grid), SumFrequencyScorer).sequential();
        let a = parallel.rank(&doc, None, false);
        let b = sequential.rank(&doc, None, false);
        assert_eq!(names(&a), names(&b));
        assert_eq!(names(&a), vec!["cell0", "cell1", "cell2"]);
        assert_eq!(a[0].1, 1.0);
        assert_eq!(a[2].1, 0.0);
    }

    #[test]
    fn test_missing_model_scores_negative_infinity() {
        let grid = grid_with(&[&[("a", 1.0)]]);
        let doc = gridlocate_core::Document::new(
            "empty",
            gridlocate_core::Coord::new(0.0, 0.0).unwrap(),
            gridlocate_core::Split::Test,
        );
        let ranker = PointwiseRanker::new(grid, KlDivergenceScorer::default());
        assert_eq!(ranker.rank(&doc, None, false)[0].1, f64::NEG_INFINITY);
    }
}
