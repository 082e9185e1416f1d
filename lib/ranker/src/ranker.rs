use gridlocate_core::{Cell, Document, Grid, LanguageModel};
use ordered_float::OrderedFloat;
use std::sync::Arc;

/// Cells with scores, best first
pub type Ranking<M> = Vec<(Arc<Cell<M>>, f64)>;

/// Strategy that orders a grid's cells for a query document.
///
/// Higher scores are better. Ranking never mutates cells, so one ranker can
/// serve concurrent queries.
pub trait GridRanker<M: LanguageModel>: Send + Sync {
    fn grid(&self) -> &Arc<dyn Grid<M>>;

    /// Rank candidate cells for `doc`. With `include_correct`, `correct` is
    /// ranked too even if it has no training documents.
    fn rank(&self, doc: &Document<M>, correct: Option<&Arc<Cell<M>>>, include_correct: bool) -> Ranking<M>;
}

/// Candidate cells for a query: the grid's non-empty cells, plus the
/// correct cell when requested
pub fn candidate_cells<M: LanguageModel>(
    grid: &dyn Grid<M>,
    correct: Option<&Arc<Cell<M>>>,
    include_correct: bool,
) -> Vec<Arc<Cell<M>>> {
    match correct {
        Some(cell) if include_correct => grid.iter_nonempty_cells_including(std::slice::from_ref(cell)),
        _ => grid.nonempty_cells().to_vec(),
    }
}

#[inline]
fn score_key(score: f64) -> OrderedFloat<f64> {
    if score.is_nan() {
        OrderedFloat(f64::NEG_INFINITY)
    } else {
        OrderedFloat(score)
    }
}

/// Sort best first. Stable, so ties keep candidate order; NaN sorts as -inf.
pub fn sort_ranking<M: LanguageModel>(ranking: &mut Ranking<M>) {
    ranking.sort_by(|a, b| score_key(b.1).cmp(&score_key(a.1)));
}

/// 1-based position of `cell` in `ranking`
pub fn rank_of<M: LanguageModel>(ranking: &Ranking<M>, cell: &Cell<M>) -> Option<usize> {
    ranking.iter().position(|(c, _)| c.is_same(cell)).map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{grid_with, query};

    #[test]
    fn test_sort_is_stable_and_nan_last() {
        let grid = grid_with(&[&[("a", 1.0)], &[("b", 1.0)], &[("c", 1.0)], &[("d", 1.0)]]);
        let cells = grid.nonempty_cells();
        let mut ranking: Ranking<_> = vec![
            (Arc::clone(&cells[0]), 1.0),
            (Arc::clone(&cells[1]), f64::NAN),
            (Arc::clone(&cells[2]), 2.0),
            (Arc::clone(&cells[3]), 1.0),
        ];
        sort_ranking(&mut ranking);
        let order: Vec<_> = ranking.iter().map(|(c, _)| c.id()).collect();
        assert_eq!(
            order,
            vec![cells[2].id(), cells[0].id(), cells[3].id(), cells[1].id()]
        );
        assert_eq!(rank_of(&ranking, &cells[3]), Some(3));
    }

    #[test]
    fn test_candidates_include_correct_once() {
        let grid = grid_with(&[&[("a", 1.0)], &[("b", 1.0)]]);
        let doc = query(&grid, &[("a", 1.0)]);
        let recorded = Arc::clone(&grid.nonempty_cells()[1]);
        assert_eq!(candidate_cells(grid.as_ref(), Some(&recorded), true).len(), 2);

        let unrecorded = grid.find_best_cell_for_coord(&doc.coord, true).unwrap();
        assert!(!unrecorded.is_recorded());
        assert_eq!(candidate_cells(grid.as_ref(), Some(&unrecorded), true).len(), 3);
        assert_eq!(candidate_cells(grid.as_ref(), Some(&unrecorded), false).len(), 2);
    }
}
