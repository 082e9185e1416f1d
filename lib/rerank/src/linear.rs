use crate::classifier::{ClassifierTrainer, ScoringClassifier};
use crate::error::Result;
use crate::factory::CandidateFeatureVectorFactory;
use crate::instance::RankerInstance;
use ahash::AHashSet;
use gridlocate_core::{Cell, CellId, Document, Error, Grid, LanguageModel};
use gridlocate_ranker::{candidate_cells, sort_ranking, GridRanker, Ranking};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) fn require_finished<M: LanguageModel>(grid: &dyn Grid<M>) -> Result<()> {
    if grid.all_cells_computed() {
        Ok(())
    } else {
        Err(Error::InvalidState(format!("grid {} is not finished", grid.grid_id())).into())
    }
}

/// Training instance over `candidates` for a document whose correct cell
/// is `correct`; `None` when the correct cell is not a candidate
pub(crate) fn labelled_instance<M: LanguageModel>(
    factory: &CandidateFeatureVectorFactory<M>,
    doc: &Document<M>,
    candidates: &[Arc<Cell<M>>],
    correct: &Cell<M>,
) -> Option<(RankerInstance<M>, usize)> {
    let label = candidates.iter().position(|c| c.is_same(correct))?;
    let scored: Vec<_> = candidates.iter().map(|c| (Arc::clone(c), 0.0)).collect();
    Some((factory.make_instance(doc, &scored), label))
}

/// Scores every candidate cell with a trained classifier.
///
/// Cells outside the classifier's label set score -inf.
pub struct LinearClassifierRanker<M: LanguageModel> {
    grid: Arc<dyn Grid<M>>,
    factory: Arc<CandidateFeatureVectorFactory<M>>,
    classifier: Arc<dyn ScoringClassifier>,
    labels: AHashSet<CellId>,
}

impl<M: LanguageModel> LinearClassifierRanker<M> {
    /// Labels are the grid's non-empty cells
    pub fn new(
        grid: Arc<dyn Grid<M>>,
        factory: Arc<CandidateFeatureVectorFactory<M>>,
        classifier: Arc<dyn ScoringClassifier>,
    ) -> Result<Self> {
        require_finished(grid.as_ref())?;
        let labels = grid.nonempty_cells().iter().filter_map(|c| c.id()).collect();
        Ok(Self {
            grid,
            factory,
            classifier,
            labels,
        })
    }

    /// Fit on finished training documents. Documents whose correct cell
    /// has no training data are skipped.
    pub fn train(
        grid: Arc<dyn Grid<M>>,
        factory: Arc<CandidateFeatureVectorFactory<M>>,
        trainer: &dyn ClassifierTrainer<M>,
        docs: &[Document<M>],
    ) -> Result<Self> {
        require_finished(grid.as_ref())?;
        let candidates = grid.nonempty_cells();
        let data: Vec<_> = docs
            .par_iter()
            .filter_map(|doc| {
                let correct = grid.find_best_cell_for_coord(&doc.coord, false)?;
                labelled_instance(&factory, doc, candidates, &correct)
            })
            .collect();
        if data.len() < docs.len() {
            warn!(
                "Skipped {} of {} training documents without a recorded cell",
                docs.len() - data.len(),
                docs.len()
            );
        }
        info!("Training linear classifier on {} instances", data.len());
        let classifier = trainer.train(&data)?;
        Self::new(grid, factory, classifier)
    }

    pub fn classifier(&self) -> &Arc<dyn ScoringClassifier> {
        &self.classifier
    }

    #[inline]
    #[must_use]
    pub fn knows(&self, cell: &Cell<M>) -> bool {
        cell.id().is_some_and(|id| self.labels.contains(&id))
    }
}

impl<M: LanguageModel> GridRanker<M> for LinearClassifierRanker<M> {
    fn grid(&self) -> &Arc<dyn Grid<M>> {
        &self.grid
    }

    fn rank(&self, doc: &Document<M>, correct: Option<&Arc<Cell<M>>>, include_correct: bool) -> Ranking<M> {
        let cells = candidate_cells(self.grid.as_ref(), correct, include_correct);
        let (known, unknown): (Vec<_>, Vec<_>) = cells.into_iter().partition(|c| self.knows(c));

        let scored: Vec<_> = known.into_iter().map(|c| (c, 0.0)).collect();
        let instance = self.factory.make_instance(doc, &scored);
        let mut ranking: Ranking<M> = instance
            .candidates()
            .iter()
            .enumerate()
            .map(|(label, cell)| (Arc::clone(cell), self.classifier.score_label(instance.features(), label)))
            .collect();
        ranking.extend(unknown.into_iter().map(|c| (c, f64::NEG_INFINITY)));
        sort_ranking(&mut ranking);
        ranking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::PerceptronTrainer;
    use crate::factory::{FeatureConfig, FeatureKind};
    use crate::test_util::{at, grid_with, query};

    fn factory() -> Arc<CandidateFeatureVectorFactory<gridlocate_core::UnigramModel>> {
        let config = FeatureConfig {
            features: vec![FeatureKind::ModelComparison],
            ..FeatureConfig::default()
        };
        Arc::new(CandidateFeatureVectorFactory::from_config(&config).unwrap())
    }

    #[test]
    fn test_trained_ranker_prefers_matching_cell() {
        let grid = grid_with(&[
            &[("sand", 6.0), ("camel", 4.0)],
            &[("snow", 6.0), ("ice", 4.0)],
            &[("rain", 6.0), ("tree", 4.0)],
        ]);
        let docs = vec![
            at(&grid, 5.0, -175.0, &[("sand", 2.0), ("camel", 1.0)]),
            at(&grid, 5.0, -165.0, &[("snow", 2.0), ("ice", 1.0)]),
            at(&grid, 5.0, -155.0, &[("rain", 1.0), ("tree", 2.0)]),
        ];
        let ranker =
            LinearClassifierRanker::train(Arc::clone(&grid), factory(), &PerceptronTrainer::new(10), &docs).unwrap();

        let doc = query(&grid, &[("snow", 3.0), ("ice", 1.0)]);
        let ranking = ranker.rank(&doc, None, false);
        assert_eq!(ranking.len(), 3);
        assert_eq!(ranking[0].0.grid_model().count("snow"), 6.0);
    }

    #[test]
    fn test_unknown_cells_score_neg_infinity() {
        let grid = grid_with(&[&[("a", 1.0)], &[("b", 1.0)]]);
        let ranker = LinearClassifierRanker::new(
            Arc::clone(&grid),
            factory(),
            Arc::new(crate::classifier::LinearClassifier::zero()),
        )
        .unwrap();
        let doc = query(&grid, &[("a", 1.0)]);
        let correct = grid.find_best_cell_for_coord(&doc.coord, true).unwrap();

        let ranking = ranker.rank(&doc, Some(&correct), true);
        assert_eq!(ranking.len(), 3);
        assert!(ranking[2].0.is_same(&correct));
        assert_eq!(ranking[2].1, f64::NEG_INFINITY);
        assert_eq!(ranking[0].1, 0.0);
    }
}
