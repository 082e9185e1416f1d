//! Hierarchical beam ranker over progressively finer grids.
//!
//! Level 0 is scored by one root classifier over all of its cells. Every
//! recorded cell of level `k` owns a scope over the level `k + 1` cells whose
//! centers it contains. Scores within a scope are log-softmax normalized and
//! added to the parent's score; only the best `beam_size` cells of a level
//! are expanded.

use crate::classifier::{ClassifierTrainer, LinearClassifier, ScoringClassifier};
use crate::error::{RerankError, Result};
use crate::factory::CandidateFeatureVectorFactory;
use crate::linear::{labelled_instance, require_finished};
use ahash::AHashMap;
use gridlocate_core::{Cell, CellId, Document, Grid, LanguageModel};
use gridlocate_ranker::{sort_ranking, GridRanker, Ranking};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Candidate children with the classifier that scores them
#[derive(Clone)]
pub struct ClassifierScope<M: LanguageModel> {
    pub children: Vec<Arc<Cell<M>>>,
    pub classifier: Arc<dyn ScoringClassifier>,
}

/// Children of each recorded cell of the previous level, keyed by parent.
/// The returned vector has one map per level after the first.
pub fn child_partition<M: LanguageModel>(
    levels: &[Arc<dyn Grid<M>>],
) -> Vec<AHashMap<CellId, Vec<Arc<Cell<M>>>>> {
    levels
        .windows(2)
        .map(|pair| {
            let (coarse, fine) = (&pair[0], &pair[1]);
            let mut children: AHashMap<CellId, Vec<Arc<Cell<M>>>> = AHashMap::new();
            for cell in fine.nonempty_cells() {
                let parent = coarse
                    .find_best_cell_for_coord(&cell.center(), false)
                    .and_then(|p| p.id());
                match parent {
                    Some(id) => children.entry(id).or_default().push(Arc::clone(cell)),
                    None => debug!("Cell {} has no parent in grid {}", cell.label(), coarse.grid_id()),
                }
            }
            children
        })
        .collect()
}

/// `scores` shifted so that their exponentials sum to one
fn log_softmax(scores: &mut [f64]) {
    let max = scores
        .iter()
        .copied()
        .filter(|s| !s.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return;
    }
    let log_sum = max + scores.iter().map(|s| (s - max).exp()).filter(|e| !e.is_nan()).sum::<f64>().ln();
    for s in scores.iter_mut() {
        *s -= log_sum;
    }
}

pub struct HierarchicalClassifierRanker<M: LanguageModel> {
    levels: Vec<Arc<dyn Grid<M>>>,
    factory: Arc<CandidateFeatureVectorFactory<M>>,
    root: ClassifierScope<M>,
    /// `scopes[k]` expands cells of level `k` into level `k + 1`
    scopes: Vec<AHashMap<CellId, ClassifierScope<M>>>,
    beam_size: usize,
}

impl<M: LanguageModel> HierarchicalClassifierRanker<M> {
    /// Build with one classifier per scope. `classifier_for` receives the
    /// level being scored, the parent cell (none for the root) and the
    /// scope's children.
    pub fn from_classifiers<F>(
        levels: Vec<Arc<dyn Grid<M>>>,
        factory: Arc<CandidateFeatureVectorFactory<M>>,
        beam_size: usize,
        mut classifier_for: F,
    ) -> Result<Self>
    where
        F: FnMut(usize, Option<CellId>, &[Arc<Cell<M>>]) -> Result<Arc<dyn ScoringClassifier>>,
    {
        if levels.is_empty() {
            return Err(RerankError::InvalidConfig("hierarchical ranker needs at least one grid".to_string()));
        }
        if beam_size == 0 {
            return Err(RerankError::InvalidConfig("beam size must be positive".to_string()));
        }
        for grid in &levels {
            require_finished(grid.as_ref())?;
        }

        let root_children = levels[0].nonempty_cells().to_vec();
        let root = ClassifierScope {
            classifier: classifier_for(0, None, &root_children)?,
            children: root_children,
        };
        let mut scopes = Vec::with_capacity(levels.len() - 1);
        for (k, partition) in child_partition(&levels).into_iter().enumerate() {
            let mut level_scopes = AHashMap::with_capacity(partition.len());
            for (parent, children) in partition {
                let classifier = classifier_for(k + 1, Some(parent), &children)?;
                level_scopes.insert(parent, ClassifierScope { children, classifier });
            }
            scopes.push(level_scopes);
        }
        info!(
            "Hierarchical ranker: {} levels, {} scopes, beam {}",
            levels.len(),
            1 + scopes.iter().map(|s| s.len()).sum::<usize>(),
            beam_size
        );
        Ok(Self {
            levels,
            factory,
            root,
            scopes,
            beam_size,
        })
    }

    /// Train one classifier per scope on finished documents. A scope with
    /// no training documents gets an all-zero classifier.
    pub fn train(
        levels: Vec<Arc<dyn Grid<M>>>,
        factory: Arc<CandidateFeatureVectorFactory<M>>,
        trainer: &dyn ClassifierTrainer<M>,
        docs: &[Document<M>],
        beam_size: usize,
    ) -> Result<Self> {
        let train_factory = Arc::clone(&factory);
        let grids = levels.clone();
        Self::from_classifiers(levels, factory, beam_size, |level, parent, children| {
            let grid = &grids[level];
            let data: Vec<_> = docs
                .par_iter()
                .filter_map(|doc| {
                    let correct = grid.find_best_cell_for_coord(&doc.coord, false)?;
                    if let Some(parent) = parent {
                        let coarse = grids[level - 1].find_best_cell_for_coord(&correct.center(), false)?;
                        if coarse.id() != Some(parent) {
                            return None;
                        }
                    }
                    labelled_instance(&train_factory, doc, children, &correct)
                })
                .collect();
            if data.is_empty() {
                debug!("No training data for level {} scope {:?}", level, parent);
                return Ok(Arc::new(LinearClassifier::zero()) as Arc<dyn ScoringClassifier>);
            }
            trainer.train(&data)
        })
    }

    #[inline]
    #[must_use]
    pub fn beam_size(&self) -> usize {
        self.beam_size
    }

    pub fn levels(&self) -> &[Arc<dyn Grid<M>>] {
        &self.levels
    }

    /// Children of a scope with `base` plus their log-softmax scores
    fn expand(&self, doc: &Document<M>, scope: &ClassifierScope<M>, base: f64) -> Ranking<M> {
        let scored: Vec<_> = scope.children.iter().map(|c| (Arc::clone(c), 0.0)).collect();
        let instance = self.factory.make_instance(doc, &scored);
        let mut scores = scope.classifier.score_all(instance.features());
        log_softmax(&mut scores);
        scope
            .children
            .iter()
            .zip(scores)
            .map(|(cell, score)| (Arc::clone(cell), base + score))
            .collect()
    }
}

impl<M: LanguageModel> GridRanker<M> for HierarchicalClassifierRanker<M> {
    /// The finest grid
    fn grid(&self) -> &Arc<dyn Grid<M>> {
        &self.levels[self.levels.len() - 1]
    }

    fn rank(&self, doc: &Document<M>, correct: Option<&Arc<Cell<M>>>, include_correct: bool) -> Ranking<M> {
        let mut beam = self.expand(doc, &self.root, 0.0);
        sort_ranking(&mut beam);
        for scopes in &self.scopes {
            beam.truncate(self.beam_size);
            let mut next: Ranking<M> = beam
                .par_iter()
                .flat_map_iter(|(parent, score)| {
                    parent
                        .id()
                        .and_then(|id| scopes.get(&id))
                        .map(|scope| self.expand(doc, scope, *score))
                        .unwrap_or_default()
                })
                .collect();
            sort_ranking(&mut next);
            beam = next;
        }
        beam.truncate(self.beam_size);

        if let Some(cell) = correct.filter(|_| include_correct) {
            if !beam.iter().any(|(c, _)| c.is_same(cell)) {
                beam.push((Arc::clone(cell), f64::NEG_INFINITY));
            }
        }
        beam
    }
}
