use crate::classifier::{ClassifierTrainer, ScoringClassifier};
use crate::error::{RerankError, Result};
use crate::factory::CandidateFeatureVectorFactory;
use gridlocate_core::{Cell, Document, Grid, LanguageModel};
use gridlocate_ranker::{sort_ranking, GridRanker, Ranking};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Candidates taken from the initial ranking
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// Perceptron epochs
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Cap on training documents, in corpus order
    #[serde(default)]
    pub max_training_docs: Option<usize>,
}

fn default_top_n() -> usize {
    10
}

fn default_epochs() -> usize {
    5
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            epochs: default_epochs(),
            max_training_docs: None,
        }
    }
}

/// Re-scores the top N cells of an initial ranking with a classifier over
/// candidate features.
///
/// The re-scored head is sorted stably, so candidates the classifier cannot
/// tell apart keep their initial order. The rest of the initial ranking
/// follows unchanged.
pub struct Reranker<M: LanguageModel> {
    initial: Arc<dyn GridRanker<M>>,
    factory: Arc<CandidateFeatureVectorFactory<M>>,
    classifier: Arc<dyn ScoringClassifier>,
    top_n: usize,
}

impl<M: LanguageModel> Reranker<M> {
    pub fn new(
        initial: Arc<dyn GridRanker<M>>,
        factory: Arc<CandidateFeatureVectorFactory<M>>,
        classifier: Arc<dyn ScoringClassifier>,
        top_n: usize,
    ) -> Result<Self> {
        if top_n == 0 {
            return Err(RerankError::InvalidConfig("rerank top N must be positive".to_string()));
        }
        Ok(Self {
            initial,
            factory,
            classifier,
            top_n,
        })
    }

    /// Fit the rerank classifier on finished documents. Each instance holds
    /// the initial top N plus the correct cell when it fell outside them.
    pub fn train(
        initial: Arc<dyn GridRanker<M>>,
        factory: Arc<CandidateFeatureVectorFactory<M>>,
        trainer: &dyn ClassifierTrainer<M>,
        docs: &[Document<M>],
        top_n: usize,
    ) -> Result<Self> {
        if top_n == 0 {
            return Err(RerankError::InvalidConfig("rerank top N must be positive".to_string()));
        }
        let grid = Arc::clone(initial.grid());
        let data: Vec<_> = docs
            .par_iter()
            .filter_map(|doc| {
                let correct = grid.find_best_cell_for_coord(&doc.coord, true)?;
                let ranking = initial.rank(doc, Some(&correct), true);
                let (candidates, label) = head_with_correct(&ranking, top_n, Some(&correct));
                Some((factory.make_instance(doc, &candidates), label?))
            })
            .collect();
        info!("Training reranker on {} instances, top {}", data.len(), top_n);
        let classifier = trainer.train(&data)?;
        Self::new(initial, factory, classifier, top_n)
    }

    pub fn initial(&self) -> &Arc<dyn GridRanker<M>> {
        &self.initial
    }

    #[inline]
    #[must_use]
    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Returns the initial ranking and the reranked one.
    ///
    /// `correct` matters only when building training data: a correct cell
    /// outside the top N joins the re-scored head and leaves the tail.
    /// Pass `None` when evaluating so the answer cannot leak into the head.
    pub fn rerank(
        &self,
        doc: &Document<M>,
        initial: Ranking<M>,
        correct: Option<&Arc<Cell<M>>>,
    ) -> (Ranking<M>, Ranking<M>) {
        let (head, _) = head_with_correct(&initial, self.top_n, correct);
        let instance = self.factory.make_instance(doc, &head);
        let scores = self.classifier.score_all(instance.features());
        let mut reranked: Ranking<M> = head
            .iter()
            .zip(scores)
            .map(|((cell, _), score)| (Arc::clone(cell), score))
            .collect();
        sort_ranking(&mut reranked);
        let n = self.top_n.min(initial.len());
        reranked.extend(
            initial[n..]
                .iter()
                .filter(|(cell, _)| !head.iter().any(|(c, _)| c.is_same(cell)))
                .cloned(),
        );
        (initial, reranked)
    }
}

/// The first `top_n` entries of `ranking`, plus `correct` when it ranks
/// lower, and the position of `correct` in the result
fn head_with_correct<M: LanguageModel>(
    ranking: &Ranking<M>,
    top_n: usize,
    correct: Option<&Arc<Cell<M>>>,
) -> (Ranking<M>, Option<usize>) {
    let mut head: Ranking<M> = ranking.iter().take(top_n).cloned().collect();
    let Some(correct) = correct else {
        return (head, None);
    };
    let found = head.iter().position(|(c, _)| c.is_same(correct));
    let label = match found {
        Some(label) => label,
        None => {
            let score = ranking
                .iter()
                .find(|(c, _)| c.is_same(correct))
                .map_or(f64::NEG_INFINITY, |(_, s)| *s);
            head.push((Arc::clone(correct), score));
            head.len() - 1
        }
    };
    (head, Some(label))
}

impl<M: LanguageModel> GridRanker<M> for Reranker<M> {
    fn grid(&self) -> &Arc<dyn Grid<M>> {
        self.initial.grid()
    }

    fn rank(&self, doc: &Document<M>, correct: Option<&Arc<Cell<M>>>, include_correct: bool) -> Ranking<M> {
        let initial = self.initial.rank(doc, correct, include_correct);
        self.rerank(doc, initial, None).1
    }
}
