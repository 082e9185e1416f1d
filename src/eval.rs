//! Ranking evaluation over a split.
//!
//! For each document the correct cell is the grid cell containing its
//! coordinate (an unrecorded cell when no training document fell there).
//! The correct cell is always forced into the ranking so its rank is known.

use gridlocate_core::{Cell, CellId, Coord, Document, LanguageModel};
use gridlocate_ranker::{rank_of, GridRanker, Ranking};
use gridlocate_rerank::Reranker;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Where a cell's predicted location sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionPoint {
    #[default]
    Center,
    Centroid,
}

impl PredictionPoint {
    #[inline]
    pub fn of<M: LanguageModel>(self, cell: &Cell<M>) -> Coord {
        match self {
            PredictionPoint::Center => cell.center(),
            PredictionPoint::Centroid => cell.centroid(),
        }
    }
}

/// Outcome of one ranking for one document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankOutcome {
    /// 1-based rank of the correct cell
    pub rank: Option<usize>,
    pub predicted: Option<CellId>,
    pub error_km: Option<f64>,
}

impl RankOutcome {
    fn new<M: LanguageModel>(ranking: &Ranking<M>, correct: &Cell<M>, doc: &Document<M>, point: PredictionPoint) -> Self {
        let top = ranking.first().map(|(cell, _)| cell);
        Self {
            rank: rank_of(ranking, correct),
            predicted: top.and_then(|c| c.id()),
            error_km: top.map(|c| point.of(c).distance_km(&doc.coord)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentResult {
    pub name: String,
    pub correct: Option<CellId>,
    /// Distance from the document to its own cell's prediction point
    pub oracle_km: f64,
    pub initial: RankOutcome,
    pub reranked: Option<RankOutcome>,
}

/// Aggregate statistics for one ranking strategy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankSummary {
    pub documents: usize,
    pub accuracy_at_1: f64,
    pub mean_rank: Option<f64>,
    pub median_rank: Option<f64>,
    pub mean_error_km: Option<f64>,
    pub median_error_km: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalSummary {
    pub evaluated: usize,
    /// Documents without a language model or a correct cell
    pub skipped: usize,
    pub mean_oracle_km: Option<f64>,
    pub initial: RankSummary,
    pub reranked: Option<RankSummary>,
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

impl RankSummary {
    fn from_outcomes<'a>(outcomes: impl Iterator<Item = &'a RankOutcome>) -> Self {
        let mut documents = 0;
        let mut first = 0;
        let mut ranks = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            documents += 1;
            if let Some(rank) = outcome.rank {
                if rank == 1 {
                    first += 1;
                }
                ranks.push(rank as f64);
            }
            errors.extend(outcome.error_km);
        }
        Self {
            documents,
            accuracy_at_1: if documents == 0 { 0.0 } else { first as f64 / documents as f64 },
            mean_rank: mean(&ranks),
            median_rank: median(&ranks),
            mean_error_km: mean(&errors),
            median_error_km: median(&errors),
        }
    }
}

/// Ranks documents and scores the rankings against their true cells
pub struct Evaluator<M: LanguageModel> {
    ranker: Arc<dyn GridRanker<M>>,
    reranker: Option<Arc<Reranker<M>>>,
    prediction: PredictionPoint,
}

impl<M: LanguageModel> Evaluator<M> {
    pub fn new(ranker: Arc<dyn GridRanker<M>>, prediction: PredictionPoint) -> Self {
        Self {
            ranker,
            reranker: None,
            prediction,
        }
    }

    /// Rerank after `ranker`; the reranker should wrap the same ranker
    pub fn with_reranker(mut self, reranker: Arc<Reranker<M>>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// `None` when the document cannot be evaluated. `doc` must be finished
    /// against the grid's global statistics.
    pub fn evaluate_document(&self, doc: &Document<M>) -> Option<DocumentResult> {
        doc.grid_model()?;
        let correct = self.ranker.grid().find_best_cell_for_coord(&doc.coord, true)?;
        let ranking = self.ranker.rank(doc, Some(&correct), true);
        let (initial, reranked) = match &self.reranker {
            Some(reranker) => {
                let (initial, reranked) = reranker.rerank(doc, ranking, None);
                (initial, Some(reranked))
            }
            None => (ranking, None),
        };
        Some(DocumentResult {
            name: doc.name.clone(),
            correct: correct.id(),
            oracle_km: self.prediction.of(&correct).distance_km(&doc.coord),
            initial: RankOutcome::new(&initial, &correct, doc, self.prediction),
            reranked: reranked.map(|r| RankOutcome::new(&r, &correct, doc, self.prediction)),
        })
    }

    /// Evaluate documents in parallel; results keep input order
    pub fn evaluate(&self, docs: &[Document<M>]) -> (EvalSummary, Vec<DocumentResult>) {
        let results: Vec<Option<DocumentResult>> = docs.par_iter().map(|d| self.evaluate_document(d)).collect();
        let skipped = results.iter().filter(|r| r.is_none()).count();
        let results: Vec<DocumentResult> = results.into_iter().flatten().collect();

        let oracle: Vec<f64> = results.iter().map(|r| r.oracle_km).collect();
        let summary = EvalSummary {
            evaluated: results.len(),
            skipped,
            mean_oracle_km: mean(&oracle),
            initial: RankSummary::from_outcomes(results.iter().map(|r| &r.initial)),
            reranked: self
                .reranker
                .as_ref()
                .map(|_| RankSummary::from_outcomes(results.iter().filter_map(|r| r.reranked.as_ref()))),
        };
        info!(
            "Evaluated {} documents ({} skipped): acc@1 {:.3}",
            summary.evaluated, summary.skipped, summary.initial.accuracy_at_1
        );
        (summary, results)
    }
}
