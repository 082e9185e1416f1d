//! Baseline rankers that ignore the document's content.

use crate::ranker::{candidate_cells, sort_ranking, GridRanker, Ranking};
use gridlocate_core::{Cell, Document, Grid, LanguageModel};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shuffles the candidates; every score is zero
pub struct RandomRanker<M: LanguageModel> {
    grid: Arc<dyn Grid<M>>,
    seed: Option<u64>,
}

impl<M: LanguageModel> RandomRanker<M> {
    pub fn new(grid: Arc<dyn Grid<M>>) -> Self {
        Self { grid, seed: None }
    }

    /// Same shuffle for every query
    pub fn with_seed(grid: Arc<dyn Grid<M>>, seed: u64) -> Self {
        Self {
            grid,
            seed: Some(seed),
        }
    }
}

impl<M: LanguageModel> GridRanker<M> for RandomRanker<M> {
    fn grid(&self) -> &Arc<dyn Grid<M>> {
        &self.grid
    }

    fn rank(&self, _doc: &Document<M>, correct: Option<&Arc<Cell<M>>>, include_correct: bool) -> Ranking<M> {
        let mut cells = candidate_cells(self.grid.as_ref(), correct, include_correct);
        match self.seed {
            Some(seed) => cells.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => cells.shuffle(&mut rand::rng()),
        }
        cells.into_iter().map(|cell| (cell, 0.0)).collect()
    }
}

/// What makes a cell popular
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Popularity {
    /// Number of training documents
    #[default]
    Documents,
    /// Summed document salience
    Salience,
}

/// Ranks cells by popularity, regardless of the query
pub struct MostPopularRanker<M: LanguageModel> {
    grid: Arc<dyn Grid<M>>,
    popularity: Popularity,
}

impl<M: LanguageModel> MostPopularRanker<M> {
    pub fn new(grid: Arc<dyn Grid<M>>, popularity: Popularity) -> Self {
        Self { grid, popularity }
    }
}

impl<M: LanguageModel> GridRanker<M> for MostPopularRanker<M> {
    fn grid(&self) -> &Arc<dyn Grid<M>> {
        &self.grid
    }

    fn rank(&self, _doc: &Document<M>, correct: Option<&Arc<Cell<M>>>, include_correct: bool) -> Ranking<M> {
        let mut ranking: Ranking<M> = candidate_cells(self.grid.as_ref(), correct, include_correct)
            .into_iter()
            .map(|cell| {
                let score = match self.popularity {
                    Popularity::Documents => cell.num_docs() as f64,
                    Popularity::Salience => cell.salience(),
                };
                (cell, score)
            })
            .collect();
        sort_ranking(&mut ranking);
        ranking
    }
}
