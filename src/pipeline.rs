//! Run assembly: grid construction, document finishing, ranker training
//! and reranker training.

use crate::config::GeolocateConfig;
use anyhow::{bail, Context, Result};
use gridlocate_core::{Document, Grid, GridConfig, LanguageModel};
use gridlocate_ranker::{GridRanker, RankerConfig};
use gridlocate_rerank::{
    CandidateFeatureVectorFactory, HierarchicalClassifierRanker, LinearClassifierRanker, PerceptronTrainer, Reranker,
};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Build a grid from `config`, load the training documents and finish it
pub fn build_grid<M: LanguageModel>(config: &GridConfig, training: &[Arc<Document<M>>]) -> Result<Arc<dyn Grid<M>>> {
    let mut grid = config.build::<M>()?;
    let added = grid.add_training_documents(training)?;
    grid.finish()?;
    info!(
        "Grid {} ready: {} training documents, {} non-empty cells",
        grid.grid_id(),
        added,
        grid.nonempty_cells().len()
    );
    Ok(Arc::from(grid))
}

/// Prune and locally finish documents before they reach a grid
pub fn prepare_documents<M: LanguageModel>(docs: &mut [Document<M>], min_word_count: f64) {
    docs.par_iter_mut().for_each(|doc| {
        if min_word_count > 0.0 {
            doc.prune(min_word_count);
        }
        doc.finish_local();
    });
}

/// A trained ranking setup
pub struct Geolocator<M: LanguageModel> {
    pub ranker: Arc<dyn GridRanker<M>>,
    pub reranker: Option<Arc<Reranker<M>>>,
}

impl<M: LanguageModel> Geolocator<M> {
    /// Build everything `config` asks for from prepared documents.
    /// Training documents are taken from `docs` by split.
    pub fn build(config: &GeolocateConfig, docs: &[Document<M>]) -> Result<Self> {
        let training: Vec<Arc<Document<M>>> = docs
            .iter()
            .filter(|d| d.is_training())
            .cloned()
            .map(Arc::new)
            .collect();
        if training.is_empty() {
            bail!("corpus has no training documents");
        }

        let grids: Vec<Arc<dyn Grid<M>>> = match &config.ranker {
            RankerConfig::Hierarchical { levels, .. } => {
                if levels.is_empty() {
                    bail!("hierarchical ranker needs at least one grid level");
                }
                levels
                    .iter()
                    .map(|level| build_grid(level, &training))
                    .collect::<Result<_>>()?
            }
            _ => vec![build_grid(&config.grid, &training)?],
        };
        let finest = Arc::clone(&grids[grids.len() - 1]);
        let stats = finest
            .global_stats()
            .context("finished grid has no global statistics")?;
        let finished: Vec<Document<M>> = training.par_iter().map(|d| d.finished(stats)).collect();

        let needs_features = config.ranker.is_learned() || config.rerank.is_some();
        let factory = if needs_features {
            Some(Arc::new(CandidateFeatureVectorFactory::from_config(&config.features)?))
        } else {
            None
        };

        let ranker: Arc<dyn GridRanker<M>> = match (&config.ranker, &factory) {
            (RankerConfig::LinearClassifier { epochs }, Some(factory)) => Arc::new(LinearClassifierRanker::train(
                finest,
                Arc::clone(factory),
                &PerceptronTrainer::new(*epochs),
                &finished,
            )?),
            (RankerConfig::Hierarchical { beam_size, epochs, .. }, Some(factory)) => {
                Arc::new(HierarchicalClassifierRanker::train(
                    grids,
                    Arc::clone(factory),
                    &PerceptronTrainer::new(*epochs),
                    &finished,
                    *beam_size,
                )?)
            }
            (other, _) => other.build(finest)?,
        };

        let reranker = match (&config.rerank, factory) {
            (Some(rerank), Some(factory)) => {
                let limit = rerank.max_training_docs.unwrap_or(finished.len()).min(finished.len());
                let reranker = Reranker::train(
                    Arc::clone(&ranker),
                    factory,
                    &PerceptronTrainer::new(rerank.epochs),
                    &finished[..limit],
                    rerank.top_n,
                )?;
                Some(Arc::new(reranker))
            }
            _ => None,
        };

        Ok(Self { ranker, reranker })
    }

    pub fn grid(&self) -> &Arc<dyn Grid<M>> {
        self.ranker.grid()
    }

    /// Finish query documents against the ranking grid's statistics
    pub fn finish_documents<'a, I>(&self, docs: I) -> Vec<Document<M>>
    where
        I: IntoIterator<Item = &'a Document<M>>,
    {
        match self.grid().global_stats() {
            Some(stats) => docs.into_iter().map(|d| d.finished(stats)).collect(),
            None => docs.into_iter().cloned().collect(),
        }
    }
}
