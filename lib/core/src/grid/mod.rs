//! Spatial indexes over cells.
//!
//! A grid is built in two phases. While `Building` it only collects training
//! documents. [`Grid::finish`] creates the cells, fills them, and finalizes
//! their models in two barriers: every cell finishes its local pass, global
//! statistics are computed once, then every cell finishes its global pass.
//! After that the grid is read-only and is usually shared as
//! `Arc<dyn Grid<M>>`.

mod combined;
mod kdtree;
mod uniform;

pub use combined::CombinedGrid;
pub use kdtree::KdTreeGrid;
pub use uniform::UniformGrid;

use crate::cell::{Cell, CellId};
use crate::coord::{BoundingBox, Coord};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::{GlobalStats, LanguageModel};
use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridState {
    Building,
    Finalizing,
    Finalized,
}

pub trait Grid<M: LanguageModel>: Send + Sync {
    fn grid_id(&self) -> u16;

    fn state(&self) -> GridState;

    /// Queue training documents for cell assignment.
    ///
    /// Documents without a grid model are skipped; returns how many were
    /// accepted.
    fn add_training_documents(&mut self, docs: &[Arc<Document<M>>]) -> Result<usize>;

    /// Build and finalize all cells. Fails if called more than once.
    fn finish(&mut self) -> Result<()>;

    /// The cell covering `coord`. When no recorded cell covers it and
    /// `create_non_recorded` is set, a finished, empty cell is built that
    /// the grid does not keep.
    fn find_best_cell_for_coord(&self, coord: &Coord, create_non_recorded: bool) -> Option<Arc<Cell<M>>>;

    /// Non-empty cells in a fixed order; empty before `finish`
    fn nonempty_cells(&self) -> &[Arc<Cell<M>>];

    /// Number of cells the topology allows, empty or not
    fn total_num_cells(&self) -> usize;

    fn global_stats(&self) -> Option<&GlobalStats<M>>;

    fn cell(&self, id: CellId) -> Option<&Arc<Cell<M>>>;

    fn all_cells_computed(&self) -> bool {
        self.state() == GridState::Finalized
    }

    /// Non-empty cells followed by any cell of `extra` not already among them
    fn iter_nonempty_cells_including(&self, extra: &[Arc<Cell<M>>]) -> Vec<Arc<Cell<M>>> {
        let mut cells = self.nonempty_cells().to_vec();
        for cell in extra {
            if !cells.iter().any(|c| c.is_same(cell)) {
                cells.push(Arc::clone(cell));
            }
        }
        cells
    }

    fn total_prior_weight(&self) -> f64 {
        self.nonempty_cells().iter().map(|c| c.prior_weight()).sum()
    }
}

/// Grid configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GridConfig {
    Uniform {
        #[serde(default)]
        grid_id: u16,
        #[serde(default = "default_degrees_per_cell")]
        degrees_per_cell: f64,
        /// Side of a cell in tiles; cells overlap when greater than one
        #[serde(default = "default_width")]
        width: u32,
    },
    KdTree {
        #[serde(default)]
        grid_id: u16,
        #[serde(default = "default_bucket_size")]
        bucket_size: usize,
    },
    Combined {
        grids: Vec<GridConfig>,
    },
}

fn default_degrees_per_cell() -> f64 {
    1.0
}

fn default_width() -> u32 {
    1
}

fn default_bucket_size() -> usize {
    100
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig::Uniform {
            grid_id: 0,
            degrees_per_cell: default_degrees_per_cell(),
            width: default_width(),
        }
    }
}

impl GridConfig {
    pub fn build<M: LanguageModel>(&self) -> Result<Box<dyn Grid<M>>> {
        match self {
            GridConfig::Uniform {
                grid_id,
                degrees_per_cell,
                width,
            } => Ok(Box::new(UniformGrid::new(*grid_id, *degrees_per_cell, *width)?)),
            GridConfig::KdTree { grid_id, bucket_size } => {
                Ok(Box::new(KdTreeGrid::new(*grid_id, *bucket_size)?))
            }
            GridConfig::Combined { grids } => {
                let grids = grids.iter().map(|g| g.build()).collect::<Result<Vec<_>>>()?;
                Ok(Box::new(CombinedGrid::new(grids)?))
            }
        }
    }
}

/// Shared bookkeeping for grids that own their cells
#[derive(Debug)]
pub(crate) struct CellTable<M: LanguageModel> {
    cells: Vec<Arc<Cell<M>>>,
    by_id: AHashMap<CellId, usize>,
    stats: GlobalStats<M>,
}

impl<M: LanguageModel> CellTable<M> {
    /// Finalize `cells` against statistics computed from `docs`
    pub(crate) fn finalize(mut cells: Vec<Cell<M>>, docs: &[Arc<Document<M>>]) -> Result<Self> {
        cells.par_iter_mut().try_for_each(|cell| cell.finish_local())?;

        let stats = GlobalStats {
            grid: Arc::new(M::compute_global(docs.iter().filter_map(|d| d.grid_model()))),
            rerank: Arc::new(M::compute_global(docs.iter().filter_map(|d| d.rerank_model()))),
        };

        cells.par_iter_mut().try_for_each(|cell| cell.finish_global(&stats))?;

        let mut by_id = AHashMap::with_capacity(cells.len());
        let mut table = Vec::with_capacity(cells.len());
        for cell in cells.into_iter().filter(|c| !c.is_empty()) {
            if let Some(id) = cell.id() {
                by_id.insert(id, table.len());
            }
            table.push(Arc::new(cell));
        }
        Ok(Self {
            cells: table,
            by_id,
            stats,
        })
    }

    #[inline]
    pub(crate) fn cells(&self) -> &[Arc<Cell<M>>] {
        &self.cells
    }

    #[inline]
    pub(crate) fn get(&self, id: CellId) -> Option<&Arc<Cell<M>>> {
        self.by_id.get(&id).map(|&i| &self.cells[i])
    }

    #[inline]
    pub(crate) fn stats(&self) -> &GlobalStats<M> {
        &self.stats
    }

    /// An empty, finished cell that no grid records
    pub(crate) fn non_recorded_cell(&self, bounds: BoundingBox, center: Coord) -> Option<Arc<Cell<M>>> {
        let mut cell = Cell::new(None, bounds, center);
        match cell.finish(&self.stats) {
            Ok(()) => Some(Arc::new(cell)),
            Err(e) => {
                warn!("Could not build unrecorded cell at {}: {}", center, e);
                None
            }
        }
    }
}

/// Validate documents and keep those with a grid model
pub(crate) fn accept_training_documents<M: LanguageModel>(
    state: GridState,
    queue: &mut Vec<Arc<Document<M>>>,
    docs: &[Arc<Document<M>>],
) -> Result<usize> {
    if state != GridState::Building {
        return Err(Error::InvalidState(format!(
            "cannot add documents to a grid in state {state:?}"
        )));
    }
    if let Some(doc) = docs.iter().find(|d| !d.is_training()) {
        return Err(Error::NotTrainingDocument(doc.name.clone()));
    }
    let mut accepted = 0;
    let mut skipped = 0;
    for doc in docs {
        if doc.grid_model().is_none() {
            skipped += 1;
            continue;
        }
        queue.push(Arc::clone(doc));
        accepted += 1;
    }
    if skipped > 0 {
        warn!("Skipped {} training documents without a language model", skipped);
    }
    Ok(accepted)
}

/// Move a grid from `Building` to `Finalizing`
pub(crate) fn begin_finish(state: &mut GridState, grid_id: u16) -> Result<()> {
    if *state != GridState::Building {
        return Err(Error::InvalidState(format!(
            "grid {grid_id} already finished (state {state:?})"
        )));
    }
    *state = GridState::Finalizing;
    Ok(())
}

pub(crate) fn log_finalized<M: LanguageModel>(kind: &str, grid_id: u16, table: &CellTable<M>, total: usize) {
    info!(
        "Finalized {} grid {}: {} non-empty cells of {}",
        kind,
        grid_id,
        table.cells().len(),
        total
    );
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::coord::Coord;
    use crate::document::{Document, Split};
    use crate::model::{LanguageModel, UnigramModel};
    use std::sync::Arc;

    pub fn training_doc(name: &str, lat: f64, long: f64, counts: &[(&str, f64)]) -> Arc<Document<UnigramModel>> {
        Arc::new(
            Document::new(name, Coord::new(lat, long).unwrap(), Split::Training)
                .with_grid_model(UnigramModel::from_counts(counts.iter().copied())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::training_doc;
    use super::*;
    use crate::model::UnigramModel;

    #[test]
    fn test_config_serde() {
        let config: GridConfig =
            serde_json::from_str(r#"{"kind": "uniform", "degrees_per_cell": 2.5}"#).unwrap();
        assert_eq!(
            config,
            GridConfig::Uniform {
                grid_id: 0,
                degrees_per_cell: 2.5,
                width: 1
            }
        );

        let config: GridConfig = serde_json::from_str(
            r#"{"kind": "combined", "grids": [{"kind": "uniform", "grid_id": 1}, {"kind": "kd-tree", "grid_id": 2}]}"#,
        )
        .unwrap();
        assert!(config.build::<UnigramModel>().is_ok());
    }

    #[test]
    fn test_duplicate_grid_ids_rejected() {
        let config = GridConfig::Combined {
            grids: vec![GridConfig::default(), GridConfig::default()],
        };
        assert!(matches!(
            config.build::<UnigramModel>(),
            Err(Error::DuplicateGridId(0))
        ));
    }

    #[test]
    fn test_including_extra_cells() {
        let mut grid = GridConfig::default().build::<UnigramModel>().unwrap();
        grid.add_training_documents(&[
            training_doc("a", 10.5, 10.5, &[("x", 1.0)]),
            training_doc("b", 20.5, 20.5, &[("y", 1.0)]),
        ])
        .unwrap();
        grid.finish().unwrap();

        let recorded = Arc::clone(&grid.nonempty_cells()[0]);
        let unrecorded = grid
            .find_best_cell_for_coord(&Coord::new(-40.5, 100.5).unwrap(), true)
            .unwrap();

        let cells = grid.iter_nonempty_cells_including(&[recorded, Arc::clone(&unrecorded)]);
        assert_eq!(cells.len(), 3);
        assert!(Arc::ptr_eq(&cells[2], &unrecorded));
        assert_eq!(grid.nonempty_cells().len(), 2);
    }

    #[test]
    fn test_rejected_batch_leaves_grid_unchanged() {
        use crate::document::Split;

        let mut grid = GridConfig::default().build::<UnigramModel>().unwrap();
        let good = training_doc("good", 10.5, 10.5, &[("x", 1.0)]);
        let held_out = Arc::new(
            Document::new("held-out", Coord::new(10.5, 10.5).unwrap(), Split::Test)
                .with_grid_model(UnigramModel::from_counts([("x", 1.0)])),
        );

        let result = grid.add_training_documents(&[Arc::clone(&good), held_out]);
        assert!(matches!(result, Err(Error::NotTrainingDocument(_))));
        assert_eq!(grid.add_training_documents(&[good]).unwrap(), 1);
        grid.finish().unwrap();

        assert_eq!(grid.nonempty_cells().len(), 1);
        assert_eq!(grid.nonempty_cells()[0].num_docs(), 1);
    }
}
