use super::{Grid, GridState};
use crate::cell::{Cell, CellId};
use crate::coord::Coord;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::{GlobalStats, LanguageModel};
use ahash::AHashSet;
use ordered_float::OrderedFloat;
use std::sync::Arc;
use tracing::info;

/// Union of several sub-grids.
///
/// Owns no cells itself: lookups ask every sub-grid and keep the candidate
/// whose center is nearest to the coordinate.
pub struct CombinedGrid<M: LanguageModel> {
    grids: Vec<Box<dyn Grid<M>>>,
    cells: Vec<Arc<Cell<M>>>,
    state: GridState,
}

impl<M: LanguageModel> CombinedGrid<M> {
    pub fn new(grids: Vec<Box<dyn Grid<M>>>) -> Result<Self> {
        if grids.is_empty() {
            return Err(Error::InvalidConfig("combined grid needs at least one sub-grid".to_string()));
        }
        let mut ids = AHashSet::new();
        for grid in &grids {
            if !ids.insert(grid.grid_id()) {
                return Err(Error::DuplicateGridId(grid.grid_id()));
            }
        }
        Ok(Self {
            grids,
            cells: Vec::new(),
            state: GridState::Building,
        })
    }

    pub fn sub_grids(&self) -> &[Box<dyn Grid<M>>] {
        &self.grids
    }
}

impl<M: LanguageModel> Grid<M> for CombinedGrid<M> {
    fn grid_id(&self) -> u16 {
        self.grids[0].grid_id()
    }

    fn state(&self) -> GridState {
        self.state
    }

    fn add_training_documents(&mut self, docs: &[Arc<Document<M>>]) -> Result<usize> {
        let mut accepted = 0;
        for grid in &mut self.grids {
            accepted = accepted.max(grid.add_training_documents(docs)?);
        }
        Ok(accepted)
    }

    fn finish(&mut self) -> Result<()> {
        super::begin_finish(&mut self.state, self.grids[0].grid_id())?;
        for grid in &mut self.grids {
            grid.finish()?;
        }
        self.cells = self
            .grids
            .iter()
            .flat_map(|g| g.nonempty_cells().iter().cloned())
            .collect();
        info!(
            "Finalized combined grid over {} sub-grids: {} non-empty cells",
            self.grids.len(),
            self.cells.len()
        );
        self.state = GridState::Finalized;
        Ok(())
    }

    fn find_best_cell_for_coord(&self, coord: &Coord, create_non_recorded: bool) -> Option<Arc<Cell<M>>> {
        if self.state != GridState::Finalized {
            return None;
        }
        self.grids
            .iter()
            .filter_map(|g| g.find_best_cell_for_coord(coord, create_non_recorded))
            .min_by_key(|cell| OrderedFloat(coord.distance_km(&cell.center())))
    }

    fn nonempty_cells(&self) -> &[Arc<Cell<M>>] {
        &self.cells
    }

    fn total_num_cells(&self) -> usize {
        self.grids.iter().map(|g| g.total_num_cells()).sum()
    }

    fn global_stats(&self) -> Option<&GlobalStats<M>> {
        self.grids[0].global_stats()
    }

    fn cell(&self, id: CellId) -> Option<&Arc<Cell<M>>> {
        self.grids
            .iter()
            .find(|g| g.grid_id() == id.grid)
            .and_then(|g| g.cell(id))
    }
}
