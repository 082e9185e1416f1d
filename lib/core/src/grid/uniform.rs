//! Uniform latitude/longitude tiling.
//!
//! The globe is cut into square tiles of `degrees_per_cell`. A cell spans
//! `width` x `width` tiles and is named by its south-west tile, so with a
//! width above one cells overlap and each document lands in several cells.
//! Latitude is clamped at the poles and longitude wraps around.

use super::{accept_training_documents, begin_finish, log_finalized, CellTable, Grid, GridState};
use crate::cell::{Cell, CellId};
use crate::coord::{wrap_long, BoundingBox, Coord, MAX_LAT, MAX_LONG, MIN_LAT, MIN_LONG};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::{GlobalStats, LanguageModel};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct UniformGrid<M: LanguageModel> {
    grid_id: u16,
    degrees_per_cell: f64,
    width: u32,
    num_lat_tiles: u32,
    num_long_tiles: u32,
    state: GridState,
    docs: Vec<Arc<Document<M>>>,
    table: Option<CellTable<M>>,
}

impl<M: LanguageModel> UniformGrid<M> {
    pub fn new(grid_id: u16, degrees_per_cell: f64, width: u32) -> Result<Self> {
        if !degrees_per_cell.is_finite() || degrees_per_cell <= 0.0 || degrees_per_cell > 180.0 {
            return Err(Error::InvalidConfig(format!(
                "degrees per cell must be in (0, 180], got {degrees_per_cell}"
            )));
        }
        if width == 0 {
            return Err(Error::InvalidConfig("cell width must be at least 1".to_string()));
        }
        Ok(Self {
            grid_id,
            degrees_per_cell,
            width,
            num_lat_tiles: (180.0 / degrees_per_cell).ceil() as u32,
            num_long_tiles: (360.0 / degrees_per_cell).ceil() as u32,
            state: GridState::Building,
            docs: Vec::new(),
            table: None,
        })
    }

    #[inline]
    #[must_use]
    pub fn degrees_per_cell(&self) -> f64 {
        self.degrees_per_cell
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Tile containing `coord`
    fn tile_of(&self, coord: &Coord) -> (i64, i64) {
        let lat = ((coord.lat - MIN_LAT) / self.degrees_per_cell).floor() as i64;
        let long = ((coord.long - MIN_LONG) / self.degrees_per_cell).floor() as i64;
        (
            lat.clamp(0, i64::from(self.num_lat_tiles) - 1),
            long.rem_euclid(i64::from(self.num_long_tiles)),
        )
    }

    #[inline]
    fn index_of(&self, lat_tile: i64, long_tile: i64) -> u32 {
        let long_tile = long_tile.rem_euclid(i64::from(self.num_long_tiles));
        (lat_tile as u32) * self.num_long_tiles + long_tile as u32
    }

    /// Cells whose tiles cover `coord`
    fn covering_cells(&self, coord: &Coord) -> Vec<u32> {
        let (lat, long) = self.tile_of(coord);
        let width = i64::from(self.width);
        let mut indices: Vec<u32> = (0..width)
            .filter(|offset| lat - offset >= 0)
            .flat_map(|lat_off| (0..width).map(move |long_off| (lat - lat_off, long - long_off)))
            .map(|(lat, long)| self.index_of(lat, long))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// The cell that has `coord` in its central tile
    fn cell_index_for_coord(&self, coord: &Coord) -> u32 {
        let (lat, long) = self.tile_of(coord);
        let offset = (i64::from(self.width) - 1) / 2;
        self.index_of((lat - offset).max(0), long - offset)
    }

    fn cell_geometry(&self, index: u32) -> (BoundingBox, Coord) {
        let lat_tile = index / self.num_long_tiles;
        let long_tile = index % self.num_long_tiles;
        let span = f64::from(self.width) * self.degrees_per_cell;

        let sw_lat = MIN_LAT + f64::from(lat_tile) * self.degrees_per_cell;
        let sw_long = MIN_LONG + f64::from(long_tile) * self.degrees_per_cell;
        let ne_lat = (sw_lat + span).min(MAX_LAT);
        let mut ne_long = sw_long + span;
        if ne_long > MAX_LONG {
            ne_long = wrap_long(ne_long);
        }
        let bounds = BoundingBox::new(
            Coord { lat: sw_lat.min(MAX_LAT), long: sw_long },
            Coord { lat: ne_lat, long: ne_long },
        );
        (bounds, bounds.center())
    }

    fn initialize_cells(&mut self) -> Result<()> {
        if self.state != GridState::Finalizing {
            return Err(Error::InvalidState(format!(
                "cells of grid {} initialized in state {:?}",
                self.grid_id, self.state
            )));
        }

        let mut cells: BTreeMap<u32, Cell<M>> = BTreeMap::new();
        for doc in &self.docs {
            for index in self.covering_cells(&doc.coord) {
                let cell = cells.entry(index).or_insert_with(|| {
                    let (bounds, center) = self.cell_geometry(index);
                    Cell::new(Some(CellId::new(self.grid_id, index)), bounds, center)
                });
                cell.add_document(doc, 1.0)?;
            }
        }

        let table = CellTable::finalize(cells.into_values().collect(), &self.docs)?;
        log_finalized("uniform", self.grid_id, &table, self.total_num_cells());
        self.table = Some(table);
        self.state = GridState::Finalized;
        Ok(())
    }
}

impl<M: LanguageModel> Grid<M> for UniformGrid<M> {
    fn grid_id(&self) -> u16 {
        self.grid_id
    }

    fn state(&self) -> GridState {
        self.state
    }

    fn add_training_documents(&mut self, docs: &[Arc<Document<M>>]) -> Result<usize> {
        accept_training_documents(self.state, &mut self.docs, docs)
    }

    fn finish(&mut self) -> Result<()> {
        begin_finish(&mut self.state, self.grid_id)?;
        self.initialize_cells()
    }

    fn find_best_cell_for_coord(&self, coord: &Coord, create_non_recorded: bool) -> Option<Arc<Cell<M>>> {
        let table = self.table.as_ref()?;
        let index = self.cell_index_for_coord(coord);
        if let Some(cell) = table.get(CellId::new(self.grid_id, index)) {
            return Some(Arc::clone(cell));
        }
        if !create_non_recorded {
            return None;
        }
        let (bounds, center) = self.cell_geometry(index);
        table.non_recorded_cell(bounds, center)
    }

    fn nonempty_cells(&self) -> &[Arc<Cell<M>>] {
        self.table.as_ref().map(|t| t.cells()).unwrap_or(&[])
    }

    fn total_num_cells(&self) -> usize {
        self.num_lat_tiles as usize * self.num_long_tiles as usize
    }

    fn global_stats(&self) -> Option<&GlobalStats<M>> {
        self.table.as_ref().map(|t| t.stats())
    }

    fn cell(&self, id: CellId) -> Option<&Arc<Cell<M>>> {
        if id.grid != self.grid_id {
            return None;
        }
        self.table.as_ref()?.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::training_doc;
    use super::*;
    use crate::document::Split;
    use crate::model::UnigramModel;

    fn built_grid(width: u32) -> UniformGrid<UnigramModel> {
        let mut grid = UniformGrid::new(0, 10.0, width).unwrap();
        let docs = vec![
            training_doc("paris", 48.8, 2.3, &[("wine", 3.0), ("bread", 1.0)]),
            training_doc("lyon", 45.7, 4.8, &[("wine", 2.0)]),
            training_doc("tokyo", 35.6, 139.6, &[("sushi", 4.0)]),
            training_doc("lima", -12.0, -77.0, &[("ceviche", 2.0)]),
        ];
        assert_eq!(grid.add_training_documents(&docs).unwrap(), 4);
        grid.finish().unwrap();
        grid
    }

    #[test]
    fn test_invalid_config() {
        assert!(UniformGrid::<UnigramModel>::new(0, 0.0, 1).is_err());
        assert!(UniformGrid::<UnigramModel>::new(0, f64::NAN, 1).is_err());
        assert!(UniformGrid::<UnigramModel>::new(0, 1.0, 0).is_err());
    }

    #[test]
    fn test_finish_twice_fails() {
        let mut grid = built_grid(1);
        assert!(grid.all_cells_computed());
        let first: Vec<_> = grid.nonempty_cells().iter().map(|c| c.id()).collect();
        assert!(matches!(grid.finish(), Err(Error::InvalidState(_))));
        let second: Vec<_> = grid.nonempty_cells().iter().map(|c| c.id()).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_add_after_finish_fails() {
        let mut grid = built_grid(1);
        let late = training_doc("late", 0.0, 0.0, &[("x", 1.0)]);
        assert!(matches!(
            grid.add_training_documents(&[late]),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_rejects_test_documents_and_skips_missing_models() {
        let mut grid = UniformGrid::<UnigramModel>::new(0, 10.0, 1).unwrap();
        let test_doc = Arc::new(Document::new("t", Coord::new(1.0, 1.0).unwrap(), Split::Test));
        assert!(matches!(
            grid.add_training_documents(&[test_doc]),
            Err(Error::NotTrainingDocument(_))
        ));
        let no_model = Arc::new(Document::new("n", Coord::new(1.0, 1.0).unwrap(), Split::Training));
        assert_eq!(grid.add_training_documents(&[no_model]).unwrap(), 0);
    }

    #[test]
    fn test_documents_share_cells() {
        let grid = built_grid(1);
        let paris = grid
            .find_best_cell_for_coord(&Coord::new(48.8, 2.3).unwrap(), false)
            .unwrap();
        assert_eq!(paris.num_docs(), 2);
        assert_eq!(paris.grid_model().count("wine"), 5.0);
        assert!(paris.bounds().contains(&Coord::new(45.7, 4.8).unwrap()));
        assert!(paris.is_finished());
        assert_eq!(grid.total_prior_weight(), 4.0);
        assert_eq!(grid.total_num_cells(), 18 * 36);
    }

    #[test]
    fn test_non_recorded_cell_does_not_leak() {
        let grid = built_grid(1);
        let before: Vec<_> = grid.nonempty_cells().iter().map(|c| c.id()).collect();

        let ocean = Coord::new(-45.0, -140.0).unwrap();
        assert!(grid.find_best_cell_for_coord(&ocean, false).is_none());
        let cell = grid.find_best_cell_for_coord(&ocean, true).unwrap();
        assert!(!cell.is_recorded());
        assert!(cell.is_empty());
        assert!(cell.is_finished());
        assert!(cell.bounds().contains(&ocean));
        assert!(cell.grid_model().probability("wine") > 0.0);

        let after: Vec<_> = grid.nonempty_cells().iter().map(|c| c.id()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_unfinished_grid_has_no_cells() {
        let grid = UniformGrid::<UnigramModel>::new(0, 10.0, 1).unwrap();
        assert!(grid.nonempty_cells().is_empty());
        assert!(grid.global_stats().is_none());
        assert!(grid
            .find_best_cell_for_coord(&Coord::new(0.0, 0.0).unwrap(), true)
            .is_none());
    }

    #[test]
    fn test_multi_cell_width() {
        let grid = built_grid(3);
        let tokyo = grid
            .nonempty_cells()
            .iter()
            .filter(|c| c.grid_model().count("sushi") > 0.0)
            .count();
        assert_eq!(tokyo, 9);

        let cell = grid
            .find_best_cell_for_coord(&Coord::new(35.6, 139.6).unwrap(), false)
            .unwrap();
        assert!(cell.bounds().contains(&Coord::new(35.6, 139.6).unwrap()));
        let center = cell.center();
        assert!((center.lat - 35.0).abs() < 1e-9, "center {center}");
        assert!((center.long - 135.0).abs() < 1e-9, "center {center}");
    }

    #[test]
    fn test_longitude_wraps() {
        let mut grid = UniformGrid::<UnigramModel>::new(0, 10.0, 3).unwrap();
        grid.add_training_documents(&[training_doc("fiji", -17.7, 178.0, &[("kava", 1.0)])])
            .unwrap();
        grid.finish().unwrap();

        // The cell centered on the tile west of the antimeridian reaches across it
        let east = grid
            .find_best_cell_for_coord(&Coord::new(-17.7, 178.0).unwrap(), false)
            .unwrap();
        assert!(east.bounds().crosses_antimeridian());
        assert!(east.bounds().contains(&Coord::new(-17.7, -175.0).unwrap()));

        // A cell centered across the antimeridian still holds the document
        let west = grid
            .find_best_cell_for_coord(&Coord::new(-17.7, -175.0).unwrap(), false)
            .unwrap();
        assert_eq!(west.num_docs(), 1);
    }

    #[test]
    fn test_latitude_clamps() {
        let grid = built_grid(1);
        let pole = grid.find_best_cell_for_coord(&Coord::new(90.0, 0.0).unwrap(), true).unwrap();
        assert!(pole.bounds().contains(&Coord::new(90.0, 0.0).unwrap()));
    }
}
