//! Small grids for ranker tests.

use gridlocate_core::{Coord, Document, Grid, LanguageModel, Split, UniformGrid, UnigramModel};
use std::sync::Arc;

/// One 10-degree cell per entry, west to east along 5N
pub fn grid_with(cells: &[&[(&str, f64)]]) -> Arc<dyn Grid<UnigramModel>> {
    let docs: Vec<_> = cells
        .iter()
        .enumerate()
        .map(|(i, counts)| {
            let coord = Coord::new(5.0, -175.0 + 10.0 * i as f64).unwrap();
            Arc::new(
                Document::new(format!("cell{i}"), coord, Split::Training)
                    .with_grid_model(UnigramModel::from_counts(counts.iter().copied()))
                    .with_salience(10.0 - i as f64),
            )
        })
        .collect();
    let mut grid = UniformGrid::new(0, 10.0, 1).unwrap();
    grid.add_training_documents(&docs).unwrap();
    grid.finish().unwrap();
    Arc::new(grid)
}

/// A finished test document in the far south, where no cell is recorded
pub fn query(grid: &Arc<dyn Grid<UnigramModel>>, counts: &[(&str, f64)]) -> Document<UnigramModel> {
    let mut doc = Document::new("query", Coord::new(-60.0, 0.0).unwrap(), Split::Test)
        .with_grid_model(UnigramModel::from_counts(counts.iter().copied()));
    doc.finish_local();
    doc.finish_global(grid.global_stats().unwrap());
    doc
}
