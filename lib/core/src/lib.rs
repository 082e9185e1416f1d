//! # gridlocate Core
//!
//! Core library for grid-based document geolocation.
//!
//! This crate provides the spatial index and the models it aggregates:
//!
//! - [`LanguageModel`] - Term model contract, with [`UnigramModel`] as the
//!   smoothed implementation
//! - [`Document`] - A located document with grid and rerank models
//! - [`Cell`] - Aggregated models of the documents in one region
//! - [`Grid`] - Spatial index over cells: [`UniformGrid`], [`KdTreeGrid`]
//!   and [`CombinedGrid`]
//! - [`CellDistributionCache`] - LRU-cached per-term distributions over cells
//!
//! ## Example
//!
//! ```rust
//! use gridlocate_core::{Coord, Document, Grid, LanguageModel, Split, UniformGrid, UnigramModel};
//! use std::sync::Arc;
//!
//! let mut grid = UniformGrid::new(0, 5.0, 1).unwrap();
//! let doc = Document::new("Paris", Coord::new(48.85, 2.35).unwrap(), Split::Training)
//!     .with_grid_model(UnigramModel::from_counts([("seine", 3.0), ("louvre", 1.0)]));
//! grid.add_training_documents(&[Arc::new(doc)]).unwrap();
//! grid.finish().unwrap();
//!
//! let cell = grid
//!     .find_best_cell_for_coord(&Coord::new(48.9, 2.3).unwrap(), false)
//!     .unwrap();
//! assert_eq!(cell.num_docs(), 1);
//! ```

pub mod cell;
pub mod cell_dist;
pub mod coord;
pub mod document;
pub mod error;
pub mod grid;
pub mod model;

pub use cell::{Cell, CellId, CellState, CellSummary};
pub use cell_dist::{CellDistribution, CellDistributionCache, ModelChoice};
pub use coord::{BoundingBox, Coord};
pub use document::{Document, Split};
pub use error::{Error, Result};
pub use grid::{CombinedGrid, Grid, GridConfig, GridState, KdTreeGrid, UniformGrid};
pub use model::{GlobalStats, KlDivergenceCache, LanguageModel, UnigramGlobal, UnigramModel};
