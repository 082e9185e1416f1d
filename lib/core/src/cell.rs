//! Cells: the aggregation unit of a grid.

use crate::coord::{wrap_long, BoundingBox, Coord};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::{GlobalStats, LanguageModel};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Identifies a recorded cell: the owning grid and the cell's index in it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub grid: u16,
    pub index: u32,
}

impl CellId {
    #[inline]
    #[must_use]
    pub const fn new(grid: u16, index: u32) -> Self {
        Self { grid, index }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}:{}", self.grid, self.index)
    }
}

/// Lifecycle of a cell. Documents can only be added while `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    Open,
    LocallyFinished,
    Finished,
}

#[derive(Debug, Clone)]
pub struct Cell<M: LanguageModel> {
    id: Option<CellId>,
    bounds: BoundingBox,
    center: Coord,
    state: CellState,
    grid_model: M,
    rerank_model: M,
    num_docs: usize,
    salience: f64,
    most_salient: Option<(String, f64)>,
    lat_sum: f64,
    // Unit vector sums of document longitudes
    long_sin: f64,
    long_cos: f64,
}

impl<M: LanguageModel> Cell<M> {
    /// Create an empty, open cell. `id` is `None` for cells that are not
    /// recorded in any grid.
    pub fn new(id: Option<CellId>, bounds: BoundingBox, center: Coord) -> Self {
        Self {
            id,
            bounds,
            center,
            state: CellState::Open,
            grid_model: M::default(),
            rerank_model: M::default(),
            num_docs: 0,
            salience: 0.0,
            most_salient: None,
            lat_sum: 0.0,
            long_sin: 0.0,
            long_cos: 0.0,
        }
    }

    /// Add a training document, merging its models scaled by `partial`
    pub fn add_document(&mut self, doc: &Document<M>, partial: f64) -> Result<()> {
        if self.state != CellState::Open {
            return Err(Error::InvalidState(format!(
                "cannot add {} to finished cell {}",
                doc.name,
                self.label()
            )));
        }
        if !doc.is_training() {
            return Err(Error::NotTrainingDocument(doc.name.clone()));
        }

        if let Some(salience) = doc.salience {
            self.salience += salience;
            let replace = match &self.most_salient {
                Some((_, best)) => salience > *best,
                None => true,
            };
            if replace {
                self.most_salient = Some((doc.name.clone(), salience));
            }
        }
        if let Some(model) = doc.grid_model() {
            self.grid_model.add_model(model, partial);
        }
        if let Some(model) = doc.rerank_model() {
            self.rerank_model.add_model(model, partial);
        }
        self.num_docs += 1;
        self.lat_sum += doc.coord.lat;
        let long = doc.coord.long.to_radians();
        self.long_sin += long.sin();
        self.long_cos += long.cos();
        Ok(())
    }

    /// First finalization pass
    pub fn finish_local(&mut self) -> Result<()> {
        if self.state != CellState::Open {
            return Err(Error::InvalidState(format!("cell {} finished twice", self.label())));
        }
        self.grid_model.finish_local();
        self.rerank_model.finish_local();
        self.state = CellState::LocallyFinished;
        Ok(())
    }

    /// Second finalization pass, after global statistics exist
    pub fn finish_global(&mut self, stats: &GlobalStats<M>) -> Result<()> {
        if self.state != CellState::LocallyFinished {
            return Err(Error::InvalidState(format!(
                "cell {} is {:?}, expected LocallyFinished",
                self.label(),
                self.state
            )));
        }
        self.grid_model.finish_global(&stats.grid);
        self.rerank_model.finish_global(&stats.rerank);
        self.state = CellState::Finished;
        debug!("Finished cell {} with {} documents", self.label(), self.num_docs);
        Ok(())
    }

    /// Both finalization passes, for a standalone cell
    pub fn finish(&mut self, stats: &GlobalStats<M>) -> Result<()> {
        self.finish_local()?;
        self.finish_global(stats)
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<CellId> {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        self.id.is_some()
    }

    #[inline]
    #[must_use]
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Fixed center of the cell's region
    #[inline]
    #[must_use]
    pub fn center(&self) -> Coord {
        self.center
    }

    /// Mean location of the cell's documents, or the center when empty.
    ///
    /// Longitudes are averaged on the circle so cells spanning the
    /// antimeridian get a centroid inside their bounds. When the directions
    /// cancel out the center's longitude is used.
    #[must_use]
    pub fn centroid(&self) -> Coord {
        if self.num_docs == 0 {
            return self.center;
        }
        let n = self.num_docs as f64;
        let long = if self.long_sin.hypot(self.long_cos) < 1e-9 * n {
            self.center.long
        } else {
            wrap_long(self.long_sin.atan2(self.long_cos).to_degrees())
        };
        Coord {
            lat: self.lat_sum / n,
            long,
        }
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> CellState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == CellState::Finished
    }

    #[inline]
    pub fn grid_model(&self) -> &M {
        &self.grid_model
    }

    #[inline]
    pub fn rerank_model(&self) -> &M {
        &self.rerank_model
    }

    #[inline]
    #[must_use]
    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_docs == 0
    }

    #[inline]
    #[must_use]
    pub fn salience(&self) -> f64 {
        self.salience
    }

    /// Name and salience of the most salient document; the first one seen
    /// wins ties
    pub fn most_salient(&self) -> Option<(&str, f64)> {
        self.most_salient.as_ref().map(|(name, s)| (name.as_str(), *s))
    }

    /// Weight of the cell in a prior over cells
    #[inline]
    #[must_use]
    pub fn prior_weight(&self) -> f64 {
        self.num_docs as f64
    }

    /// Same recorded cell, or the same object for unrecorded cells
    #[must_use]
    pub fn is_same(&self, other: &Cell<M>) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => std::ptr::eq(self, other),
        }
    }

    /// Printable name
    pub fn label(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => format!("unrecorded@{}", self.center),
        }
    }

    pub fn summary(&self) -> CellSummary {
        CellSummary {
            id: self.id,
            center: self.center,
            centroid: self.centroid(),
            num_docs: self.num_docs,
            salience: self.salience,
            most_salient: self.most_salient.as_ref().map(|(name, _)| name.clone()),
        }
    }
}

/// Reporting view of a cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSummary {
    pub id: Option<CellId>,
    pub center: Coord,
    pub centroid: Coord,
    pub num_docs: usize,
    pub salience: f64,
    pub most_salient: Option<String>,
}
