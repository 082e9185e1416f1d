//! Adaptive k-d partition of the training points.
//!
//! The tree is built at finish time from the queued documents: each node
//! splits its points at the median, alternating latitude and longitude,
//! until a node holds at most `bucket_size` points. Every leaf becomes a
//! cell, so dense regions get small cells and sparse regions large ones.

use super::{accept_training_documents, begin_finish, log_finalized, CellTable, Grid, GridState};
use crate::cell::{Cell, CellId};
use crate::coord::{BoundingBox, Coord};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::model::{GlobalStats, LanguageModel};
use std::sync::Arc;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Lat,
    Long,
}

impl Axis {
    #[inline]
    fn key(self, coord: &Coord) -> f64 {
        match self {
            Axis::Lat => coord.lat,
            Axis::Long => coord.long,
        }
    }

    #[inline]
    fn other(self) -> Axis {
        match self {
            Axis::Lat => Axis::Long,
            Axis::Long => Axis::Lat,
        }
    }

    fn split(self, bounds: &BoundingBox, value: f64) -> (BoundingBox, BoundingBox) {
        let mut below = *bounds;
        let mut above = *bounds;
        match self {
            Axis::Lat => {
                below.ne.lat = value;
                above.sw.lat = value;
            }
            Axis::Long => {
                below.ne.long = value;
                above.sw.long = value;
            }
        }
        (below, above)
    }
}

#[derive(Debug, Clone, Copy)]
enum KdNode {
    Split {
        axis: Axis,
        value: f64,
        below: usize,
        above: usize,
    },
    Leaf {
        index: u32,
    },
}

struct Leaf {
    bounds: BoundingBox,
    points: Vec<usize>,
}

struct TreeBuilder<'a, M: LanguageModel> {
    docs: &'a [Arc<Document<M>>],
    bucket_size: usize,
    nodes: Vec<KdNode>,
    leaves: Vec<Leaf>,
}

impl<M: LanguageModel> TreeBuilder<'_, M> {
    fn leaf(&mut self, points: &[usize], bounds: BoundingBox) -> usize {
        let index = self.leaves.len() as u32;
        self.leaves.push(Leaf {
            bounds,
            points: points.to_vec(),
        });
        self.nodes.push(KdNode::Leaf { index });
        self.nodes.len() - 1
    }

    fn build(&mut self, points: &mut [usize], depth: usize, bounds: BoundingBox) -> usize {
        if points.len() <= self.bucket_size || depth >= MAX_DEPTH {
            return self.leaf(points, bounds);
        }
        let axis = if depth % 2 == 0 { Axis::Lat } else { Axis::Long };
        let docs = self.docs;
        let key = |p: &usize| axis.key(&docs[*p].coord);
        points.sort_by(|a, b| key(a).total_cmp(&key(b)));

        let mut value = key(&points[points.len() / 2]);
        let mut split = points.partition_point(|p| key(p) < value);
        if split == 0 {
            // Median equals the minimum; split at the next distinct value
            split = points.partition_point(|p| key(p) <= value);
            if split == points.len() {
                let other = axis.other();
                let first = other.key(&docs[points[0]].coord);
                if points.iter().any(|p| other.key(&docs[*p].coord) != first) {
                    return self.build(points, depth + 1, bounds);
                }
                return self.leaf(points, bounds);
            }
            value = key(&points[split]);
        }

        let node = self.nodes.len();
        self.nodes.push(KdNode::Leaf { index: u32::MAX });
        let (below_bounds, above_bounds) = axis.split(&bounds, value);
        let (below_points, above_points) = points.split_at_mut(split);
        let below = self.build(below_points, depth + 1, below_bounds);
        let above = self.build(above_points, depth + 1, above_bounds);
        self.nodes[node] = KdNode::Split {
            axis,
            value,
            below,
            above,
        };
        node
    }
}

pub struct KdTreeGrid<M: LanguageModel> {
    grid_id: u16,
    bucket_size: usize,
    state: GridState,
    docs: Vec<Arc<Document<M>>>,
    nodes: Vec<KdNode>,
    leaf_bounds: Vec<BoundingBox>,
    table: Option<CellTable<M>>,
}

impl<M: LanguageModel> KdTreeGrid<M> {
    pub fn new(grid_id: u16, bucket_size: usize) -> Result<Self> {
        if bucket_size == 0 {
            return Err(Error::InvalidConfig("k-d bucket size must be at least 1".to_string()));
        }
        Ok(Self {
            grid_id,
            bucket_size,
            state: GridState::Building,
            docs: Vec::new(),
            nodes: Vec::new(),
            leaf_bounds: Vec::new(),
            table: None,
        })
    }

    fn leaf_for_coord(&self, coord: &Coord) -> Option<u32> {
        let mut node = 0;
        loop {
            match self.nodes.get(node)? {
                KdNode::Split {
                    axis,
                    value,
                    below,
                    above,
                } => {
                    node = if axis.key(coord) < *value { *below } else { *above };
                }
                KdNode::Leaf { index } => return Some(*index),
            }
        }
    }

    fn initialize_cells(&mut self) -> Result<()> {
        if self.state != GridState::Finalizing {
            return Err(Error::InvalidState(format!(
                "cells of grid {} initialized in state {:?}",
                self.grid_id, self.state
            )));
        }

        let mut builder = TreeBuilder {
            docs: &self.docs,
            bucket_size: self.bucket_size,
            nodes: Vec::new(),
            leaves: Vec::new(),
        };
        let mut points: Vec<usize> = (0..self.docs.len()).collect();
        builder.build(&mut points, 0, BoundingBox::world());
        let TreeBuilder { nodes, leaves, .. } = builder;

        let mut cells = Vec::with_capacity(leaves.len());
        for (index, leaf) in leaves.iter().enumerate() {
            let id = CellId::new(self.grid_id, index as u32);
            let mut cell = Cell::new(Some(id), leaf.bounds, leaf.bounds.center());
            for &point in &leaf.points {
                cell.add_document(&self.docs[point], 1.0)?;
            }
            cells.push(cell);
        }

        self.leaf_bounds = leaves.into_iter().map(|leaf| leaf.bounds).collect();
        self.nodes = nodes;
        let table = CellTable::finalize(cells, &self.docs)?;
        log_finalized("k-d", self.grid_id, &table, self.total_num_cells());
        self.table = Some(table);
        self.state = GridState::Finalized;
        Ok(())
    }
}

impl<M: LanguageModel> Grid<M> for KdTreeGrid<M> {
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
        let index = self.leaf_for_coord(coord)?;
        if let Some(cell) = table.get(CellId::new(self.grid_id, index)) {
            return Some(Arc::clone(cell));
        }
        if !create_non_recorded {
            return None;
        }
        let bounds = *self.leaf_bounds.get(index as usize)?;
        table.non_recorded_cell(bounds, bounds.center())
    }

    fn nonempty_cells(&self) -> &[Arc<Cell<M>>] {
        self.table.as_ref().map(|t| t.cells()).unwrap_or(&[])
    }

    fn total_num_cells(&self) -> usize {
        self.leaf_bounds.len()
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
