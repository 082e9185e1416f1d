//! Documents with a location and term models.

use crate::coord::Coord;
use crate::model::{GlobalStats, LanguageModel};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Corpus split a document belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    #[default]
    Training,
    Dev,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Training => write!(f, "training"),
            Split::Dev => write!(f, "dev"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// A located document.
///
/// The grid model is used for cell assignment and initial ranking. The
/// rerank model feeds feature generation and falls back to the grid model
/// when absent.
#[derive(Debug, Clone)]
pub struct Document<M: LanguageModel> {
    pub name: String,
    pub coord: Coord,
    pub split: Split,
    pub salience: Option<f64>,
    grid_model: Option<M>,
    rerank_model: Option<M>,
}

impl<M: LanguageModel> Document<M> {
    pub fn new(name: impl Into<String>, coord: Coord, split: Split) -> Self {
        Self {
            name: name.into(),
            coord,
            split,
            salience: None,
            grid_model: None,
            rerank_model: None,
        }
    }

    #[must_use]
    pub fn with_salience(mut self, salience: f64) -> Self {
        self.salience = Some(salience);
        self
    }

    #[must_use]
    pub fn with_grid_model(mut self, model: M) -> Self {
        self.grid_model = Some(model);
        self
    }

    #[must_use]
    pub fn with_rerank_model(mut self, model: M) -> Self {
        self.rerank_model = Some(model);
        self
    }

    #[inline]
    pub fn grid_model(&self) -> Option<&M> {
        self.grid_model.as_ref()
    }

    #[inline]
    pub fn rerank_model(&self) -> Option<&M> {
        self.rerank_model.as_ref().or(self.grid_model.as_ref())
    }

    #[inline]
    pub fn has_separate_rerank_model(&self) -> bool {
        self.rerank_model.is_some()
    }

    #[inline]
    pub fn is_training(&self) -> bool {
        self.split == Split::Training
    }

    /// Drop rare terms from both models
    pub fn prune(&mut self, min_count: f64) {
        for model in self.grid_model.iter_mut().chain(self.rerank_model.iter_mut()) {
            model.prune(min_count);
        }
    }

    pub fn finish_local(&mut self) {
        for model in self.grid_model.iter_mut().chain(self.rerank_model.iter_mut()) {
            model.finish_local();
        }
    }

    /// Finish both models against a grid's global statistics
    pub fn finish_global(&mut self, stats: &GlobalStats<M>) {
        if let Some(model) = self.grid_model.as_mut() {
            model.finish_global(&stats.grid);
        }
        if let Some(model) = self.rerank_model.as_mut() {
            model.finish_global(&stats.rerank);
        }
    }

    /// Copy of this document with models finished against `stats`
    #[must_use]
    pub fn finished(&self, stats: &GlobalStats<M>) -> Self {
        let mut doc = self.clone();
        doc.finish_global(stats);
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnigramModel;

    #[test]
    fn test_rerank_model_fallback() {
        let coord = Coord::new(10.0, 20.0).unwrap();
        let grid = UnigramModel::from_counts([("a", 1.0)]);
        let doc = Document::new("d", coord, Split::Dev).with_grid_model(grid);
        assert_eq!(doc.rerank_model().map(|m| m.count("a")), Some(1.0));
        assert!(!doc.has_separate_rerank_model());

        let rerank = UnigramModel::from_counts([("b", 2.0)]);
        let doc = doc.with_rerank_model(rerank);
        assert_eq!(doc.rerank_model().map(|m| m.count("b")), Some(2.0));
        assert!(!doc.is_training());
    }

    #[test]
    fn test_split_serde() {
        let split: Split = serde_json::from_str("\"test\"").unwrap();
        assert_eq!(split, Split::Test);
        assert_eq!(Split::Dev.to_string(), "dev");
    }
}
