//! JSON-lines document source.
//!
//! One record per line:
//!
//! ```json
//! {"title": "Paris", "coord": "48.85,2.35", "split": "training", "salience": 2100000,
//!  "counts": {"seine": 3, "louvre": 1}}
//! ```
//!
//! Malformed lines are logged and counted, never fatal. Records without
//! word counts are counted as skipped.

use anyhow::{Context, Result};
use gridlocate_core::{Coord, Document, LanguageModel, Split};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub title: String,
    /// "lat,long"
    pub coord: String,
    #[serde(default)]
    pub split: Split,
    #[serde(default)]
    pub salience: Option<f64>,
    #[serde(default)]
    pub counts: BTreeMap<String, f64>,
    /// Separate counts for rerank features; the grid counts are used when absent
    #[serde(default)]
    pub rerank_counts: Option<BTreeMap<String, f64>>,
}

impl CorpusRecord {
    /// Realize the record; `None` when it carries no word counts
    pub fn to_document<M: LanguageModel>(&self) -> Result<Option<Document<M>>> {
        let coord: Coord = self
            .coord
            .parse()
            .with_context(|| format!("bad coordinate {:?} for {}", self.coord, self.title))?;
        if self.counts.is_empty() {
            return Ok(None);
        }
        let mut doc = Document::new(self.title.clone(), coord, self.split)
            .with_grid_model(M::from_counts(self.counts.iter().map(|(w, &c)| (w, c))));
        if let Some(counts) = &self.rerank_counts {
            doc = doc.with_rerank_model(M::from_counts(counts.iter().map(|(w, &c)| (w, c))));
        }
        if let Some(salience) = self.salience {
            doc = doc.with_salience(salience);
        }
        Ok(Some(doc))
    }
}

/// Documents read from a corpus, with counts of what was left out
#[derive(Debug, Clone)]
pub struct Corpus<M: LanguageModel> {
    pub documents: Vec<Document<M>>,
    pub malformed: usize,
    pub skipped: usize,
}

impl<M: LanguageModel> Default for Corpus<M> {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            malformed: 0,
            skipped: 0,
        }
    }
}

impl<M: LanguageModel> Corpus<M> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("cannot open corpus {}", path.display()))?;
        let corpus = Self::from_reader(BufReader::new(file))?;
        info!(
            "Read {} documents from {} ({} malformed, {} without counts)",
            corpus.documents.len(),
            path.display(),
            corpus.malformed,
            corpus.skipped
        );
        Ok(corpus)
    }

    /// Parse JSON lines; only I/O failures are errors
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut corpus = Self::default();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.context("failed to read corpus")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<CorpusRecord>(line)
                .map_err(anyhow::Error::from)
                .and_then(|record| record.to_document());
            match parsed {
                Ok(Some(doc)) => corpus.documents.push(doc),
                Ok(None) => corpus.skipped += 1,
                Err(e) => {
                    warn!("Malformed corpus line {}: {:#}", lineno + 1, e);
                    corpus.malformed += 1;
                }
            }
        }
        Ok(corpus)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn split(&self, split: Split) -> impl Iterator<Item = &Document<M>> + '_ {
        self.documents.iter().filter(move |d| d.split == split)
    }

    /// Shared copies of the training documents
    pub fn training_documents(&self) -> Vec<Arc<Document<M>>> {
        self.split(Split::Training).cloned().map(Arc::new).collect()
    }
}
