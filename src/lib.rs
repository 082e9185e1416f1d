//! # gridlocate
//!
//! Grid-based document geolocation: training documents are aggregated into
//! the cells of a spatial grid, a query document's language model is
//! compared against every cell, and the resulting ranking can be refined by
//! a learned reranker.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gridlocate::prelude::*;
//! use std::path::Path;
//!
//! let mut corpus: Corpus<UnigramModel> = Corpus::open(Path::new("corpus.jsonl"))?;
//! let config = GeolocateConfig::default();
//! prepare_documents(&mut corpus.documents, config.min_word_count);
//!
//! let geolocator = Geolocator::build(&config, &corpus.documents)?;
//! let queries = geolocator.finish_documents(corpus.split(Split::Dev));
//! let evaluator = Evaluator::new(geolocator.ranker.clone(), PredictionPoint::Center);
//! let (summary, _) = evaluator.evaluate(&queries);
//! println!("acc@1 = {}", summary.initial.accuracy_at_1);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Crate Structure
//!
//! - `gridlocate-core` - coordinates, language models, documents, cells,
//!   grids and the cell distribution cache
//! - `gridlocate-ranker` - baseline and scoring rankers
//! - `gridlocate-rerank` - features, classifiers, learned rankers and the
//!   reranker

pub mod config;
pub mod corpus;
pub mod eval;
pub mod pipeline;

pub use gridlocate_core::{
    BoundingBox, Cell, CellDistribution, CellDistributionCache, CellId, Coord, Document, Error, Grid, GridConfig,
    LanguageModel, Result, Split, UnigramModel,
};
pub use gridlocate_ranker::{GridRanker, RankerConfig, Ranking};
pub use gridlocate_rerank::{CandidateFeatureVectorFactory, FeatureConfig, RerankConfig, Reranker};

pub use config::{EvalConfig, GeolocateConfig};
pub use corpus::{Corpus, CorpusRecord};
pub use eval::{DocumentResult, EvalSummary, Evaluator, PredictionPoint, RankSummary};
pub use pipeline::{build_grid, prepare_documents, Geolocator};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        build_grid, prepare_documents, Cell, CellId, Coord, Corpus, Document, EvalConfig, EvalSummary, Evaluator,
        GeolocateConfig, Geolocator, Grid, GridConfig, GridRanker, LanguageModel, PredictionPoint, RankerConfig,
        Ranking, RerankConfig, Split, UnigramModel,
    };
}
