use anyhow::Context;
use clap::Parser;
use gridlocate::prelude::*;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Rank grid cells for documents and report how well they were located
#[derive(Parser, Debug)]
#[command(name = "gridlocate")]
#[command(about = "Grid-based document geolocation", long_about = None)]
struct Args {
    /// Corpus in JSON lines
    corpus: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ranking strategy, e.g. kl-divergence, cosine, naive-bayes
    #[arg(long)]
    strategy: Option<String>,

    /// Cell size in degrees for uniform grids
    #[arg(long)]
    degrees_per_cell: Option<f64>,

    /// Rerank the top N cells of the initial ranking
    #[arg(long)]
    rerank_top_n: Option<usize>,

    /// Split to evaluate: training, dev or test
    #[arg(long)]
    eval_split: Option<String>,

    /// Evaluate at most this many documents
    #[arg(long)]
    max_eval_docs: Option<usize>,

    /// Also print per-document results
    #[arg(long)]
    per_document: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting gridlocate v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => GeolocateConfig::load(path)?,
        None => GeolocateConfig::default(),
    };
    if let Some(strategy) = &args.strategy {
        config.set_strategy(strategy)?;
    }
    if let Some(degrees) = args.degrees_per_cell {
        if !config.set_degrees_per_cell(degrees) {
            anyhow::bail!("--degrees-per-cell only applies to uniform grids");
        }
    }
    if let Some(top_n) = args.rerank_top_n {
        config.rerank.get_or_insert_with(RerankConfig::default).top_n = top_n;
    }
    if let Some(split) = &args.eval_split {
        config.eval.split = serde_json::from_value(serde_json::Value::String(split.clone()))
            .with_context(|| format!("unknown split {split:?}"))?;
    }
    if args.max_eval_docs.is_some() {
        config.eval.max_docs = args.max_eval_docs;
    }
    info!("Grid: {:?}", config.grid);
    info!("Ranker: {:?}", config.ranker);

    let mut corpus: Corpus<UnigramModel> = Corpus::open(&args.corpus)?;
    prepare_documents(&mut corpus.documents, config.min_word_count);

    let geolocator = Geolocator::build(&config, &corpus.documents)?;
    let limit = config.eval.max_docs.unwrap_or(usize::MAX);
    let queries = geolocator.finish_documents(corpus.split(config.eval.split).take(limit));
    info!("Evaluating {} {} documents", queries.len(), config.eval.split);

    let mut evaluator = Evaluator::new(geolocator.ranker.clone(), config.eval.prediction);
    if let Some(reranker) = &geolocator.reranker {
        evaluator = evaluator.with_reranker(reranker.clone());
    }
    let (summary, results) = evaluator.evaluate(&queries);

    let output = if args.per_document {
        serde_json::json!({ "summary": summary, "documents": results })
    } else {
        serde_json::to_value(&summary)?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
