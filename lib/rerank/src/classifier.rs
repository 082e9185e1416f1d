//! Scoring classifiers and the trainer contract.
//!
//! A classifier scores each label (candidate slot) of an
//! [`AggregateFeatureVector`]. [`PerceptronTrainer`] fits a
//! [`LinearClassifier`] with shared weights across slots.

use crate::error::{RerankError, Result};
use crate::feature::{AggregateFeatureVector, FeatureVector};
use crate::instance::RankerInstance;
use ahash::AHashMap;
use gridlocate_core::LanguageModel;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub trait ScoringClassifier: Send + Sync + fmt::Debug {
    /// Score of `label`; -inf when the label has no feature slice
    fn score_label(&self, features: &AggregateFeatureVector, label: usize) -> f64;

    fn score_all(&self, features: &AggregateFeatureVector) -> Vec<f64> {
        (0..features.slice_count())
            .map(|label| self.score_label(features, label))
            .collect()
    }

    /// Best label; the first one on ties
    fn classify(&self, features: &AggregateFeatureVector) -> Option<usize> {
        argmax(&self.score_all(features))
    }
}

/// Fits a classifier from instances paired with their correct label
pub trait ClassifierTrainer<M: LanguageModel>: Send + Sync {
    fn train(&self, data: &[(RankerInstance<M>, usize)]) -> Result<Arc<dyn ScoringClassifier>>;
}

pub(crate) fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &score) in scores.iter().enumerate() {
        let score = if score.is_nan() { f64::NEG_INFINITY } else { score };
        match best {
            Some((_, b)) if score <= b => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Dot product of shared weights with each slot's features
#[derive(Debug, Clone, Default)]
pub struct LinearClassifier {
    weights: Arc<AHashMap<String, f64>>,
}

impl LinearClassifier {
    pub fn new(weights: AHashMap<String, f64>) -> Self {
        Self {
            weights: Arc::new(weights),
        }
    }

    /// All weights zero: every label scores 0
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn weights(&self) -> &AHashMap<String, f64> {
        &self.weights
    }

    #[inline]
    #[must_use]
    pub fn weight(&self, name: &str) -> f64 {
        self.weights.get(name).copied().unwrap_or(0.0)
    }
}

impl ScoringClassifier for LinearClassifier {
    fn score_label(&self, features: &AggregateFeatureVector, label: usize) -> f64 {
        features
            .slice(label)
            .map_or(f64::NEG_INFINITY, |fv| fv.dot(&self.weights))
    }
}

/// Averaged multiclass perceptron over shared weights
#[derive(Debug, Clone)]
pub struct PerceptronTrainer {
    pub epochs: usize,
    pub learning_rate: f64,
}

impl Default for PerceptronTrainer {
    fn default() -> Self {
        Self {
            epochs: 5,
            learning_rate: 1.0,
        }
    }
}

impl PerceptronTrainer {
    pub fn new(epochs: usize) -> Self {
        Self {
            epochs,
            ..Self::default()
        }
    }

    fn update(
        weights: &mut AHashMap<String, f64>,
        totals: &mut AHashMap<String, f64>,
        features: &FeatureVector,
        step: f64,
        counter: f64,
    ) {
        for (name, value) in features.iter() {
            *weights.entry(name.to_string()).or_insert(0.0) += step * value;
            *totals.entry(name.to_string()).or_insert(0.0) += counter * step * value;
        }
    }

    /// Train on bare feature vectors; labels index their slices
    pub fn train_features<'a, I>(&self, data: I) -> Result<LinearClassifier>
    where
        I: IntoIterator<Item = (&'a AggregateFeatureVector, usize)>,
        I::IntoIter: Clone,
    {
        let data = data.into_iter();
        let mut any = false;
        for (features, label) in data.clone() {
            any = true;
            if label >= features.slice_count() {
                return Err(RerankError::LabelOutOfRange {
                    label,
                    candidates: features.slice_count(),
                });
            }
        }
        if !any {
            return Err(RerankError::EmptyTrainingSet);
        }

        let mut current = LinearClassifier::zero();
        let mut weights = AHashMap::new();
        let mut totals = AHashMap::new();
        let mut counter = 1.0;
        for epoch in 0..self.epochs {
            let mut mistakes = 0usize;
            for (features, label) in data.clone() {
                let predicted = current.classify(features).unwrap_or(label);
                if predicted != label {
                    mistakes += 1;
                    if let (Some(good), Some(bad)) = (features.slice(label), features.slice(predicted)) {
                        Self::update(&mut weights, &mut totals, good, self.learning_rate, counter);
                        Self::update(&mut weights, &mut totals, bad, -self.learning_rate, counter);
                        current = LinearClassifier::new(weights.clone());
                    }
                }
                counter += 1.0;
            }
            debug!("Perceptron epoch {}: {} mistakes", epoch + 1, mistakes);
            if mistakes == 0 {
                break;
            }
        }

        let averaged = weights
            .into_iter()
            .map(|(name, w)| {
                let total = totals.get(&name).copied().unwrap_or(0.0);
                (name, w - total / counter)
            })
            .collect();
        Ok(LinearClassifier::new(averaged))
    }
}

impl<M: LanguageModel> ClassifierTrainer<M> for PerceptronTrainer {
    fn train(&self, data: &[(RankerInstance<M>, usize)]) -> Result<Arc<dyn ScoringClassifier>> {
        let classifier = self.train_features(data.iter().map(|(instance, label)| (instance.features(), *label)))?;
        Ok(Arc::new(classifier))
    }
}
