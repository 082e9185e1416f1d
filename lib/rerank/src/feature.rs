use ahash::AHashMap;

/// Sparse named feature values for one candidate.
///
/// Values are always finite; non-finite values must be binned before they
/// get here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    features: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a feature.
    ///
    /// # Panics
    ///
    /// Panics if `value` is NaN or infinite.
    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        assert!(
            value.is_finite(),
            "disallowed value {value} for feature {name:?}"
        );
        self.features.push((name, value));
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.features.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Value of the first feature called `name`
    pub fn get(&self, name: &str) -> Option<f64> {
        self.features
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| *value)
    }

    /// Dot product with a sparse weight table
    pub fn dot(&self, weights: &AHashMap<String, f64>) -> f64 {
        self.features
            .iter()
            .filter_map(|(name, value)| weights.get(name).map(|w| w * value))
            .sum()
    }
}

/// One feature vector per candidate, in candidate order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateFeatureVector {
    slices: Vec<FeatureVector>,
}

impl AggregateFeatureVector {
    pub fn new(slices: Vec<FeatureVector>) -> Self {
        Self { slices }
    }

    #[inline]
    #[must_use]
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    #[inline]
    pub fn slice(&self, label: usize) -> Option<&FeatureVector> {
        self.slices.get(label)
    }

    pub fn slices(&self) -> &[FeatureVector] {
        &self.slices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_dot() {
        let mut fv = FeatureVector::new();
        fv.push("a", 2.0);
        fv.push("b", -1.0);
        assert_eq!(fv.len(), 2);
        assert_eq!(fv.get("b"), Some(-1.0));
        assert_eq!(fv.get("c"), None);

        let mut weights = AHashMap::new();
        weights.insert("a".to_string(), 0.5);
        weights.insert("c".to_string(), 100.0);
        assert_eq!(fv.dot(&weights), 1.0);
    }

    #[test]
    #[should_panic(expected = "disallowed value NaN for feature \"score\"")]
    fn test_rejects_nan() {
        FeatureVector::new().push("score", f64::NAN);
    }

    #[test]
    #[should_panic(expected = "disallowed value -inf")]
    fn test_rejects_infinity() {
        FeatureVector::new().push("score", f64::NEG_INFINITY);
    }

    #[test]
    fn test_aggregate() {
        let agg = AggregateFeatureVector::new(vec![FeatureVector::new(), FeatureVector::new()]);
        assert_eq!(agg.slice_count(), 2);
        assert!(agg.slice(1).is_some());
        assert!(agg.slice(2).is_none());
    }
}
