//! Discretization of continuous feature values.
//!
//! Both binning functions are total: every `f64`, including NaN and the
//! infinities, maps to exactly one label.

use serde::{Deserialize, Serialize};

/// Which representations of a continuous value are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinningStatus {
    /// The value itself
    #[default]
    RawOnly,
    /// An indicator for the value's bin
    BinnedOnly,
    Both,
}

impl BinningStatus {
    #[inline]
    #[must_use]
    pub fn emits_raw(self) -> bool {
        matches!(self, BinningStatus::RawOnly | BinningStatus::Both)
    }

    #[inline]
    #[must_use]
    pub fn emits_binned(self) -> bool {
        matches!(self, BinningStatus::BinnedOnly | BinningStatus::Both)
    }
}

/// Label of the bucket `floor(log_base |value|)`, with separate labels for
/// zero, NaN, the infinities, and a `neg` prefix for negative values.
///
/// `base` should exceed 1.
#[must_use]
pub fn bin_logarithmically(value: f64, base: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value == f64::INFINITY {
        return "inf".to_string();
    }
    if value == f64::NEG_INFINITY {
        return "-inf".to_string();
    }
    if value == 0.0 {
        return "zero".to_string();
    }
    // `as` saturates, so a degenerate base still yields a label
    let index = value.abs().log(base).floor() as i64;
    if value < 0.0 {
        format!("neg{index}")
    } else {
        index.to_string()
    }
}

/// Label of one of `num_bins` equal buckets over [0, 1]; values outside
/// the interval get `below` or `above`.
#[must_use]
pub fn bin_fractionally(value: f64, num_bins: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value < 0.0 {
        return "below".to_string();
    }
    if value > 1.0 {
        return "above".to_string();
    }
    let num_bins = num_bins.max(1);
    let index = ((value * num_bins as f64).floor() as usize).min(num_bins - 1);
    index.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_log_bins() {
        assert_eq!(bin_logarithmically(0.0, 2.0), "zero");
        assert_eq!(bin_logarithmically(-0.0, 2.0), "zero");
        assert_eq!(bin_logarithmically(f64::NAN, 2.0), "nan");
        assert_eq!(bin_logarithmically(f64::INFINITY, 2.0), "inf");
        assert_eq!(bin_logarithmically(f64::NEG_INFINITY, 2.0), "-inf");
        assert_eq!(bin_logarithmically(1.0, 2.0), "0");
        assert_eq!(bin_logarithmically(5.0, 2.0), "2");
        assert_eq!(bin_logarithmically(0.3, 2.0), "-2");
        assert_eq!(bin_logarithmically(-12.0, 2.0), "neg3");
        assert_eq!(bin_logarithmically(1500.0, 10.0), "3");
    }

    #[test]
    fn test_fraction_bins() {
        assert_eq!(bin_fractionally(0.0, 10), "0");
        assert_eq!(bin_fractionally(0.55, 10), "5");
        assert_eq!(bin_fractionally(1.0, 10), "9");
        assert_eq!(bin_fractionally(-0.1, 10), "below");
        assert_eq!(bin_fractionally(f64::INFINITY, 10), "above");
        assert_eq!(bin_fractionally(f64::NAN, 10), "nan");
        assert_eq!(bin_fractionally(0.7, 0), "0");
    }

    #[test]
    fn test_binning_status() {
        assert!(BinningStatus::RawOnly.emits_raw());
        assert!(!BinningStatus::RawOnly.emits_binned());
        assert!(BinningStatus::Both.emits_raw() && BinningStatus::Both.emits_binned());
        assert!(!BinningStatus::BinnedOnly.emits_raw());
    }

    fn any_value() -> impl Strategy<Value = f64> {
        prop_oneof![
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
            Just(0.0),
            Just(-0.0),
            Just(f64::MIN_POSITIVE / 4.0),
            Just(f64::MAX),
            any::<f64>(),
        ]
    }

    proptest! {
        #[test]
        fn prop_log_binning_total_and_deterministic(value in any_value(), base in 1.01f64..100.0) {
            let first = bin_logarithmically(value, base);
            let second = bin_logarithmically(value, base);
            prop_assert!(!first.is_empty());
            prop_assert_eq!(&first, &second);
            if value.is_finite() && value < 0.0 {
                prop_assert!(first.starts_with("neg"));
            }
        }

        #[test]
        fn prop_fraction_binning_total(value in any_value(), bins in 0usize..50) {
            let label = bin_fractionally(value, bins);
            prop_assert_eq!(label.clone(), bin_fractionally(value, bins));
            if (0.0..=1.0).contains(&value) {
                let index: usize = label.parse().unwrap();
                prop_assert!(index < bins.max(1));
            }
        }
    }
}
