use hostmon_common::types::round2;
use serde::{Deserialize, Serialize};

/// Min, max, mean and population standard deviation of one series, each
/// rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl Summary {
    /// Returns `None` for an empty series.
    ///
    /// ```
    /// use hostmon_report::stats::Summary;
    ///
    /// let s = Summary::of(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    /// assert_eq!(s.mean, 2.5);
    /// assert_eq!(s.std, 1.12);
    /// ```
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            min: round2(min),
            max: round2(max),
            mean: round2(mean),
            std: round2(variance.sqrt()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value_has_zero_spread() {
        let s = Summary::of(&[42.0]).unwrap();
        assert_eq!(s, Summary { min: 42.0, max: 42.0, mean: 42.0, std: 0.0 });
    }

    #[test]
    fn empty_series_has_no_summary() {
        assert!(Summary::of(&[]).is_none());
    }

    #[test]
    fn std_is_population() {
        // Sample std of [2, 4] would be 1.41.
        let s = Summary::of(&[2.0, 4.0]).unwrap();
        assert_eq!(s.std, 1.0);
    }

    #[test]
    fn rounds_to_two_decimals() {
        let s = Summary::of(&[1.0, 1.0, 2.0]).unwrap();
        assert_eq!(s.mean, 1.33);
        assert_eq!(s.std, 0.47);
    }
}
